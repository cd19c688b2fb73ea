use serde_json::json;
use std::ops::Range;

use crate::error::{ParseError, ParseResult};
use crate::id_generator::IdGenerator;
use crate::markers::{MarkerKind, MarkerTable};
use crate::perf::{Block, ContentElement, ContentNode, PerfDocument, Sequence};
use crate::tokenizer::{tokenize, Token};

/// Identifies the corpus a marker stream belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct SourceContext {
    pub server: String,
    pub organization: String,
    pub language: String,
    pub version: String,
}

impl SourceContext {
    pub fn new(
        server: impl Into<String>,
        organization: impl Into<String>,
        language: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            organization: organization.into(),
            language: language.into(),
            version: version.into(),
        }
    }
}

/// Parse a marker stream into a PERF document
pub fn to_perf(
    source: &str,
    context: &SourceContext,
    table: &MarkerTable,
) -> ParseResult<PerfDocument> {
    Parser::new(source, context, table)?.parse_document()
}

fn collapse_ws(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_ws = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            in_ws = true;
            continue;
        }
        if in_ws {
            out.push(' ');
            in_ws = false;
        }
        out.push(ch);
    }
    if in_ws {
        out.push(' ');
    }
    out
}

fn note_sequence_type(marker: &str) -> &'static str {
    match marker {
        "f" => "footnote",
        "x" => "xref",
        _ => "note",
    }
}

/// Parser for USFM-style marker streams
pub struct Parser<'src, 'tbl> {
    tokens: Vec<(Token<'src>, Range<usize>)>,
    pos: usize,
    ids: IdGenerator,
    table: &'tbl MarkerTable,
    context: SourceContext,
}

impl<'src, 'tbl> Parser<'src, 'tbl> {
    pub fn new(
        source: &'src str,
        context: &SourceContext,
        table: &'tbl MarkerTable,
    ) -> ParseResult<Self> {
        let tokens = tokenize(source)?;
        let seed = format!(
            "{}/{}/{}/{}",
            context.server, context.organization, context.language, context.version
        );
        Ok(Self {
            tokens,
            pos: 0,
            ids: IdGenerator::new(&seed),
            table,
            context: context.clone(),
        })
    }

    /// Parse the complete stream into a flat PERF document
    pub fn parse_document(&mut self) -> ParseResult<PerfDocument> {
        let main_id = self.ids.new_id();
        let mut doc = PerfDocument::new(&main_id);
        doc.metadata.insert(
            "translation".to_string(),
            json!({
                "server": self.context.server,
                "organization": self.context.organization,
                "language": self.context.language,
                "version": self.context.version,
            }),
        );

        let mut blocks: Vec<Block> = Vec::new();
        let mut current: Option<Block> = None;

        while let Some((token, span)) = self.peek().cloned() {
            match token {
                Token::Marker(name) => {
                    if self.is_milestone_ahead() {
                        self.advance();
                        let node = self.parse_milestone(name, span.start)?;
                        Self::require_block(&mut current, span.start, name)?
                            .content
                            .push(ContentElement::Node(node));
                        continue;
                    }
                    self.advance();
                    match name {
                        "id" => self.parse_book_id(&mut doc)?,
                        "c" => {
                            Self::close_block(&mut blocks, &mut current);
                            blocks.push(self.parse_chapter(span.start)?);
                        }
                        "v" => {
                            let block = Self::require_block(&mut current, span.start, name)?;
                            self.parse_verse(block, span.start)?;
                        }
                        _ => match self.table.kind(name) {
                            Some(MarkerKind::Block) => {
                                Self::close_block(&mut blocks, &mut current);
                                current = Some(Block::paragraph(name));
                            }
                            Some(MarkerKind::Inline) if name == "f" || name == "x" => {
                                let graft = self.parse_note(name, span.start, &mut doc)?;
                                Self::require_block(&mut current, span.start, name)?
                                    .content
                                    .push(ContentElement::Node(graft));
                            }
                            Some(MarkerKind::Inline) => {
                                let wrapper = self.parse_wrapper(name, span.start)?;
                                Self::require_block(&mut current, span.start, name)?
                                    .content
                                    .push(ContentElement::Node(wrapper));
                            }
                            Some(MarkerKind::Structural) | None => {
                                return Err(ParseError::unknown_marker(span.start, name));
                            }
                        },
                    }
                }
                Token::Text(text) => {
                    self.advance();
                    match current.as_mut() {
                        Some(block) => Self::push_text(block, text),
                        None if text.trim().is_empty() => {}
                        None => return Err(ParseError::UnexpectedText { pos: span.start }),
                    }
                }
                Token::EndMarker(name) => {
                    return Err(ParseError::UnmatchedClosingMarker {
                        pos: span.start,
                        marker: name.to_string(),
                    });
                }
                Token::MilestoneEnd | Token::Pipe => {
                    return Err(ParseError::MalformedAttribute {
                        pos: span.start,
                        text: "stray separator".to_string(),
                    });
                }
            }
        }

        Self::close_block(&mut blocks, &mut current);

        if let Some(main) = doc.sequences.get_mut(&main_id) {
            main.blocks = blocks;
        }
        Ok(doc)
    }

    fn parse_book_id(&mut self, doc: &mut PerfDocument) -> ParseResult<()> {
        if let Some(text) = self.take_text() {
            let text = text.trim();
            let mut parts = text.splitn(2, ' ');
            let code = parts.next().unwrap_or_default();
            if !code.is_empty() {
                let mut document = json!({ "bookCode": code });
                if let Some(rest) = parts.next() {
                    document["description"] = json!(rest.trim());
                }
                doc.metadata.insert("document".to_string(), document);
            }
        }
        Ok(())
    }

    fn parse_chapter(&mut self, pos: usize) -> ParseResult<Block> {
        let text = self
            .take_text()
            .ok_or_else(|| ParseError::missing_argument(pos, "c", "chapter number"))?;
        let trimmed = text.trim();
        let number: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
        if number.is_empty() {
            return Err(ParseError::missing_argument(pos, "c", "chapter number"));
        }
        if trimmed.len() > number.len() && !trimmed[number.len()..].trim().is_empty() {
            return Err(ParseError::UnexpectedText { pos });
        }

        let mut atts = std::collections::BTreeMap::new();
        atts.insert("number".to_string(), number);
        Ok(Block {
            block_type: "mark".to_string(),
            subtype: Some("chapter".to_string()),
            atts,
            content: Vec::new(),
            extra: serde_json::Map::new(),
        })
    }

    fn parse_verse(&mut self, block: &mut Block, pos: usize) -> ParseResult<()> {
        let text = self
            .take_text()
            .ok_or_else(|| ParseError::missing_argument(pos, "v", "verse number"))?;
        let trimmed = text.trim_start();
        let number: String = trimmed
            .chars()
            .take_while(|c| c.is_ascii_digit() || c.is_ascii_lowercase() || *c == '-')
            .collect();
        if number.is_empty() || !number.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(ParseError::missing_argument(pos, "v", "verse number"));
        }

        let mut mark = ContentNode::mark("verses");
        mark.atts.insert("number".to_string(), number.clone());
        block.content.push(ContentElement::Node(mark));

        let rest = trimmed[number.len()..].trim_start();
        if !rest.is_empty() {
            Self::push_text(block, rest);
        }
        Ok(())
    }

    /// Character marker pair: `\add ...\add*`, nested as `\+nd ...\+nd*`
    fn parse_wrapper(&mut self, name: &str, pos: usize) -> ParseResult<ContentNode> {
        let base = name.trim_start_matches('+');
        let mut node = ContentNode::wrapper(base);
        let mut first_text = true;

        loop {
            let (token, span) = self
                .peek()
                .cloned()
                .ok_or(ParseError::UnexpectedEof { pos })?;
            match token {
                Token::Text(text) => {
                    self.advance();
                    let collapsed = collapse_ws(text);
                    let collapsed = if first_text {
                        collapsed.trim_start().to_string()
                    } else {
                        collapsed
                    };
                    first_text = false;
                    if !collapsed.is_empty() {
                        Self::push_content_text(&mut node.content, &collapsed);
                    }
                }
                Token::Pipe => {
                    self.advance();
                    self.parse_attributes(&mut node, span.start)?;
                }
                Token::Marker(inner) if inner.starts_with('+') => {
                    self.advance();
                    let nested = self.parse_wrapper(inner, span.start)?;
                    node.content.push(ContentElement::Node(nested));
                }
                Token::EndMarker(end) if end == name => {
                    self.advance();
                    break;
                }
                Token::EndMarker(end) => {
                    return Err(ParseError::UnmatchedClosingMarker {
                        pos: span.start,
                        marker: end.to_string(),
                    });
                }
                Token::Marker(inner) => {
                    return Err(ParseError::UnexpectedMarker {
                        pos: span.start,
                        marker: inner.to_string(),
                    });
                }
                Token::MilestoneEnd => {
                    return Err(ParseError::MalformedAttribute {
                        pos: span.start,
                        text: "milestone close inside character marker".to_string(),
                    });
                }
            }
        }

        Ok(node)
    }

    /// Footnote/cross-reference: caller char, then unclosed character
    /// runs until the matching end marker. Produces a graft node plus a
    /// side sequence registered on the document.
    fn parse_note(
        &mut self,
        name: &str,
        pos: usize,
        doc: &mut PerfDocument,
    ) -> ParseResult<ContentNode> {
        let info = self
            .table
            .get(name)
            .ok_or_else(|| ParseError::unknown_marker(pos, name))?;
        let mut caller: Option<String> = None;
        let mut content: Vec<ContentElement> = Vec::new();

        loop {
            let (token, span) = self
                .peek()
                .cloned()
                .ok_or(ParseError::UnexpectedEof { pos })?;
            match token {
                Token::Text(text) => {
                    self.advance();
                    let collapsed = collapse_ws(text);
                    let trimmed = collapsed.trim_start();
                    if caller.is_none() {
                        let mut chars = trimmed.chars();
                        let first = chars
                            .next()
                            .ok_or_else(|| ParseError::missing_argument(pos, name, "caller"))?;
                        caller = Some(first.to_string());
                        let rest = chars.as_str().trim_start();
                        if !rest.is_empty() {
                            Self::push_content_text(&mut content, rest);
                        }
                    } else if !collapsed.trim().is_empty() {
                        Self::push_content_text(&mut content, &collapsed);
                    }
                }
                Token::Marker(inner) => {
                    if !info.valid_sub_markers.contains(&inner) {
                        return Err(ParseError::UnexpectedMarker {
                            pos: span.start,
                            marker: inner.to_string(),
                        });
                    }
                    self.advance();
                    let mut wrapper = ContentNode::wrapper(inner);
                    while let Some((Token::Text(text), _)) = self.peek() {
                        let collapsed = collapse_ws(text);
                        if wrapper.content.is_empty() {
                            let lead = collapsed.trim_start().to_string();
                            if !lead.is_empty() {
                                Self::push_content_text(&mut wrapper.content, &lead);
                            }
                        } else {
                            Self::push_content_text(&mut wrapper.content, &collapsed);
                        }
                        self.advance();
                    }
                    Self::trim_trailing_text(&mut wrapper.content);
                    content.push(ContentElement::Node(wrapper));
                }
                Token::EndMarker(end) if end == name => {
                    self.advance();
                    break;
                }
                Token::EndMarker(end) => {
                    return Err(ParseError::UnmatchedClosingMarker {
                        pos: span.start,
                        marker: end.to_string(),
                    });
                }
                Token::Pipe | Token::MilestoneEnd => {
                    return Err(ParseError::MalformedAttribute {
                        pos: span.start,
                        text: "separator inside note".to_string(),
                    });
                }
            }
        }

        Self::trim_trailing_text(&mut content);

        let sequence_id = self.ids.new_id();
        let sequence_type = note_sequence_type(name);
        doc.sequences.insert(
            sequence_id.clone(),
            Sequence {
                sequence_type: sequence_type.to_string(),
                blocks: vec![Block {
                    block_type: "paragraph".to_string(),
                    subtype: Some(format!("usfm:{name}")),
                    atts: Default::default(),
                    content,
                    extra: serde_json::Map::new(),
                }],
            },
        );

        let mut graft = ContentNode::graft(sequence_type, sequence_id);
        if let Some(caller) = caller {
            graft.atts.insert("caller".to_string(), caller);
        }
        Ok(graft)
    }

    /// Self-closing milestone: `\ts\*`, optionally with attributes
    fn parse_milestone(&mut self, name: &str, pos: usize) -> ParseResult<ContentNode> {
        let mut node = ContentNode::mark("milestone");
        node.atts.insert("marker".to_string(), name.to_string());

        loop {
            let (token, span) = self
                .peek()
                .cloned()
                .ok_or(ParseError::UnexpectedEof { pos })?;
            match token {
                Token::Pipe => {
                    self.advance();
                    self.parse_attributes(&mut node, span.start)?;
                }
                Token::Text(text) if text.trim().is_empty() => {
                    self.advance();
                }
                Token::MilestoneEnd => {
                    self.advance();
                    break;
                }
                _ => {
                    return Err(ParseError::MalformedAttribute {
                        pos: span.start,
                        text: "unterminated milestone".to_string(),
                    });
                }
            }
        }
        Ok(node)
    }

    /// `|lemma="charis" strong="G5485"` or a bare default value
    fn parse_attributes(&mut self, node: &mut ContentNode, pos: usize) -> ParseResult<()> {
        let text = self
            .take_text()
            .ok_or_else(|| ParseError::MalformedAttribute {
                pos,
                text: "empty attribute list".to_string(),
            })?;
        let text = text.trim();

        if !text.contains('=') {
            // Bare value is the marker's default attribute.
            node.atts.insert("default".to_string(), text.to_string());
            return Ok(());
        }

        for part in split_attributes(text) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ParseError::MalformedAttribute {
                    pos,
                    text: part.clone(),
                })?;
            let value = value.trim().trim_matches('"');
            node.atts.insert(key.trim().to_string(), value.to_string());
        }
        Ok(())
    }

    fn push_text(block: &mut Block, text: &str) {
        let collapsed = collapse_ws(text);
        let collapsed = if block.content.is_empty() {
            collapsed.trim_start().to_string()
        } else {
            collapsed
        };
        if collapsed.is_empty() {
            return;
        }
        Self::push_content_text(&mut block.content, &collapsed);
    }

    fn push_content_text(content: &mut Vec<ContentElement>, text: &str) {
        if let Some(ContentElement::Text(last)) = content.last_mut() {
            if last.ends_with(' ') && text.starts_with(' ') {
                last.push_str(text.trim_start());
            } else {
                last.push_str(text);
            }
            return;
        }
        content.push(ContentElement::text(text));
    }

    fn trim_trailing_text(content: &mut Vec<ContentElement>) {
        if let Some(ContentElement::Text(last)) = content.last_mut() {
            let trimmed = last.trim_end().to_string();
            if trimmed.is_empty() {
                content.pop();
            } else {
                *last = trimmed;
            }
        }
    }

    fn close_block(blocks: &mut Vec<Block>, current: &mut Option<Block>) {
        if let Some(mut block) = current.take() {
            Self::trim_trailing_text(&mut block.content);
            blocks.push(block);
        }
    }

    fn require_block<'b>(
        current: &'b mut Option<Block>,
        pos: usize,
        marker: &str,
    ) -> ParseResult<&'b mut Block> {
        current.as_mut().ok_or_else(|| ParseError::UnexpectedMarker {
            pos,
            marker: marker.to_string(),
        })
    }

    fn is_milestone_ahead(&self) -> bool {
        // A marker opens a milestone when `\*` arrives before any other
        // marker token.
        for (token, _) in self.tokens[self.pos + 1..].iter() {
            match token {
                Token::MilestoneEnd => return true,
                Token::Text(_) | Token::Pipe => continue,
                Token::Marker(_) | Token::EndMarker(_) => return false,
            }
        }
        false
    }

    fn peek(&self) -> Option<&(Token<'src>, Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn take_text(&mut self) -> Option<String> {
        if let Some((Token::Text(text), _)) = self.peek() {
            let out = text.to_string();
            self.advance();
            return Some(out);
        }
        None
    }
}

fn split_attributes(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                buf.push(ch);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !buf.is_empty() {
                    parts.push(std::mem::take(&mut buf));
                }
            }
            c => buf.push(c),
        }
    }
    if !buf.is_empty() {
        parts.push(buf);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> PerfDocument {
        let table = MarkerTable::standard().unwrap();
        let context = SourceContext::new("local", "local", "en", "test");
        to_perf(source, &context, &table).unwrap()
    }

    #[test]
    fn test_parse_minimal_book() {
        let doc = parse("\\id TIT Titus\n\\c 1\n\\p\n\\v 1 Paul, a servant of God");

        assert_eq!(doc.metadata["document"]["bookCode"], "TIT");
        let main = doc.main_sequence().unwrap();
        assert_eq!(main.blocks.len(), 2);
        assert_eq!(main.blocks[0].block_type, "mark");
        assert_eq!(main.blocks[0].atts["number"], "1");

        let para = &main.blocks[1];
        assert_eq!(para.marker(), Some("p"));
        let verse = para.content[0].as_node().unwrap();
        assert_eq!(verse.subtype.as_deref(), Some("verses"));
        assert_eq!(verse.atts["number"], "1");
        assert_eq!(
            para.content[1],
            ContentElement::text("Paul, a servant of God")
        );
    }

    #[test]
    fn test_parse_character_marker() {
        let doc = parse("\\p\n\\v 1 the \\add missing\\add* words");
        let para = &doc.main_sequence().unwrap().blocks[0];

        let wrapper = para.content[2].as_node().unwrap();
        assert_eq!(wrapper.kind, "wrapper");
        assert_eq!(wrapper.marker(), Some("add"));
        assert_eq!(wrapper.content, vec![ContentElement::text("missing")]);
        assert_eq!(para.content[3], ContentElement::text(" words"));
    }

    #[test]
    fn test_parse_footnote_creates_side_sequence() {
        let doc = parse("\\p\n\\v 1 word\\f + \\fr 1:1 \\ft a note\\f* more");

        assert_eq!(doc.sequences.len(), 2);
        let para = &doc.main_sequence().unwrap().blocks[0];
        let graft = para.content[2].as_node().unwrap();
        assert_eq!(graft.kind, "graft");
        assert_eq!(graft.subtype.as_deref(), Some("footnote"));
        assert_eq!(graft.atts["caller"], "+");

        let target = graft.target.as_deref().unwrap();
        let note = &doc.sequences[target];
        assert_eq!(note.sequence_type, "footnote");
        let note_block = &note.blocks[0];
        let fr = note_block.content[0].as_node().unwrap();
        assert_eq!(fr.marker(), Some("fr"));
        assert_eq!(fr.content, vec![ContentElement::text("1:1")]);
    }

    #[test]
    fn test_parse_word_attributes() {
        let doc = parse("\\p\n\\v 1 \\w grace|lemma=\"charis\" strong=\"G5485\"\\w*");
        let para = &doc.main_sequence().unwrap().blocks[0];
        let w = para.content[1].as_node().unwrap();
        assert_eq!(w.atts["lemma"], "charis");
        assert_eq!(w.atts["strong"], "G5485");
    }

    #[test]
    fn test_parse_nested_character_marker() {
        let doc = parse("\\p\n\\v 1 \\add the \\+nd Lord\\+nd* spoke\\add*");
        let para = &doc.main_sequence().unwrap().blocks[0];
        let add = para.content[1].as_node().unwrap();
        let nd = add.content[1].as_node().unwrap();
        assert_eq!(nd.marker(), Some("nd"));
        assert_eq!(nd.content, vec![ContentElement::text("Lord")]);
    }

    #[test]
    fn test_parse_verse_range_number() {
        let doc = parse("\\p\n\\v 3a-5b joined verses");
        let para = &doc.main_sequence().unwrap().blocks[0];
        let verse = para.content[0].as_node().unwrap();
        assert_eq!(verse.atts["number"], "3a-5b");
    }

    #[test]
    fn test_unknown_marker_fails_with_position() {
        let table = MarkerTable::standard().unwrap();
        let context = SourceContext::new("local", "local", "en", "test");
        let err = to_perf("\\p\n\\zzz oops", &context, &table).unwrap_err();
        assert!(matches!(err, ParseError::UnknownMarker { .. }));
        assert_eq!(err.position(), 3);
    }

    #[test]
    fn test_text_outside_block_fails() {
        let table = MarkerTable::standard().unwrap();
        let context = SourceContext::new("local", "local", "en", "test");
        let err = to_perf("stray words", &context, &table).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedText { .. }));
    }

    #[test]
    fn test_milestone_round_trips_as_mark() {
        let doc = parse("\\p\n\\v 1 before \\ts\\* after");
        let para = &doc.main_sequence().unwrap().blocks[0];
        let milestone = para.content[2].as_node().unwrap();
        assert_eq!(milestone.subtype.as_deref(), Some("milestone"));
        assert_eq!(milestone.atts["marker"], "ts");
    }
}
