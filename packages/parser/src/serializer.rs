use crate::error::SerializeError;
use crate::perf::{Block, ContentElement, ContentNode, PerfDocument, Sequence};
use std::collections::BTreeMap;

/// Serialize a PERF document back to marker-stream text
pub fn to_marker_text(doc: &PerfDocument) -> Result<String, SerializeError> {
    Serializer::new(doc).serialize()
}

/// Serializer converts a PERF tree back to USFM-style markup.
///
/// Structure is preserved exactly; whitespace is normalized (one block
/// marker per line, single spaces inside content).
pub struct Serializer<'doc> {
    doc: &'doc PerfDocument,
    output: String,
}

impl<'doc> Serializer<'doc> {
    pub fn new(doc: &'doc PerfDocument) -> Self {
        Self {
            doc,
            output: String::new(),
        }
    }

    pub fn serialize(mut self) -> Result<String, SerializeError> {
        self.serialize_book_id();

        let main = self
            .doc
            .sequences
            .get(&self.doc.main_sequence_id)
            .ok_or_else(|| SerializeError::MissingMainSequence(self.doc.main_sequence_id.clone()))?;

        for block in &main.blocks {
            self.serialize_block(block)?;
        }

        Ok(self.output)
    }

    fn serialize_book_id(&mut self) {
        let document = self.doc.metadata.get("document");
        let code = document
            .and_then(|d| d.get("bookCode"))
            .and_then(|c| c.as_str());
        if let Some(code) = code {
            self.output.push_str("\\id ");
            self.output.push_str(code);
            let description = document
                .and_then(|d| d.get("description"))
                .and_then(|d| d.as_str());
            if let Some(description) = description {
                self.output.push(' ');
                self.output.push_str(description);
            }
            self.output.push('\n');
        }
    }

    fn serialize_block(&mut self, block: &Block) -> Result<(), SerializeError> {
        match block.block_type.as_str() {
            "mark" if block.subtype.as_deref() == Some("chapter") => {
                self.output.push_str("\\c ");
                self.output
                    .push_str(block.atts.get("number").map(String::as_str).unwrap_or("0"));
                self.output.push('\n');
            }
            "paragraph" => {
                let marker = block.marker().unwrap_or("p");
                self.output.push('\\');
                self.output.push_str(marker);
                self.output.push('\n');
                for element in &block.content {
                    self.serialize_content(element, 0)?;
                }
                self.trim_trailing_spaces();
                if !self.output.ends_with('\n') {
                    self.output.push('\n');
                }
            }
            other => {
                return Err(SerializeError::UnserializableNode {
                    kind: other.to_string(),
                });
            }
        }
        Ok(())
    }

    fn serialize_content(
        &mut self,
        element: &ContentElement,
        depth: usize,
    ) -> Result<(), SerializeError> {
        match element {
            ContentElement::Text(text) => self.output.push_str(text),
            ContentElement::Node(node) => self.serialize_node(node, depth)?,
        }
        Ok(())
    }

    fn serialize_node(&mut self, node: &ContentNode, depth: usize) -> Result<(), SerializeError> {
        match node.kind.as_str() {
            "mark" => match node.subtype.as_deref() {
                Some("verses") => {
                    self.output.push_str("\\v ");
                    self.output
                        .push_str(node.atts.get("number").map(String::as_str).unwrap_or("0"));
                    self.output.push(' ');
                }
                Some("milestone") => {
                    let marker = node.atts.get("marker").map(String::as_str).unwrap_or("ts");
                    self.output.push('\\');
                    self.output.push_str(marker);
                    self.serialize_attributes(&node.atts, &["marker"]);
                    self.output.push_str("\\*");
                }
                other => {
                    return Err(SerializeError::UnserializableNode {
                        kind: format!("mark/{}", other.unwrap_or("none")),
                    });
                }
            },
            "wrapper" => {
                let marker = node.marker().ok_or_else(|| SerializeError::UnserializableNode {
                    kind: "wrapper".to_string(),
                })?;
                let name = if depth > 0 {
                    format!("+{marker}")
                } else {
                    marker.to_string()
                };
                self.output.push('\\');
                self.output.push_str(&name);
                self.output.push(' ');
                for child in &node.content {
                    self.serialize_content(child, depth + 1)?;
                }
                self.serialize_attributes(&node.atts, &[]);
                self.output.push('\\');
                self.output.push_str(&name);
                self.output.push('*');
            }
            "graft" => {
                let target = node.target.as_deref().unwrap_or_default();
                let sequence = self.doc.sequences.get(target).ok_or_else(|| {
                    SerializeError::UnknownGraftTarget {
                        target: target.to_string(),
                    }
                })?;
                self.serialize_note(node, sequence)?;
            }
            other => {
                return Err(SerializeError::UnserializableNode {
                    kind: other.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Grafted note sequences serialize inline at the graft site:
    /// `\f + \fr 1:1 \ft text\f*`
    fn serialize_note(
        &mut self,
        graft: &ContentNode,
        sequence: &Sequence,
    ) -> Result<(), SerializeError> {
        let marker = sequence
            .blocks
            .first()
            .and_then(|block| block.marker())
            .unwrap_or(match sequence.sequence_type.as_str() {
                "xref" => "x",
                _ => "f",
            });

        self.output.push('\\');
        self.output.push_str(marker);
        self.output.push(' ');
        self.output
            .push_str(graft.atts.get("caller").map(String::as_str).unwrap_or("+"));
        self.output.push(' ');

        for block in &sequence.blocks {
            for element in &block.content {
                match element {
                    ContentElement::Text(text) => self.output.push_str(text),
                    ContentElement::Node(inner) if inner.kind == "wrapper" => {
                        let inner_marker = inner.marker().ok_or_else(|| {
                            SerializeError::UnserializableNode {
                                kind: "wrapper".to_string(),
                            }
                        })?;
                        self.output.push('\\');
                        self.output.push_str(inner_marker);
                        self.output.push(' ');
                        for child in &inner.content {
                            self.serialize_content(child, 1)?;
                        }
                        self.output.push(' ');
                    }
                    ContentElement::Node(inner) => {
                        return Err(SerializeError::UnserializableNode {
                            kind: inner.kind.clone(),
                        });
                    }
                }
            }
        }

        self.trim_trailing_spaces();
        self.output.push('\\');
        self.output.push_str(marker);
        self.output.push('*');
        Ok(())
    }

    fn serialize_attributes(&mut self, atts: &BTreeMap<String, String>, skip: &[&str]) {
        if let Some(default) = atts.get("default") {
            self.output.push('|');
            self.output.push_str(default);
            return;
        }

        let mut wrote_pipe = false;
        for (key, value) in atts {
            if skip.contains(&key.as_str()) {
                continue;
            }
            if !wrote_pipe {
                self.output.push('|');
                wrote_pipe = true;
            } else {
                self.output.push(' ');
            }
            self.output.push_str(key);
            self.output.push_str("=\"");
            self.output.push_str(value);
            self.output.push('"');
        }
    }

    fn trim_trailing_spaces(&mut self) {
        while self.output.ends_with(' ') {
            self.output.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::MarkerTable;
    use crate::parser::{to_perf, SourceContext};

    fn round_trip(source: &str) -> (String, String) {
        let table = MarkerTable::standard().unwrap();
        let context = SourceContext::new("local", "local", "en", "test");
        let doc = to_perf(source, &context, &table).unwrap();
        let output = to_marker_text(&doc).unwrap();
        (source.to_string(), output)
    }

    fn normalize(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_round_trip_minimal_book() {
        let (input, output) =
            round_trip("\\id TIT Titus\n\\c 1\n\\p\n\\v 1 Paul, a servant of God\n\\v 2 in hope");
        assert_eq!(normalize(&input), normalize(&output));
    }

    #[test]
    fn test_round_trip_character_markers() {
        let (input, output) =
            round_trip("\\p\n\\v 1 the \\add missing\\add* words \\nd Lord\\nd* here");
        assert_eq!(normalize(&input), normalize(&output));
    }

    #[test]
    fn test_round_trip_footnote() {
        let (input, output) = round_trip("\\p\n\\v 1 word\\f + \\fr 1:1 \\ft a note\\f* more");
        assert_eq!(normalize(&input), normalize(&output));
    }

    #[test]
    fn test_round_trip_word_attributes() {
        let (input, output) = round_trip("\\p\n\\v 1 \\w grace|lemma=\"charis\"\\w* abounds");
        assert_eq!(normalize(&input), normalize(&output));
    }

    #[test]
    fn test_round_trip_poetry_and_headings() {
        let (input, output) = round_trip(
            "\\id PSA\n\\c 23\n\\s1 The Lord Is My Shepherd\n\\q1\n\\v 1 The Lord is my shepherd\n\\q2 I shall not want",
        );
        assert_eq!(normalize(&input), normalize(&output));
    }

    #[test]
    fn test_round_trip_is_stable() {
        let source = "\\id TIT\n\\c 1\n\\p\n\\v 1 first \\add words\\add*\\f + \\ft note\\f*";
        let table = MarkerTable::standard().unwrap();
        let context = SourceContext::new("local", "local", "en", "test");

        let doc1 = to_perf(source, &context, &table).unwrap();
        let once = to_marker_text(&doc1).unwrap();
        let doc2 = to_perf(&once, &context, &table).unwrap();
        let twice = to_marker_text(&doc2).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_dangling_graft_fails_serialization() {
        use crate::perf::{Block, ContentElement, ContentNode, PerfDocument};

        let mut doc = PerfDocument::new("main");
        let mut block = Block::paragraph("p");
        block
            .content
            .push(ContentElement::Node(ContentNode::graft("footnote", "gone")));
        if let Some(main) = doc.sequences.get_mut("main") {
            main.blocks.push(block);
        }

        let err = to_marker_text(&doc).unwrap_err();
        assert!(matches!(err, SerializeError::UnknownGraftTarget { .. }));
    }
}
