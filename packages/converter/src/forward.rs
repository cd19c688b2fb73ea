//! PERF tree → editable document tree.
//!
//! Classification policy: a block or wrapper whose marker is inline and
//! whose content is plain text becomes a text-run node; anything with
//! inner structure becomes an element node so no content is dropped.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use scriptorium_parser::markers::{MarkerKind, MarkerTable};
use scriptorium_parser::perf::{Block, ContentElement, ContentNode, PerfDocument, Sequence};

use crate::error::{ConvertError, ConvertResult};
use crate::nodes::DocNode;

const ATTS_PREFIX: &str = "perf-atts-";

/// Convert a PERF document's main sequence into a document node tree
pub fn perf_to_document(doc: &PerfDocument, table: &MarkerTable) -> ConvertResult<DocNode> {
    let main = doc
        .sequences
        .get(&doc.main_sequence_id)
        .ok_or_else(|| ConvertError::DanglingGraft {
            target: doc.main_sequence_id.clone(),
        })?;
    convert_sequence(doc, main, table)
}

fn convert_sequence(
    doc: &PerfDocument,
    sequence: &Sequence,
    table: &MarkerTable,
) -> ConvertResult<DocNode> {
    let mut attributes = BTreeMap::new();
    attributes.insert("perf-type".to_string(), "sequence".to_string());
    attributes.insert("perf-subtype".to_string(), sequence.sequence_type.clone());

    let children = sequence
        .blocks
        .iter()
        .map(|block| convert_block(doc, block, table))
        .collect::<ConvertResult<Vec<_>>>()?;

    Ok(DocNode::Element {
        tag: "root".to_string(),
        attributes,
        children,
        unknown_attributes: Map::new(),
    })
}

pub(crate) fn convert_block(
    doc: &PerfDocument,
    block: &Block,
    table: &MarkerTable,
) -> ConvertResult<DocNode> {
    match block.block_type.as_str() {
        "mark" if block.subtype.as_deref() == Some("chapter") => {
            let number = block
                .atts
                .get("number")
                .ok_or(ConvertError::MissingAttribute {
                    attribute: "number",
                })?;
            Ok(DocNode::Chapter {
                number: number.clone(),
            })
        }
        "paragraph" => {
            let marker = block
                .marker()
                .ok_or_else(|| ConvertError::UnmappableBlock {
                    block_type: block.block_type.clone(),
                })?;
            let info = table.get(marker).ok_or_else(|| ConvertError::UnknownMarker {
                marker: marker.to_string(),
            })?;

            if info.kind == MarkerKind::Inline && is_plain_text(&block.content) {
                return Ok(DocNode::Char {
                    marker: marker.to_string(),
                    text: joined_text(&block.content),
                    unknown_attributes: merge_unknown(&block.atts, &block.extra),
                });
            }

            let mut attributes = BTreeMap::new();
            attributes.insert("perf-type".to_string(), block.block_type.clone());
            if let Some(subtype) = &block.subtype {
                attributes.insert("perf-subtype".to_string(), subtype.clone());
            }
            attributes.insert("class".to_string(), marker.to_string());
            for (key, value) in &block.atts {
                attributes.insert(format!("{ATTS_PREFIX}{key}"), value.clone());
            }

            let children = block
                .content
                .iter()
                .map(|element| convert_content(doc, element, table))
                .collect::<ConvertResult<Vec<_>>>()?;

            Ok(DocNode::Element {
                tag: marker.to_string(),
                attributes,
                children,
                unknown_attributes: block.extra.clone(),
            })
        }
        other => Err(ConvertError::UnmappableBlock {
            block_type: other.to_string(),
        }),
    }
}

fn convert_content(
    doc: &PerfDocument,
    element: &ContentElement,
    table: &MarkerTable,
) -> ConvertResult<DocNode> {
    let node = match element {
        ContentElement::Text(text) => return Ok(DocNode::text(text.clone())),
        ContentElement::Node(node) => node,
    };

    match node.kind.as_str() {
        "mark" => convert_mark(node),
        "wrapper" => convert_wrapper(doc, node, table),
        "graft" => convert_graft(doc, node, table),
        other => Err(ConvertError::UnmappableContent {
            kind: other.to_string(),
            subtype: node.subtype.clone().unwrap_or_default(),
        }),
    }
}

fn convert_mark(node: &ContentNode) -> ConvertResult<DocNode> {
    match node.subtype.as_deref() {
        Some("verses") => {
            let number = node
                .atts
                .get("number")
                .ok_or(ConvertError::MissingAttribute {
                    attribute: "number",
                })?;
            Ok(DocNode::Verse {
                number: number.clone(),
            })
        }
        Some("chapter") => {
            let number = node
                .atts
                .get("number")
                .ok_or(ConvertError::MissingAttribute {
                    attribute: "number",
                })?;
            Ok(DocNode::Chapter {
                number: number.clone(),
            })
        }
        Some("milestone") => {
            let marker = node
                .atts
                .get("marker")
                .ok_or(ConvertError::MissingAttribute {
                    attribute: "marker",
                })?;
            let mut attributes = BTreeMap::new();
            attributes.insert("perf-type".to_string(), "mark".to_string());
            attributes.insert("perf-subtype".to_string(), "milestone".to_string());
            for (key, value) in &node.atts {
                if key != "marker" {
                    attributes.insert(format!("{ATTS_PREFIX}{key}"), value.clone());
                }
            }
            Ok(DocNode::Element {
                tag: marker.clone(),
                attributes,
                children: Vec::new(),
                unknown_attributes: node.extra.clone(),
            })
        }
        other => Err(ConvertError::UnmappableContent {
            kind: "mark".to_string(),
            subtype: other.unwrap_or_default().to_string(),
        }),
    }
}

fn convert_wrapper(
    doc: &PerfDocument,
    node: &ContentNode,
    table: &MarkerTable,
) -> ConvertResult<DocNode> {
    let marker = node.marker().ok_or_else(|| ConvertError::UnmappableContent {
        kind: "wrapper".to_string(),
        subtype: node.subtype.clone().unwrap_or_default(),
    })?;
    if table.get(marker).is_none() {
        return Err(ConvertError::UnknownMarker {
            marker: marker.to_string(),
        });
    }

    if is_plain_text(&node.content) {
        return Ok(DocNode::Char {
            marker: marker.to_string(),
            text: joined_text(&node.content),
            unknown_attributes: merge_unknown(&node.atts, &node.extra),
        });
    }

    let mut attributes = BTreeMap::new();
    attributes.insert("perf-type".to_string(), "wrapper".to_string());
    attributes.insert("perf-subtype".to_string(), format!("usfm:{marker}"));
    attributes.insert("class".to_string(), marker.to_string());
    for (key, value) in &node.atts {
        attributes.insert(format!("{ATTS_PREFIX}{key}"), value.clone());
    }

    let children = node
        .content
        .iter()
        .map(|element| convert_content(doc, element, table))
        .collect::<ConvertResult<Vec<_>>>()?;

    Ok(DocNode::Element {
        tag: marker.to_string(),
        attributes,
        children,
        unknown_attributes: node.extra.clone(),
    })
}

fn convert_graft(
    doc: &PerfDocument,
    node: &ContentNode,
    table: &MarkerTable,
) -> ConvertResult<DocNode> {
    let target = node.target.clone().unwrap_or_default();
    let sequence = doc
        .sequences
        .get(&target)
        .ok_or_else(|| ConvertError::DanglingGraft {
            target: target.clone(),
        })?;

    let children = sequence
        .blocks
        .iter()
        .map(|block| convert_block(doc, block, table))
        .collect::<ConvertResult<Vec<_>>>()?;

    Ok(DocNode::Graft {
        sequence_id: target,
        subtype: node.subtype.clone().unwrap_or_default(),
        attributes: node.atts.clone(),
        children,
    })
}

fn is_plain_text(content: &[ContentElement]) -> bool {
    content
        .iter()
        .all(|element| matches!(element, ContentElement::Text(_)))
}

fn joined_text(content: &[ContentElement]) -> String {
    content
        .iter()
        .filter_map(|element| match element {
            ContentElement::Text(text) => Some(text.as_str()),
            ContentElement::Node(_) => None,
        })
        .collect()
}

fn merge_unknown(atts: &BTreeMap<String, String>, extra: &Map<String, Value>) -> Map<String, Value> {
    let mut unknown = Map::new();
    for (key, value) in atts {
        unknown.insert(key.clone(), Value::String(value.clone()));
    }
    for (key, value) in extra {
        unknown.insert(key.clone(), value.clone());
    }
    unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptorium_parser::parser::{to_perf, SourceContext};

    fn convert(source: &str) -> DocNode {
        let table = MarkerTable::standard().unwrap();
        let context = SourceContext::new("local", "local", "en", "test");
        let doc = to_perf(source, &context, &table).unwrap();
        perf_to_document(&doc, &table).unwrap()
    }

    #[test]
    fn test_paragraph_becomes_element() {
        let root = convert("\\p\n\\v 1 In the beginning");
        let para = &root.children()[0];

        assert_eq!(para.attribute("perf-type"), Some("paragraph"));
        assert_eq!(para.attribute("perf-subtype"), Some("usfm:p"));
        assert_eq!(para.attribute("class"), Some("p"));
        assert!(matches!(para.children()[0], DocNode::Verse { .. }));
        assert!(matches!(para.children()[1], DocNode::Text { .. }));
    }

    #[test]
    fn test_chapter_becomes_division_node() {
        let root = convert("\\c 3\n\\p\n\\v 1 text");
        assert_eq!(
            root.children()[0],
            DocNode::Chapter {
                number: "3".to_string()
            }
        );
    }

    #[test]
    fn test_inline_wrapper_becomes_char_run() {
        let root = convert("\\p\n\\v 1 the \\nd Lord\\nd* spoke");
        let para = &root.children()[0];

        match &para.children()[2] {
            DocNode::Char { marker, text, .. } => {
                assert_eq!(marker, "nd");
                assert_eq!(text, "Lord");
            }
            other => panic!("expected char run, got {other:?}"),
        }
    }

    #[test]
    fn test_wrapper_attributes_are_preserved_opaquely() {
        let root = convert("\\p\n\\v 1 \\w grace|lemma=\"charis\"\\w*");
        let para = &root.children()[0];

        match &para.children()[1] {
            DocNode::Char {
                unknown_attributes, ..
            } => {
                assert_eq!(unknown_attributes["lemma"], "charis");
            }
            other => panic!("expected char run, got {other:?}"),
        }
    }

    #[test]
    fn test_graft_carries_target_sequence() {
        let root = convert("\\p\n\\v 1 word\\f + \\fr 1:1 \\ft note\\f*");
        let para = &root.children()[0];

        match &para.children()[2] {
            DocNode::Graft {
                sequence_id,
                subtype,
                attributes,
                children,
            } => {
                assert!(!sequence_id.is_empty());
                assert_eq!(subtype, "footnote");
                assert_eq!(attributes["caller"], "+");
                // The note body is editable through the graft's children.
                assert_eq!(children.len(), 1);
            }
            other => panic!("expected graft, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_block_marker_is_reported() {
        let table = MarkerTable::standard().unwrap();
        let mut doc = scriptorium_parser::PerfDocument::new("main");
        if let Some(main) = doc.sequences.get_mut("main") {
            main.blocks
                .push(scriptorium_parser::Block::paragraph("zz"));
        }

        let err = perf_to_document(&doc, &table).unwrap_err();
        assert!(matches!(err, ConvertError::UnknownMarker { .. }));
    }
}
