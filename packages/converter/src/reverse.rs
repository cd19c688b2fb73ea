//! Editable document tree → PERF nodes.
//!
//! The reverse path reconstructs `ContentElement`/`Block`/`Sequence`
//! shapes from serialized subtrees. Grafted content produces side
//! sequences that the caller merges into the document's sequence table.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use scriptorium_parser::markers::MarkerTable;
use scriptorium_parser::perf::{Block, ContentElement, ContentNode, Sequence};

use crate::error::{ConvertError, ConvertResult};
use crate::nodes::{DocNode, PerfKind};

const ATTS_PREFIX: &str = "perf-atts-";

/// Reconstructed PERF node
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum PerfNode {
    Sequence(Sequence),
    Block(Block),
    Content(ContentElement),
}

/// Result of a reverse conversion: the primary node plus any side
/// sequences materialized from grafted content.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub node: PerfNode,
    pub side_sequences: BTreeMap<String, Sequence>,
}

/// Reconstruct the PERF node for a document subtree.
///
/// Fails when the subtree cannot be mapped to the requested shape;
/// nothing is defaulted silently.
pub fn document_to_perf(
    node: &DocNode,
    kind: PerfKind,
    table: &MarkerTable,
) -> ConvertResult<Conversion> {
    let mut side_sequences = BTreeMap::new();
    let node = match kind {
        PerfKind::Sequence => PerfNode::Sequence(to_sequence(node, table, &mut side_sequences)?),
        PerfKind::Block => PerfNode::Block(to_block(node, table, &mut side_sequences)?),
        PerfKind::ContentElement => {
            PerfNode::Content(to_content(node, table, &mut side_sequences)?)
        }
        PerfKind::Document => {
            return Err(ConvertError::KindMismatch {
                node_type: node_type_name(node),
                expected: "document",
            });
        }
    };
    Ok(Conversion {
        node,
        side_sequences,
    })
}

fn node_type_name(node: &DocNode) -> &'static str {
    match node {
        DocNode::Element { .. } => "element",
        DocNode::Char { .. } => "char",
        DocNode::Text { .. } => "text",
        DocNode::Verse { .. } => "verse",
        DocNode::Chapter { .. } => "chapter",
        DocNode::Graft { .. } => "graft",
    }
}

fn to_sequence(
    node: &DocNode,
    table: &MarkerTable,
    side: &mut BTreeMap<String, Sequence>,
) -> ConvertResult<Sequence> {
    match node {
        DocNode::Element {
            attributes,
            children,
            ..
        } if attributes.get("perf-type").map(String::as_str) == Some("sequence") => {
            let sequence_type = attributes
                .get("perf-subtype")
                .cloned()
                .unwrap_or_else(|| "main".to_string());
            let blocks = children
                .iter()
                .map(|child| to_block(child, table, side))
                .collect::<ConvertResult<Vec<_>>>()?;
            Ok(Sequence {
                sequence_type,
                blocks,
            })
        }
        other => Err(ConvertError::KindMismatch {
            node_type: node_type_name(other),
            expected: "sequence",
        }),
    }
}

fn to_block(
    node: &DocNode,
    table: &MarkerTable,
    side: &mut BTreeMap<String, Sequence>,
) -> ConvertResult<Block> {
    match node {
        DocNode::Chapter { number } => {
            let mut atts = BTreeMap::new();
            atts.insert("number".to_string(), number.clone());
            Ok(Block {
                block_type: "mark".to_string(),
                subtype: Some("chapter".to_string()),
                atts,
                content: Vec::new(),
                extra: Map::new(),
            })
        }
        DocNode::Element {
            tag,
            attributes,
            children,
            unknown_attributes,
        } if attributes.get("perf-type").map(String::as_str) == Some("paragraph") => {
            let marker = attributes
                .get("class")
                .map(String::as_str)
                .unwrap_or(tag.as_str());
            if table.get(marker).is_none() {
                return Err(ConvertError::UnknownMarker {
                    marker: marker.to_string(),
                });
            }

            let content = children
                .iter()
                .map(|child| to_content(child, table, side))
                .collect::<ConvertResult<Vec<_>>>()?;

            Ok(Block {
                block_type: "paragraph".to_string(),
                subtype: attributes.get("perf-subtype").cloned(),
                atts: plain_attributes(attributes),
                content,
                extra: unknown_attributes.clone(),
            })
        }
        DocNode::Char {
            marker,
            text,
            unknown_attributes,
        } => {
            // An inline-classified block (a footnote body, for example)
            // round-trips through a single text-run node.
            let (atts, extra) = split_unknown(unknown_attributes);
            Ok(Block {
                block_type: "paragraph".to_string(),
                subtype: Some(format!("usfm:{marker}")),
                atts,
                content: vec![ContentElement::text(text.clone())],
                extra,
            })
        }
        other => Err(ConvertError::KindMismatch {
            node_type: node_type_name(other),
            expected: "block",
        }),
    }
}

fn to_content(
    node: &DocNode,
    table: &MarkerTable,
    side: &mut BTreeMap<String, Sequence>,
) -> ConvertResult<ContentElement> {
    match node {
        DocNode::Text { text } => Ok(ContentElement::text(text.clone())),
        DocNode::Verse { number } => {
            let mut mark = ContentNode::mark("verses");
            mark.atts.insert("number".to_string(), number.clone());
            Ok(ContentElement::Node(mark))
        }
        DocNode::Chapter { number } => {
            let mut mark = ContentNode::mark("chapter");
            mark.atts.insert("number".to_string(), number.clone());
            Ok(ContentElement::Node(mark))
        }
        DocNode::Char {
            marker,
            text,
            unknown_attributes,
        } => {
            let mut wrapper = ContentNode::wrapper(marker);
            let (atts, extra) = split_unknown(unknown_attributes);
            wrapper.atts = atts;
            wrapper.extra = extra;
            if !text.is_empty() {
                wrapper.content.push(ContentElement::text(text.clone()));
            }
            Ok(ContentElement::Node(wrapper))
        }
        DocNode::Element {
            tag,
            attributes,
            children,
            unknown_attributes,
        } => match attributes.get("perf-type").map(String::as_str) {
            Some("wrapper") => {
                let marker = attributes
                    .get("class")
                    .map(String::as_str)
                    .unwrap_or(tag.as_str());
                if table.get(marker).is_none() {
                    return Err(ConvertError::UnknownMarker {
                        marker: marker.to_string(),
                    });
                }
                let mut wrapper = ContentNode::wrapper(marker);
                wrapper.atts = plain_attributes(attributes);
                wrapper.extra = unknown_attributes.clone();
                wrapper.content = children
                    .iter()
                    .map(|child| to_content(child, table, side))
                    .collect::<ConvertResult<Vec<_>>>()?;
                Ok(ContentElement::Node(wrapper))
            }
            Some("mark") if attributes.get("perf-subtype").map(String::as_str) == Some("milestone") => {
                let mut mark = ContentNode::mark("milestone");
                mark.atts.insert("marker".to_string(), tag.clone());
                for (key, value) in plain_attributes(attributes) {
                    mark.atts.insert(key, value);
                }
                mark.extra = unknown_attributes.clone();
                Ok(ContentElement::Node(mark))
            }
            _ => Err(ConvertError::KindMismatch {
                node_type: "element",
                expected: "content element",
            }),
        },
        DocNode::Graft {
            sequence_id,
            subtype,
            attributes,
            children,
        } => {
            let blocks = children
                .iter()
                .map(|child| to_block(child, table, side))
                .collect::<ConvertResult<Vec<_>>>()?;
            side.insert(
                sequence_id.clone(),
                Sequence {
                    sequence_type: subtype.clone(),
                    blocks,
                },
            );

            let mut graft = ContentNode::graft(subtype, sequence_id.clone());
            graft.atts = attributes.clone();
            Ok(ContentElement::Node(graft))
        }
    }
}

/// Attributes that came from PERF `atts`, minus the converter's own
/// `perf-*` and `class` bookkeeping
fn plain_attributes(attributes: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    attributes
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(ATTS_PREFIX)
                .map(|stripped| (stripped.to_string(), value.clone()))
        })
        .collect()
}

/// Split opaque attributes back into string `atts` and structured
/// `extra` fields
fn split_unknown(unknown: &Map<String, Value>) -> (BTreeMap<String, String>, Map<String, Value>) {
    let mut atts = BTreeMap::new();
    let mut extra = Map::new();
    for (key, value) in unknown {
        match value {
            Value::String(text) => {
                atts.insert(key.clone(), text.clone());
            }
            other => {
                extra.insert(key.clone(), other.clone());
            }
        }
    }
    (atts, extra)
}
