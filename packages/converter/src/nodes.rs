use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Editable document node description
///
/// A tree mirroring the PERF structure. Every node kind is closed; the
/// converter refuses subtrees it cannot map rather than guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DocNode {
    /// Marker element (paragraph, heading, wrapper with structure)
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<DocNode>,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        unknown_attributes: Map<String, Value>,
    },

    /// Character-styled text run
    Char {
        marker: String,
        text: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        unknown_attributes: Map<String, Value>,
    },

    /// Plain text run
    Text { text: String },

    /// Verse marker; number may be `"3"`, `"3a"`, `"3-5"` or `"3a-5b"`
    Verse { number: String },

    /// Chapter marker
    Chapter { number: String },

    /// Opaque, independently editable sub-region backed by its own
    /// sequence
    Graft {
        sequence_id: String,
        subtype: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<DocNode>,
    },
}

impl DocNode {
    pub fn element(tag: impl Into<String>) -> Self {
        DocNode::Element {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            unknown_attributes: Map::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        DocNode::Text { text: text.into() }
    }

    pub fn children(&self) -> &[DocNode] {
        match self {
            DocNode::Element { children, .. } | DocNode::Graft { children, .. } => children,
            _ => &[],
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        match self {
            DocNode::Element { attributes, .. } | DocNode::Graft { attributes, .. } => {
                attributes.get(key).map(String::as_str)
            }
            _ => None,
        }
    }

    /// Concatenated text content of the subtree
    pub fn text_content(&self) -> String {
        match self {
            DocNode::Text { text } | DocNode::Char { text, .. } => text.clone(),
            DocNode::Element { children, .. } | DocNode::Graft { children, .. } => {
                children.iter().map(|c| c.text_content()).collect()
            }
            DocNode::Verse { .. } | DocNode::Chapter { .. } => String::new(),
        }
    }
}

/// Shape of PERF node a document subtree maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfKind {
    Document,
    Sequence,
    Block,
    ContentElement,
}

/// PERF kind a document node would reconstruct as, if any
pub fn perf_kind_of(node: &DocNode) -> Option<PerfKind> {
    match node {
        DocNode::Element { .. } => match node.attribute("perf-type") {
            Some("sequence") => Some(PerfKind::Sequence),
            Some("paragraph") => Some(PerfKind::Block),
            Some("mark") | Some("wrapper") => Some(PerfKind::ContentElement),
            _ => None,
        },
        DocNode::Chapter { .. } => Some(PerfKind::Block),
        DocNode::Verse { .. } | DocNode::Char { .. } | DocNode::Text { .. } => {
            Some(PerfKind::ContentElement)
        }
        DocNode::Graft { .. } => Some(PerfKind::ContentElement),
    }
}
