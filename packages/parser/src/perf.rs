use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{PerfError, PerfResult};

/// Schema version emitted by this adapter.
pub const STRUCTURE_VERSION: &str = "0.2.1";

/// Constraint version emitted by this adapter.
pub const CONSTRAINT_VERSION: &str = "0.2.1";

/// Versioned schema header of a PERF document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub structure: String,
    pub structure_version: String,
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub version: String,
}

impl Schema {
    /// The flat-structure schema header this crate reads and writes
    pub fn flat() -> Self {
        Self {
            structure: "flat".to_string(),
            structure_version: STRUCTURE_VERSION.to_string(),
            constraints: vec![Constraint {
                name: "perf".to_string(),
                version: CONSTRAINT_VERSION.to_string(),
            }],
        }
    }
}

/// Root PERF document
///
/// Sequences are kept in a `BTreeMap` so serialization order is stable
/// across round trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfDocument {
    pub schema: Schema,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub sequences: BTreeMap<String, Sequence>,
    pub main_sequence_id: String,
}

/// Ordered list of blocks with a type tag
///
/// `"main"` for the primary flow, or a side-sequence type such as
/// `"footnote"`, `"xref"` or `"title"` for grafted content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    #[serde(rename = "type")]
    pub sequence_type: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

/// A paragraph-level unit of a sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(rename = "subtype", skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub atts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentElement>,
    // Fields we do not interpret survive a round trip untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Block {
    pub fn paragraph(marker: &str) -> Self {
        Self {
            block_type: "paragraph".to_string(),
            subtype: Some(format!("usfm:{marker}")),
            atts: BTreeMap::new(),
            content: Vec::new(),
            extra: Map::new(),
        }
    }

    /// USFM marker behind the block's `usfm:` subtype, if any
    pub fn marker(&self) -> Option<&str> {
        self.subtype.as_deref().and_then(|s| s.strip_prefix("usfm:"))
    }
}

/// Item in a block's content: plain text or a typed node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentElement {
    Text(String),
    Node(ContentNode),
}

impl ContentElement {
    pub fn text(text: impl Into<String>) -> Self {
        ContentElement::Text(text.into())
    }

    pub fn as_node(&self) -> Option<&ContentNode> {
        match self {
            ContentElement::Node(node) => Some(node),
            ContentElement::Text(_) => None,
        }
    }
}

/// `mark`, `graft` or `wrapper` content node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "subtype", skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub atts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentElement>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentNode {
    pub fn mark(subtype: &str) -> Self {
        Self {
            kind: "mark".to_string(),
            subtype: Some(subtype.to_string()),
            target: None,
            atts: BTreeMap::new(),
            content: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn wrapper(marker: &str) -> Self {
        Self {
            kind: "wrapper".to_string(),
            subtype: Some(format!("usfm:{marker}")),
            target: None,
            atts: BTreeMap::new(),
            content: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn graft(subtype: &str, target: impl Into<String>) -> Self {
        Self {
            kind: "graft".to_string(),
            subtype: Some(subtype.to_string()),
            target: Some(target.into()),
            atts: BTreeMap::new(),
            content: Vec::new(),
            extra: Map::new(),
        }
    }

    /// USFM marker behind a `usfm:` subtype, if any
    pub fn marker(&self) -> Option<&str> {
        self.subtype.as_deref().and_then(|s| s.strip_prefix("usfm:"))
    }
}

impl PerfDocument {
    pub fn new(main_sequence_id: impl Into<String>) -> Self {
        let main_sequence_id = main_sequence_id.into();
        let mut sequences = BTreeMap::new();
        sequences.insert(
            main_sequence_id.clone(),
            Sequence {
                sequence_type: "main".to_string(),
                blocks: Vec::new(),
            },
        );
        Self {
            schema: Schema::flat(),
            metadata: Map::new(),
            sequences,
            main_sequence_id,
        }
    }

    pub fn main_sequence(&self) -> PerfResult<&Sequence> {
        self.sequences
            .get(&self.main_sequence_id)
            .ok_or_else(|| PerfError::MissingMainSequence(self.main_sequence_id.clone()))
    }

    /// Check the two reference invariants: the main sequence id must key
    /// an existing sequence, and every graft target must resolve.
    pub fn check_references(&self) -> PerfResult<()> {
        if !self.sequences.contains_key(&self.main_sequence_id) {
            return Err(PerfError::MissingMainSequence(self.main_sequence_id.clone()));
        }

        for sequence in self.sequences.values() {
            for block in &sequence.blocks {
                self.check_content_references(&block.content)?;
            }
        }

        Ok(())
    }

    fn check_content_references(&self, content: &[ContentElement]) -> PerfResult<()> {
        for element in content {
            if let ContentElement::Node(node) = element {
                if node.kind == "graft" {
                    let target = node.target.as_deref().unwrap_or_default();
                    if !self.sequences.contains_key(target) {
                        return Err(PerfError::DanglingGraft {
                            target: target.to_string(),
                        });
                    }
                }
                self.check_content_references(&node.content)?;
            }
        }
        Ok(())
    }
}
