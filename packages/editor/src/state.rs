//! Editor state arena.
//!
//! Nodes live in an arena of records keyed by a stable id. A snapshot is
//! immutable once committed; a transaction clones the arena, writes into
//! the clone, and commits it as the next snapshot. "Latest" lookups are
//! plain fetches from the current snapshot.

use serde_json::Map;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use scriptorium_converter::DocNode;
use scriptorium_parser::id_generator::IdGenerator;

use crate::errors::EditorError;

pub type NodeKey = String;

/// Kinds of nodes an editing session can host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Element,
    TextRun,
    Verse,
    Chapter,
    Graft,
}

/// Editing mode of a text run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    Plain,
    Token,
}

/// Payload of one arena record
#[derive(Debug, Clone, PartialEq)]
pub enum NodeBody {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
        unknown_attributes: Map<String, Value>,
    },
    TextRun {
        /// `None` for plain text, `Some(marker)` for character-styled runs
        marker: Option<String>,
        text: String,
        mode: TextMode,
        unknown_attributes: Map<String, Value>,
    },
    Verse {
        number: String,
    },
    Chapter {
        number: String,
    },
    Graft {
        sequence_id: String,
        subtype: String,
        attributes: BTreeMap<String, String>,
    },
}

impl NodeBody {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeBody::Element { .. } => NodeKind::Element,
            NodeBody::TextRun { .. } => NodeKind::TextRun,
            NodeBody::Verse { .. } => NodeKind::Verse,
            NodeBody::Chapter { .. } => NodeKind::Chapter,
            NodeBody::Graft { .. } => NodeKind::Graft,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, NodeBody::TextRun { .. })
    }
}

/// One arena record: payload plus tree links
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub parent: Option<NodeKey>,
    pub children: Vec<NodeKey>,
    pub body: NodeBody,
}

/// Where a selection point sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Text,
    Element,
}

/// One end of a selection
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
    pub kind: PointKind,
}

impl Point {
    pub fn text(key: impl Into<NodeKey>, offset: usize) -> Self {
        Self {
            key: key.into(),
            offset,
            kind: PointKind::Text,
        }
    }
}

/// Range selection over the arena
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// Immutable snapshot of the document tree
#[derive(Debug, Clone, PartialEq)]
pub struct EditorState {
    nodes: HashMap<NodeKey, NodeRecord>,
    root: NodeKey,
    selection: Option<Selection>,
}

impl EditorState {
    /// Build an arena from a converted document tree
    pub fn from_doc_tree(tree: &DocNode, ids: &mut IdGenerator) -> Self {
        let mut nodes = HashMap::new();
        let root = intern_node(tree, None, ids, &mut nodes);
        Self {
            nodes,
            root,
            selection: None,
        }
    }

    pub fn root(&self) -> &NodeKey {
        &self.root
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn node(&self, key: &str) -> Option<&NodeRecord> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Child-index path from the root to `key` (root excluded)
    pub fn path_of(&self, key: &str) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = key.to_string();
        while current != self.root {
            let record = self.nodes.get(&current)?;
            let parent_key = record.parent.clone()?;
            let parent = self.nodes.get(&parent_key)?;
            let index = parent.children.iter().position(|c| *c == current)?;
            path.push(index);
            current = parent_key;
        }
        path.reverse();
        Some(path)
    }

    /// Depth-first traversal in document order, root excluded
    pub fn document_order(&self) -> Vec<NodeKey> {
        let mut order = Vec::new();
        let mut stack: Vec<NodeKey> = self
            .nodes
            .get(&self.root)
            .map(|r| r.children.iter().rev().cloned().collect())
            .unwrap_or_default();
        while let Some(key) = stack.pop() {
            if let Some(record) = self.nodes.get(&key) {
                order.push(key.clone());
                stack.extend(record.children.iter().rev().cloned());
            }
        }
        order
    }

    /// Reconstruct the document-tree description of a subtree
    pub fn to_doc_tree(&self, key: &str) -> Result<DocNode, EditorError> {
        let record = self
            .node(key)
            .ok_or_else(|| EditorError::NodeNotFound(key.to_string()))?;

        let children = record
            .children
            .iter()
            .map(|child| self.to_doc_tree(child))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match &record.body {
            NodeBody::Element {
                tag,
                attributes,
                unknown_attributes,
            } => DocNode::Element {
                tag: tag.clone(),
                attributes: attributes.clone(),
                children,
                unknown_attributes: unknown_attributes.clone(),
            },
            NodeBody::TextRun {
                marker: Some(marker),
                text,
                unknown_attributes,
                ..
            } => DocNode::Char {
                marker: marker.clone(),
                text: text.clone(),
                unknown_attributes: unknown_attributes.clone(),
            },
            NodeBody::TextRun { text, .. } => DocNode::Text { text: text.clone() },
            NodeBody::Verse { number } => DocNode::Verse {
                number: number.clone(),
            },
            NodeBody::Chapter { number } => DocNode::Chapter {
                number: number.clone(),
            },
            NodeBody::Graft {
                sequence_id,
                subtype,
                attributes,
            } => DocNode::Graft {
                sequence_id: sequence_id.clone(),
                subtype: subtype.clone(),
                attributes: attributes.clone(),
                children,
            },
        })
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut HashMap<NodeKey, NodeRecord> {
        &mut self.nodes
    }

    pub(crate) fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection;
    }
}

/// Arena payload for a document-tree node description (children are
/// interned separately)
pub fn body_of(node: &DocNode) -> NodeBody {
    match node {
        DocNode::Element {
            tag,
            attributes,
            unknown_attributes,
            ..
        } => NodeBody::Element {
            tag: tag.clone(),
            attributes: attributes.clone(),
            unknown_attributes: unknown_attributes.clone(),
        },
        DocNode::Char {
            marker,
            text,
            unknown_attributes,
        } => NodeBody::TextRun {
            marker: Some(marker.clone()),
            text: text.clone(),
            mode: TextMode::Plain,
            unknown_attributes: unknown_attributes.clone(),
        },
        DocNode::Text { text } => NodeBody::TextRun {
            marker: None,
            text: text.clone(),
            mode: TextMode::Plain,
            unknown_attributes: Map::new(),
        },
        DocNode::Verse { number } => NodeBody::Verse {
            number: number.clone(),
        },
        DocNode::Chapter { number } => NodeBody::Chapter {
            number: number.clone(),
        },
        DocNode::Graft {
            sequence_id,
            subtype,
            attributes,
            ..
        } => NodeBody::Graft {
            sequence_id: sequence_id.clone(),
            subtype: subtype.clone(),
            attributes: attributes.clone(),
        },
    }
}

fn intern_node(
    node: &DocNode,
    parent: Option<NodeKey>,
    ids: &mut IdGenerator,
    nodes: &mut HashMap<NodeKey, NodeRecord>,
) -> NodeKey {
    let key: NodeKey = ids.new_id();
    let body = body_of(node);

    nodes.insert(
        key.clone(),
        NodeRecord {
            parent,
            children: Vec::new(),
            body,
        },
    );

    let children: Vec<NodeKey> = node
        .children()
        .iter()
        .map(|child| intern_node(child, Some(key.clone()), ids, nodes))
        .collect();

    if let Some(record) = nodes.get_mut(&key) {
        record.children = children;
    }

    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::state_from_usfm;
    use scriptorium_converter::perf_to_document;
    use scriptorium_parser::markers::MarkerTable;
    use scriptorium_parser::parser::{to_perf, SourceContext};

    #[test]
    fn test_arena_preserves_document_order() {
        let state = state_from_usfm("\\c 1\n\\p\n\\v 1 first\n\\v 2 second");
        let order = state.document_order();

        let kinds: Vec<NodeKind> = order
            .iter()
            .map(|k| state.node(k).unwrap().body.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Chapter,
                NodeKind::Element,
                NodeKind::Verse,
                NodeKind::TextRun,
                NodeKind::Verse,
                NodeKind::TextRun,
            ]
        );
    }

    #[test]
    fn test_path_of_walks_child_indices() {
        let state = state_from_usfm("\\c 1\n\\p\n\\v 1 words");
        let order = state.document_order();
        // Last node is the text run inside the paragraph.
        let text_key = order.last().unwrap();
        assert_eq!(state.path_of(text_key), Some(vec![1, 1]));
    }

    #[test]
    fn test_round_trip_through_arena() {
        let table = MarkerTable::standard().unwrap();
        let context = SourceContext::new("local", "local", "en", "test");
        let doc = to_perf("\\p\n\\v 1 the \\nd Lord\\nd*", &context, &table).unwrap();
        let tree = perf_to_document(&doc, &table).unwrap();

        let mut ids = IdGenerator::new("test");
        let state = EditorState::from_doc_tree(&tree, &mut ids);
        let rebuilt = state.to_doc_tree(state.root()).unwrap();
        assert_eq!(tree, rebuilt);
    }
}
