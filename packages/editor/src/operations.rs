//! Operation builder.
//!
//! Watches structural tree mutations and re-derives normalized PERF
//! patch operations for persistence. Only document-level structural
//! units (grafts and block-level marker elements) produce patches; a
//! freshly converted fragment must pass schema validation before its
//! operation is emitted.

use serde::Serialize;

use scriptorium_converter::{document_to_perf, perf_kind_of, DocNode, PerfKind, PerfNode};
use scriptorium_parser::markers::MarkerTable;
use scriptorium_parser::perf::{Block, PerfDocument};

use crate::errors::OperationError;
use crate::state::NodeKey;
use crate::validator::SchemaValidator;

/// Schema version the external validator checks fragments against.
const VALIDATOR_SCHEMA_VERSION: &str = "0.4.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationType {
    Add,
    Remove,
    Replace,
    Move,
}

/// One step of a patch path
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

/// Normalized patch operation against the PERF document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub op: OperationType,
    pub path: Vec<PathStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<PerfNode>,
}

/// A structural mutation observed on the document tree during a
/// transaction. `node` is the subtree as it stood when the mutation was
/// captured (for removes, just before).
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralChange {
    pub key: NodeKey,
    pub op: OperationType,
    pub path: Vec<usize>,
    pub node: DocNode,
}

/// What the builder decided for one structural change
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Operation(Operation),
    /// Move is not supported; signaled, never structurally applied
    SkippedMove,
    /// The mutated node is not an operation-builder concern
    NotApplicable,
}

pub struct OperationBuilder<'a> {
    table: &'a MarkerTable,
    validator: &'a dyn SchemaValidator,
    main_sequence_id: String,
}

impl<'a> OperationBuilder<'a> {
    pub fn new(
        table: &'a MarkerTable,
        validator: &'a dyn SchemaValidator,
        main_sequence_id: impl Into<String>,
    ) -> Self {
        Self {
            table,
            validator,
            main_sequence_id: main_sequence_id.into(),
        }
    }

    pub fn build(&self, change: &StructuralChange) -> Result<BuildOutcome, OperationError> {
        if change.op == OperationType::Move {
            tracing::warn!(key = %change.key, "skipped move operation");
            return Ok(BuildOutcome::SkippedMove);
        }

        let kind = match &change.node {
            DocNode::Graft { .. } => PerfKind::ContentElement,
            DocNode::Element { tag, .. } => {
                let marker = change.node.attribute("class").unwrap_or(tag.as_str());
                match perf_kind_of(&change.node) {
                    Some(PerfKind::Block) if self.table.is_block(marker) => PerfKind::Block,
                    _ => return Ok(BuildOutcome::NotApplicable),
                }
            }
            _ => return Ok(BuildOutcome::NotApplicable),
        };

        let path = self.perf_path(&change.path);

        if change.op == OperationType::Remove {
            return Ok(BuildOutcome::Operation(Operation {
                op: OperationType::Remove,
                path,
                value: None,
            }));
        }

        let conversion = document_to_perf(&change.node, kind, self.table)?;

        let wrapped = match &conversion.node {
            PerfNode::Block(block) => block.clone(),
            PerfNode::Content(element) => {
                let mut block = Block::paragraph("p");
                block.content.push(element.clone());
                block
            }
            PerfNode::Sequence(_) => return Err(OperationError::UnexpectedShape),
        };

        // Wrap the fragment in a minimal single-block document so the
        // external validator can check it as a whole.
        let mut fragment = PerfDocument::new("main");
        if let Some(main) = fragment.sequences.get_mut("main") {
            main.blocks.push(wrapped);
        }
        for (id, sequence) in &conversion.side_sequences {
            fragment.sequences.insert(id.clone(), sequence.clone());
        }

        let document = serde_json::to_value(&fragment)?;
        let report =
            self.validator
                .validate("constraint", "perfDocument", VALIDATOR_SCHEMA_VERSION, &document);
        if !report.is_valid() {
            tracing::error!(errors = ?report.errors, "perf fragment failed validation");
            return Err(OperationError::ValidationFailed {
                errors: report.errors,
            });
        }

        Ok(BuildOutcome::Operation(Operation {
            op: change.op,
            path,
            value: Some(conversion.node),
        }))
    }

    /// Map a child-index path from the document tree onto the PERF
    /// document: the first index addresses a block of the main sequence,
    /// deeper indices address content.
    fn perf_path(&self, tree_path: &[usize]) -> Vec<PathStep> {
        let mut path = vec![
            PathStep::Key("sequences".to_string()),
            PathStep::Key(self.main_sequence_id.clone()),
            PathStep::Key("blocks".to_string()),
        ];
        for (depth, index) in tree_path.iter().enumerate() {
            if depth > 0 {
                path.push(PathStep::Key("content".to_string()));
            }
            path.push(PathStep::Index(*index));
        }
        path
    }
}
