//! Error types for the editor

use thiserror::Error;

use crate::state::NodeKey;
use crate::validator::ValidationError;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Parse error: {0}")]
    Parse(#[from] scriptorium_parser::ParseError),

    #[error("Serialize error: {0}")]
    Serialize(#[from] scriptorium_parser::SerializeError),

    #[error("Conversion error: {0}")]
    Convert(#[from] scriptorium_converter::ConvertError),

    #[error("Marker table error: {0}")]
    MarkerTable(#[from] scriptorium_parser::MarkerTableError),

    #[error("PERF invariant violated: {0}")]
    Perf(#[from] scriptorium_parser::PerfError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("Invalid verse number: {0}")]
    VerseNumber(#[from] VerseNumberError),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeKey),

    #[error("Node {0} is not a text node")]
    NotText(NodeKey),

    #[error("Node {0} cannot have children")]
    NotAnElement(NodeKey),

    #[error("Node kind {0} is not registered with this editor")]
    NodeKindNotRegistered(&'static str),

    #[error("The root node cannot be removed or moved")]
    RootIsImmovable,

    #[error("Moving {0} under {1} would create a cycle")]
    CycleDetected(NodeKey, NodeKey),
}

/// Failure while deriving a patch operation from a structural mutation
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Schema validation failed with {} error(s)", errors.len())]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Subtree produced an unexpected PERF shape")]
    UnexpectedShape,

    #[error(transparent)]
    Convert(#[from] scriptorium_converter::ConvertError),

    #[error("Could not encode fragment for validation: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Malformed verse number (`"3"`, `"3a"`, `"3-5"` and `"3a-5b"` are the
/// accepted shapes)
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot parse verse number {0:?}")]
pub struct VerseNumberError(pub String);

/// External document store failure
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Book not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}
