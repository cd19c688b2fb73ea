use thiserror::Error;

pub type ConvertResult<T> = Result<T, ConvertError>;

/// A subtree or PERF node with no known mapping. Carries enough
/// structural context to diagnose; the triggering conversion never
/// silently drops content.
#[derive(Error, Debug, Clone)]
pub enum ConvertError {
    #[error("Marker {marker:?} is not in the classification table")]
    UnknownMarker { marker: String },

    #[error("Block of type {block_type:?} has no document-tree mapping")]
    UnmappableBlock { block_type: String },

    #[error("Content node {kind:?}/{subtype:?} has no document-tree mapping")]
    UnmappableContent { kind: String, subtype: String },

    #[error("Document node {node_type:?} cannot reconstruct a PERF {expected:?}")]
    KindMismatch {
        node_type: &'static str,
        expected: &'static str,
    },

    #[error("Element is missing required attribute {attribute:?}")]
    MissingAttribute { attribute: &'static str },

    #[error("Graft references missing sequence {target:?}")]
    DanglingGraft { target: String },

    #[error("Marker fragment did not produce a {wanted} node")]
    FragmentShape { wanted: &'static str },

    #[error(transparent)]
    Parse(#[from] scriptorium_parser::ParseError),
}
