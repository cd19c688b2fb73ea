use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;
pub type PerfResult<T> = Result<T, PerfError>;

/// Failure while reading a marker stream. Carries the byte offset of the
/// offending input; the caller decides fallback behavior.
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("Unexpected marker at {pos}: \\{marker}")]
    UnexpectedMarker { pos: usize, marker: String },

    #[error("Unmatched closing marker at {pos}: \\{marker}*")]
    UnmatchedClosingMarker { pos: usize, marker: String },

    #[error("Unknown marker at {pos}: \\{marker}")]
    UnknownMarker { pos: usize, marker: String },

    #[error("Missing {what} after \\{marker} at {pos}")]
    MissingArgument {
        pos: usize,
        marker: String,
        what: &'static str,
    },

    #[error("Malformed attribute at {pos}: {text}")]
    MalformedAttribute { pos: usize, text: String },

    #[error("Text at {pos} is not inside any paragraph block")]
    UnexpectedText { pos: usize },

    #[error("Unexpected end of input at {pos}")]
    UnexpectedEof { pos: usize },

    #[error("Unrecognized input at {pos}")]
    LexerError { pos: usize },
}

impl ParseError {
    pub fn unknown_marker(pos: usize, marker: impl Into<String>) -> Self {
        Self::UnknownMarker {
            pos,
            marker: marker.into(),
        }
    }

    pub fn missing_argument(pos: usize, marker: impl Into<String>, what: &'static str) -> Self {
        Self::MissingArgument {
            pos,
            marker: marker.into(),
            what,
        }
    }

    /// Byte offset the error points at
    pub fn position(&self) -> usize {
        match self {
            Self::UnexpectedMarker { pos, .. }
            | Self::UnmatchedClosingMarker { pos, .. }
            | Self::UnknownMarker { pos, .. }
            | Self::MissingArgument { pos, .. }
            | Self::MalformedAttribute { pos, .. }
            | Self::UnexpectedText { pos }
            | Self::UnexpectedEof { pos }
            | Self::LexerError { pos } => *pos,
        }
    }
}

/// Failure while writing a PERF tree back to a marker stream
#[derive(Error, Debug, Clone)]
pub enum SerializeError {
    #[error("main_sequence_id {0:?} does not key an existing sequence")]
    MissingMainSequence(String),

    #[error("Graft references unknown sequence: {target}")]
    UnknownGraftTarget { target: String },

    #[error("Content node of kind {kind:?} has no marker-stream form")]
    UnserializableNode { kind: String },
}

/// Structural invariant violation in a PERF document
#[derive(Error, Debug, Clone)]
pub enum PerfError {
    #[error("main_sequence_id {0:?} does not key an existing sequence")]
    MissingMainSequence(String),

    #[error("Graft references missing sequence {target:?}")]
    DanglingGraft { target: String },
}

/// The fixed marker table failed its load-time consistency check
#[derive(Error, Debug, Clone)]
pub enum MarkerTableError {
    #[error("Marker {0:?} appears twice in the table")]
    DuplicateMarker(String),

    #[error("Marker {marker:?} allows unknown sub-marker {sub_marker:?}")]
    UnknownSubMarker { marker: String, sub_marker: String },

    #[error("Marker {0:?} has an invalid classification")]
    InvalidEntry(String),
}
