pub mod tokenizer;
pub mod parser;
pub mod perf;
pub mod markers;
pub mod error;
pub mod serializer;
pub mod id_generator;

pub use tokenizer::{Token, tokenize};
pub use parser::{Parser, SourceContext, to_perf};
pub use serializer::{Serializer, to_marker_text};
pub use perf::{Block, ContentElement, ContentNode, PerfDocument, Schema, Sequence};
pub use markers::{MarkerInfo, MarkerKind, MarkerTable};
pub use error::{MarkerTableError, ParseError, ParseResult, PerfError, SerializeError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizer_basic() {
        let tokens = tokenize("\\p\n\\v 1 text").unwrap();
        assert_eq!(tokens.len(), 4);
    }
}
