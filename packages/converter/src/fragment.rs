//! Build a document node description from a bare marker snippet.
//!
//! Marker-insertion menus hand us a fragment such as `\add \add*` or
//! `\v 1 `. The fragment is parsed inside a scaffold document and the
//! wanted child extracted.

use scriptorium_parser::markers::MarkerTable;
use scriptorium_parser::parser::{to_perf, SourceContext};

use crate::error::{ConvertError, ConvertResult};
use crate::forward::perf_to_document;
use crate::nodes::DocNode;

/// Whether the fragment stands on its own block or lives inside one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Inline,
    Block,
}

/// Parse a marker fragment into a document node description
pub fn node_from_marker_text(
    fragment: &str,
    kind: FragmentKind,
    table: &MarkerTable,
) -> ConvertResult<DocNode> {
    let scaffold = format!("\\mt title\n\\p\n{fragment}\n");
    let context = SourceContext::new("local", "local", "any", "any");
    let doc = to_perf(&scaffold, &context, table)?;
    let root = perf_to_document(&doc, table)?;

    // children[0] is the scaffold title, children[1] the paragraph the
    // fragment landed in.
    let paragraph = root
        .children()
        .get(1)
        .ok_or(ConvertError::FragmentShape { wanted: "block" })?;

    match kind {
        FragmentKind::Block => Ok(paragraph.clone()),
        FragmentKind::Inline => paragraph
            .children()
            .first()
            .cloned()
            .ok_or(ConvertError::FragmentShape { wanted: "inline" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MarkerTable {
        MarkerTable::standard().unwrap()
    }

    #[test]
    fn test_inline_fragment_extracts_char_run() {
        let node = node_from_marker_text("\\add words\\add*", FragmentKind::Inline, &table()).unwrap();
        match node {
            DocNode::Char { marker, text, .. } => {
                assert_eq!(marker, "add");
                assert_eq!(text, "words");
            }
            other => panic!("expected char run, got {other:?}"),
        }
    }

    #[test]
    fn test_inline_verse_fragment() {
        let node = node_from_marker_text("\\v 7 ", FragmentKind::Inline, &table()).unwrap();
        assert_eq!(
            node,
            DocNode::Verse {
                number: "7".to_string()
            }
        );
    }

    #[test]
    fn test_block_fragment_returns_wrapping_paragraph() {
        let node =
            node_from_marker_text("\\v 1 first words", FragmentKind::Block, &table()).unwrap();
        assert_eq!(node.attribute("perf-subtype"), Some("usfm:p"));
        assert_eq!(node.children().len(), 2);
    }

    #[test]
    fn test_empty_inline_fragment_is_reported() {
        let err = node_from_marker_text("", FragmentKind::Inline, &table()).unwrap_err();
        assert!(matches!(err, ConvertError::FragmentShape { .. }));
    }
}
