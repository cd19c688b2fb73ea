//! Fixed USFM marker classification table.
//!
//! The converter and the operation builder both key their behavior off
//! this table, so it is validated once at load time: every sub-marker
//! reference must itself be a known marker. An unknown marker at load is
//! a configuration error, never a silent fallthrough.

use std::collections::HashMap;

use crate::error::MarkerTableError;

/// Structural category of a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// Character-level styling, rendered as a text run
    Inline,
    /// Paragraph-level unit, rendered as an element
    Block,
    /// Document structure (chapters, verses, book id)
    Structural,
}

/// Classification record for one marker
#[derive(Debug, Clone)]
pub struct MarkerInfo {
    pub kind: MarkerKind,
    /// Markers allowed directly inside this one
    pub valid_sub_markers: &'static [&'static str],
    /// Whether the marker takes a numeric suffix (`q1`, `pi2`, ...)
    pub numbered: bool,
}

const FOOTNOTE_CONTENT: &[&str] = &["fr", "ft", "fk", "fq", "fqa", "fl", "fw", "fp", "fv"];
const XREF_CONTENT: &[&str] = &["xo", "xt", "xta", "xk", "xq", "xot", "xnt"];

/// Table rows: (marker, kind, numbered, valid sub-markers)
const TABLE: &[(&str, MarkerKind, bool, &[&str])] = &[
    // Identification and structure
    ("id", MarkerKind::Structural, false, &[]),
    ("c", MarkerKind::Structural, false, &[]),
    ("v", MarkerKind::Structural, false, &[]),
    // Titles and headings
    ("mt", MarkerKind::Block, true, &[]),
    ("ms", MarkerKind::Block, true, &[]),
    ("s", MarkerKind::Block, true, &[]),
    ("r", MarkerKind::Block, false, &[]),
    ("d", MarkerKind::Block, false, &[]),
    // Paragraphs
    ("p", MarkerKind::Block, false, &["v", "f", "x"]),
    ("m", MarkerKind::Block, false, &["v", "f", "x"]),
    ("pi", MarkerKind::Block, true, &["v", "f", "x"]),
    ("mi", MarkerKind::Block, false, &["v", "f", "x"]),
    ("nb", MarkerKind::Block, false, &["v", "f", "x"]),
    ("b", MarkerKind::Block, false, &[]),
    // Poetry
    ("q", MarkerKind::Block, true, &["v", "f", "x"]),
    ("qr", MarkerKind::Block, false, &[]),
    ("qc", MarkerKind::Block, false, &[]),
    // Lists
    ("li", MarkerKind::Block, true, &["v", "lik", "liv"]),
    ("lik", MarkerKind::Inline, false, &[]),
    ("liv", MarkerKind::Inline, true, &[]),
    // Notes
    ("f", MarkerKind::Inline, false, FOOTNOTE_CONTENT),
    ("x", MarkerKind::Inline, false, XREF_CONTENT),
    ("fr", MarkerKind::Inline, false, &[]),
    ("ft", MarkerKind::Inline, false, &[]),
    ("fk", MarkerKind::Inline, false, &[]),
    ("fq", MarkerKind::Inline, false, &[]),
    ("fqa", MarkerKind::Inline, false, &[]),
    ("fl", MarkerKind::Inline, false, &[]),
    ("fw", MarkerKind::Inline, false, &[]),
    ("fp", MarkerKind::Inline, false, &[]),
    ("fv", MarkerKind::Inline, false, &[]),
    ("xo", MarkerKind::Inline, false, &[]),
    ("xt", MarkerKind::Inline, false, &[]),
    ("xta", MarkerKind::Inline, false, &[]),
    ("xk", MarkerKind::Inline, false, &[]),
    ("xq", MarkerKind::Inline, false, &[]),
    ("xot", MarkerKind::Inline, false, &[]),
    ("xnt", MarkerKind::Inline, false, &[]),
    // Special text
    ("add", MarkerKind::Inline, false, &[]),
    ("bk", MarkerKind::Inline, false, &[]),
    ("k", MarkerKind::Inline, false, &[]),
    ("nd", MarkerKind::Inline, false, &[]),
    ("ord", MarkerKind::Inline, false, &[]),
    ("pn", MarkerKind::Inline, false, &[]),
    ("qs", MarkerKind::Inline, false, &[]),
    ("qt", MarkerKind::Inline, false, &[]),
    ("sig", MarkerKind::Inline, false, &[]),
    ("sls", MarkerKind::Inline, false, &[]),
    ("tl", MarkerKind::Inline, false, &[]),
    ("wj", MarkerKind::Inline, false, &[]),
    // Character styling
    ("em", MarkerKind::Inline, false, &[]),
    ("bd", MarkerKind::Inline, false, &[]),
    ("bdit", MarkerKind::Inline, false, &[]),
    ("it", MarkerKind::Inline, false, &[]),
    ("no", MarkerKind::Inline, false, &[]),
    ("sc", MarkerKind::Inline, false, &[]),
    ("sup", MarkerKind::Inline, false, &[]),
    // Special features
    ("w", MarkerKind::Inline, false, &[]),
    ("rb", MarkerKind::Inline, false, &[]),
    ("pro", MarkerKind::Inline, false, &[]),
    ("jmp", MarkerKind::Inline, false, &[]),
];

/// Load-validated marker classification table
#[derive(Debug, Clone)]
pub struct MarkerTable {
    entries: HashMap<&'static str, MarkerInfo>,
}

impl MarkerTable {
    /// Build the fixed USFM table, checking internal consistency
    pub fn standard() -> Result<Self, MarkerTableError> {
        let mut entries = HashMap::with_capacity(TABLE.len());
        for (marker, kind, numbered, subs) in TABLE {
            if entries
                .insert(
                    *marker,
                    MarkerInfo {
                        kind: *kind,
                        valid_sub_markers: subs,
                        numbered: *numbered,
                    },
                )
                .is_some()
            {
                return Err(MarkerTableError::DuplicateMarker(marker.to_string()));
            }
        }

        let table = Self { entries };
        for (marker, kind, _, subs) in TABLE {
            if *kind == MarkerKind::Inline && (*marker == "id" || *marker == "c") {
                return Err(MarkerTableError::InvalidEntry(marker.to_string()));
            }
            for sub in *subs {
                if table.get(sub).is_none() {
                    return Err(MarkerTableError::UnknownSubMarker {
                        marker: marker.to_string(),
                        sub_marker: sub.to_string(),
                    });
                }
            }
        }
        Ok(table)
    }

    /// Classification for a marker; numbered forms (`q2`) resolve
    /// through their base marker (`q`).
    pub fn get(&self, marker: &str) -> Option<&MarkerInfo> {
        if let Some(info) = self.entries.get(marker) {
            return Some(info);
        }
        let base = marker.trim_end_matches(|c: char| c.is_ascii_digit());
        if base.len() < marker.len() {
            let info = self.entries.get(base)?;
            if info.numbered {
                return Some(info);
            }
        }
        None
    }

    pub fn kind(&self, marker: &str) -> Option<MarkerKind> {
        self.get(marker).map(|info| info.kind)
    }

    pub fn is_inline(&self, marker: &str) -> bool {
        self.kind(marker) == Some(MarkerKind::Inline)
    }

    pub fn is_block(&self, marker: &str) -> bool {
        self.kind(marker) == Some(MarkerKind::Block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_is_consistent() {
        let table = MarkerTable::standard().unwrap();
        assert!(table.is_block("p"));
        assert!(table.is_inline("add"));
        assert_eq!(table.kind("v"), Some(MarkerKind::Structural));
    }

    #[test]
    fn test_numbered_markers_resolve_through_base() {
        let table = MarkerTable::standard().unwrap();
        assert!(table.is_block("q1"));
        assert!(table.is_block("q2"));
        assert!(table.is_block("pi3"));
        // "add" is not numbered, so "add2" must not classify
        assert!(table.get("add2").is_none());
    }

    #[test]
    fn test_unknown_marker_is_none() {
        let table = MarkerTable::standard().unwrap();
        assert!(table.get("zz").is_none());
    }
}
