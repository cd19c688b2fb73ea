//! Verse renumbering.
//!
//! Inserting a verse marker shifts the sequential numbering of every
//! verse after it. Sub-verse segments (`3a`) and ranges (`3-5`,
//! `3a-5b`) keep their shape; both ends of a range shift together. The
//! walk stops at the first verse whose number already exceeds the
//! running number, so an insert into an already-consistent region
//! touches nothing after the gap.

use std::fmt;
use std::str::FromStr;

use scriptorium_converter::DocNode;

use crate::errors::VerseNumberError;
use crate::operations::{OperationType, StructuralChange};
use crate::post_effects::{PostEffect, SecondaryMutation};
use crate::state::{EditorState, NodeBody, NodeKey};

/// One end of a verse reference: number plus optional segment letter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersePart {
    pub number: u32,
    pub segment: Option<char>,
}

impl VersePart {
    fn shifted(self, delta: u32) -> Self {
        Self {
            number: self.number + delta,
            segment: self.segment,
        }
    }
}

impl FromStr for VersePart {
    type Err = VerseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(VerseNumberError(s.to_string()));
        }
        let number: u32 = digits.parse().map_err(|_| VerseNumberError(s.to_string()))?;

        let rest = &s[digits.len()..];
        let segment = match rest.len() {
            0 => None,
            1 => {
                let ch = rest.chars().next().filter(|c| c.is_ascii_lowercase());
                Some(ch.ok_or_else(|| VerseNumberError(s.to_string()))?)
            }
            _ => return Err(VerseNumberError(s.to_string())),
        };

        Ok(Self { number, segment })
    }
}

impl fmt::Display for VersePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number)?;
        if let Some(segment) = self.segment {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// A verse number: single (`3`, `3a`) or range (`3-5`, `3a-5b`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerseNumber {
    pub start: VersePart,
    pub end: Option<VersePart>,
}

impl VerseNumber {
    /// Highest integer this number covers
    pub fn max_number(&self) -> u32 {
        self.end.map(|end| end.number).unwrap_or(self.start.number)
    }

    /// Shift so the start lands on `new_start`; a range keeps its span
    /// and each end keeps its own segment letter.
    pub fn shifted_to(&self, new_start: u32) -> VerseNumber {
        let delta = new_start.saturating_sub(self.start.number);
        VerseNumber {
            start: self.start.shifted(delta),
            end: self.end.map(|end| end.shifted(delta)),
        }
    }
}

impl FromStr for VerseNumber {
    type Err = VerseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((start, end)) => Ok(Self {
                start: start.parse()?,
                end: Some(end.parse()?),
            }),
            None => Ok(Self {
                start: s.parse()?,
                end: None,
            }),
        }
    }
}

impl fmt::Display for VerseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)?;
        if let Some(end) = &self.end {
            write!(f, "-{end}")?;
        }
        Ok(())
    }
}

/// Post-effect: renumber the verses following a newly inserted verse
/// marker
#[derive(Debug)]
pub struct RenumberVerses;

impl PostEffect for RenumberVerses {
    fn analyze(&self, change: &StructuralChange, state: &EditorState) -> Vec<SecondaryMutation> {
        if change.op != OperationType::Add {
            return Vec::new();
        }
        let inserted_number = match &change.node {
            DocNode::Verse { number } => number,
            _ => return Vec::new(),
        };
        let inserted: VerseNumber = match inserted_number.parse() {
            Ok(number) => number,
            Err(err) => {
                tracing::error!(%err, "inserted verse has unparseable number");
                return Vec::new();
            }
        };

        // All verse nodes in document order, then everything strictly
        // after the inserted one.
        let verses: Vec<(NodeKey, String)> = state
            .document_order()
            .into_iter()
            .filter_map(|key| match state.node(&key).map(|r| &r.body) {
                Some(NodeBody::Verse { number }) => Some((key, number.clone())),
                _ => None,
            })
            .collect();
        let position = match verses.iter().position(|(key, _)| *key == change.key) {
            Some(position) => position,
            None => return Vec::new(),
        };

        let mut running = inserted.max_number();
        let mut mutations = Vec::new();

        for (key, number) in &verses[position + 1..] {
            let current: VerseNumber = match number.parse() {
                Ok(number) => number,
                Err(err) => {
                    tracing::error!(%err, key = %key, "verse with unparseable number; renumbering stops");
                    break;
                }
            };
            if current.start.number > running {
                break;
            }
            let renumbered = current.shifted_to(running + 1);
            running = renumbered.max_number();
            mutations.push(SecondaryMutation::SetVerseNumber {
                key: key.clone(),
                number: renumbered.to_string(),
            });
        }

        mutations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{state_from_usfm, verse_keys};

    fn insert_change(state: &EditorState, key: &NodeKey, number: &str) -> StructuralChange {
        StructuralChange {
            key: key.clone(),
            op: OperationType::Add,
            path: state.path_of(key).unwrap(),
            node: DocNode::Verse {
                number: number.to_string(),
            },
        }
    }

    fn numbers(mutations: &[SecondaryMutation]) -> Vec<String> {
        mutations
            .iter()
            .map(|m| match m {
                SecondaryMutation::SetVerseNumber { number, .. } => number.clone(),
            })
            .collect()
    }

    #[test]
    fn test_verse_number_parsing() {
        let simple: VerseNumber = "3".parse().unwrap();
        assert_eq!(simple.start.number, 3);
        assert_eq!(simple.end, None);

        let segment: VerseNumber = "3a".parse().unwrap();
        assert_eq!(segment.start.segment, Some('a'));

        let range: VerseNumber = "3a-5b".parse().unwrap();
        assert_eq!(range.start.number, 3);
        assert_eq!(range.end.unwrap().number, 5);
        assert_eq!(range.end.unwrap().segment, Some('b'));

        assert!("".parse::<VerseNumber>().is_err());
        assert!("a3".parse::<VerseNumber>().is_err());
        assert!("3ab".parse::<VerseNumber>().is_err());
    }

    #[test]
    fn test_verse_number_display_round_trips() {
        for s in ["3", "3a", "3-5", "3a-5b"] {
            let parsed: VerseNumber = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn test_insert_before_sequential_run_shifts_all() {
        // The duplicate 5 plays the inserted node.
        let state = state_from_usfm("\\p\n\\v 5 new\n\\v 5 a\n\\v 6 b\n\\v 7 c");
        let verses = verse_keys(&state);

        let mutations = RenumberVerses.analyze(&insert_change(&state, &verses[0], "5"), &state);
        assert_eq!(numbers(&mutations), vec!["6", "7", "8"]);
    }

    #[test]
    fn test_insert_before_range_shifts_both_ends() {
        let state = state_from_usfm("\\p\n\\v 5 new\n\\v 5a-6b joined");
        let verses = verse_keys(&state);

        let mutations = RenumberVerses.analyze(&insert_change(&state, &verses[0], "5"), &state);
        assert_eq!(numbers(&mutations), vec!["6a-7b"]);
    }

    #[test]
    fn test_early_exit_on_gap() {
        let state = state_from_usfm("\\p\n\\v 10 new\n\\v 20 far away");
        let verses = verse_keys(&state);

        let mutations = RenumberVerses.analyze(&insert_change(&state, &verses[0], "10"), &state);
        assert!(mutations.is_empty());
    }

    #[test]
    fn test_renumbering_stops_after_consistent_tail() {
        let state = state_from_usfm("\\p\n\\v 5 new\n\\v 5 a\n\\v 9 gap\n\\v 10 tail");
        let verses = verse_keys(&state);

        let mutations = RenumberVerses.analyze(&insert_change(&state, &verses[0], "5"), &state);
        // 5 -> 6, then 9 already exceeds 6: stop.
        assert_eq!(numbers(&mutations), vec!["6"]);
    }

    #[test]
    fn test_non_verse_insert_is_ignored() {
        let state = state_from_usfm("\\p\n\\v 5 a");
        let verses = verse_keys(&state);

        let change = StructuralChange {
            key: verses[0].clone(),
            op: OperationType::Add,
            path: vec![0, 0],
            node: DocNode::text("plain"),
        };
        assert!(RenumberVerses.analyze(&change, &state).is_empty());
    }
}
