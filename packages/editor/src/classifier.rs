//! Mutation classifier.
//!
//! Classifies the delta between two consecutive snapshots so the history
//! engine can decide merge-worthiness. Rapid single-character edits
//! coalesce into one undo step; everything else starts a new one. The
//! classification never affects document content.

use std::collections::{HashMap, HashSet};

use crate::dirty::IntentionallyDirty;
use crate::state::{EditorState, NodeBody, NodeKey, PointKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Other,
    Composing,
    InsertCharAfterSelection,
    DeleteCharBeforeSelection,
    DeleteCharAfterSelection,
}

/// Dirty nodes present in `state`: all dirty leaves plus intentionally
/// dirty elements, the root excluded.
fn dirty_nodes(
    state: &EditorState,
    dirty_leaves: &HashSet<NodeKey>,
    dirty_elements: &HashMap<NodeKey, IntentionallyDirty>,
) -> Vec<NodeKey> {
    let mut nodes = Vec::new();

    for key in dirty_leaves {
        if state.contains(key) {
            nodes.push(key.clone());
        }
    }

    for (key, intentional) in dirty_elements {
        if !*intentional || key == state.root() {
            continue;
        }
        if state.contains(key) {
            nodes.push(key.clone());
        }
    }

    nodes
}

fn text_len(body: &NodeBody) -> Option<usize> {
    match body {
        NodeBody::TextRun { text, .. } => Some(text.chars().count()),
        _ => None,
    }
}

/// Classify the change between two snapshots.
///
/// Pure function of the snapshots, the dirty sets and the composition
/// flag; offsets are counted in characters.
pub fn classify_change(
    prev_state: Option<&EditorState>,
    next_state: &EditorState,
    dirty_leaves: &HashSet<NodeKey>,
    dirty_elements: &HashMap<NodeKey, IntentionallyDirty>,
    is_composing: bool,
) -> ChangeKind {
    let prev_state = match prev_state {
        Some(prev) => prev,
        None => return ChangeKind::Other,
    };
    if dirty_leaves.is_empty() && dirty_elements.is_empty() && !is_composing {
        return ChangeKind::Other;
    }

    if is_composing {
        return ChangeKind::Composing;
    }

    let (prev_selection, next_selection) = match (prev_state.selection(), next_state.selection()) {
        (Some(prev), Some(next)) => (prev, next),
        _ => return ChangeKind::Other,
    };
    if !prev_selection.is_collapsed() || !next_selection.is_collapsed() {
        return ChangeKind::Other;
    }

    let dirty = dirty_nodes(next_state, dirty_leaves, dirty_elements);
    if dirty.is_empty() {
        return ChangeKind::Other;
    }

    // Inserting a new text node into an element (first char in a
    // paragraph, or after an existing node) dirties more than one node.
    if dirty.len() > 1 {
        let next_anchor = &next_selection.anchor;
        let anchor_record = match next_state.node(&next_anchor.key) {
            Some(record) => record,
            None => return ChangeKind::Other,
        };
        if next_state.node(&prev_selection.anchor.key).is_none() {
            return ChangeKind::Other;
        }

        if !prev_state.contains(&next_anchor.key)
            && text_len(&anchor_record.body) == Some(1)
            && next_anchor.offset == 1
        {
            return ChangeKind::InsertCharAfterSelection;
        }

        return ChangeKind::Other;
    }

    let dirty_key = &dirty[0];
    let next_record = match next_state.node(dirty_key) {
        Some(record) => record,
        None => return ChangeKind::Other,
    };
    let prev_record = match prev_state.node(dirty_key) {
        Some(record) => record,
        None => return ChangeKind::Other,
    };

    let (prev_text, prev_mode) = match &prev_record.body {
        NodeBody::TextRun { text, mode, .. } => (text, mode),
        _ => return ChangeKind::Other,
    };
    let (next_text, next_mode) = match &next_record.body {
        NodeBody::TextRun { text, mode, .. } => (text, mode),
        _ => return ChangeKind::Other,
    };
    if prev_mode != next_mode {
        return ChangeKind::Other;
    }
    if prev_text == next_text {
        return ChangeKind::Other;
    }

    let next_anchor = &next_selection.anchor;
    let prev_anchor = &prev_selection.anchor;
    if next_anchor.key != prev_anchor.key || next_anchor.kind != PointKind::Text {
        return ChangeKind::Other;
    }

    let prev_len = prev_text.chars().count() as isize;
    let next_len = next_text.chars().count() as isize;
    let text_diff = next_len - prev_len;
    let prev_offset = prev_anchor.offset;
    let next_offset = next_anchor.offset;

    if text_diff == 1 && prev_offset + 1 == next_offset {
        return ChangeKind::InsertCharAfterSelection;
    }
    if text_diff == -1 && prev_offset == next_offset + 1 {
        return ChangeKind::DeleteCharBeforeSelection;
    }
    if text_diff == -1 && prev_offset == next_offset {
        return ChangeKind::DeleteCharAfterSelection;
    }

    ChangeKind::Other
}

/// A node marked dirty whose record is unchanged between snapshots
/// (a transform reverted the edit). Deleting a whole line moves the
/// selection from element points to text points; that case never counts
/// as unchanged.
pub fn is_text_node_unchanged(
    key: &NodeKey,
    prev_state: &EditorState,
    next_state: &EditorState,
) -> bool {
    if let (Some(prev_selection), Some(next_selection)) =
        (prev_state.selection(), next_state.selection())
    {
        let is_deleting_line = prev_selection.anchor.kind == PointKind::Element
            && prev_selection.focus.kind == PointKind::Element
            && next_selection.anchor.kind == PointKind::Text
            && next_selection.focus.kind == PointKind::Text;
        if is_deleting_line {
            return false;
        }
    }

    match (prev_state.node(key), next_state.node(key)) {
        (Some(prev), Some(next)) => {
            prev.body.is_text() && next.body.is_text() && prev.body == next.body
                && prev.parent == next.parent
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Point, Selection};
    use crate::test_util::{state_from_usfm, text_key_of};

    fn with_cursor(state: &EditorState, key: &NodeKey, offset: usize) -> EditorState {
        let mut state = state.clone();
        state.set_selection(Some(Selection::collapsed(Point::text(key.clone(), offset))));
        state
    }

    fn set_text(state: &EditorState, key: &NodeKey, new_text: &str) -> EditorState {
        let mut next = state.clone();
        if let Some(record) = next.nodes_mut().get_mut(key) {
            if let NodeBody::TextRun { text, .. } = &mut record.body {
                *text = new_text.to_string();
            }
        }
        next
    }

    fn one_leaf(key: &NodeKey) -> HashSet<NodeKey> {
        let mut set = HashSet::new();
        set.insert(key.clone());
        set
    }

    #[test]
    fn test_no_previous_state_is_other() {
        let state = state_from_usfm("\\p\n\\v 1 word");
        let kind = classify_change(None, &state, &HashSet::new(), &HashMap::new(), false);
        assert_eq!(kind, ChangeKind::Other);
    }

    #[test]
    fn test_composing_wins_over_everything() {
        let state = state_from_usfm("\\p\n\\v 1 word");
        let key = text_key_of(&state, "word");
        let kind = classify_change(
            Some(&state),
            &state,
            &one_leaf(&key),
            &HashMap::new(),
            true,
        );
        assert_eq!(kind, ChangeKind::Composing);
    }

    #[test]
    fn test_single_char_insert() {
        let base = state_from_usfm("\\p\n\\v 1 word");
        let key = text_key_of(&base, "word");
        let prev = with_cursor(&base, &key, 4);
        let next = with_cursor(&set_text(&base, &key, "words"), &key, 5);

        let kind = classify_change(
            Some(&prev),
            &next,
            &one_leaf(&key),
            &HashMap::new(),
            false,
        );
        assert_eq!(kind, ChangeKind::InsertCharAfterSelection);
    }

    #[test]
    fn test_backspace_is_delete_before() {
        let base = state_from_usfm("\\p\n\\v 1 word");
        let key = text_key_of(&base, "word");
        let prev = with_cursor(&base, &key, 4);
        let next = with_cursor(&set_text(&base, &key, "wor"), &key, 3);

        let kind = classify_change(
            Some(&prev),
            &next,
            &one_leaf(&key),
            &HashMap::new(),
            false,
        );
        assert_eq!(kind, ChangeKind::DeleteCharBeforeSelection);
    }

    #[test]
    fn test_forward_delete_keeps_cursor() {
        let base = state_from_usfm("\\p\n\\v 1 word");
        let key = text_key_of(&base, "word");
        let prev = with_cursor(&base, &key, 3);
        let next = with_cursor(&set_text(&base, &key, "wor"), &key, 3);

        let kind = classify_change(
            Some(&prev),
            &next,
            &one_leaf(&key),
            &HashMap::new(),
            false,
        );
        assert_eq!(kind, ChangeKind::DeleteCharAfterSelection);
    }

    #[test]
    fn test_multi_char_edit_is_other() {
        let base = state_from_usfm("\\p\n\\v 1 word");
        let key = text_key_of(&base, "word");
        let prev = with_cursor(&base, &key, 4);
        let next = with_cursor(&set_text(&base, &key, "wordiness"), &key, 9);

        let kind = classify_change(
            Some(&prev),
            &next,
            &one_leaf(&key),
            &HashMap::new(),
            false,
        );
        assert_eq!(kind, ChangeKind::Other);
    }

    #[test]
    fn test_non_collapsed_selection_is_other() {
        let base = state_from_usfm("\\p\n\\v 1 word");
        let key = text_key_of(&base, "word");
        let mut prev = base.clone();
        prev.set_selection(Some(Selection {
            anchor: Point::text(key.clone(), 0),
            focus: Point::text(key.clone(), 4),
        }));
        let next = with_cursor(&set_text(&base, &key, "w"), &key, 1);

        let kind = classify_change(
            Some(&prev),
            &next,
            &one_leaf(&key),
            &HashMap::new(),
            false,
        );
        assert_eq!(kind, ChangeKind::Other);
    }
}
