//! Undo/redo history engine.
//!
//! On every committed update the engine computes a merge action: merge
//! the update into the current entry, push a new entry, or discard the
//! candidate. Replayed history is never re-recorded. Change
//! notifications are coalesced on the same window as merge detection,
//! except the first notification of a session which fires synchronously.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::classifier::{classify_change, is_text_node_unchanged, ChangeKind};
use crate::debounce::Coalescer;
use crate::dirty::{DirtyNodes, IntentionallyDirty};
use crate::state::{EditorState, NodeKey};

/// Tags a transaction can carry into history processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateTag {
    /// Replaying an undo/redo snapshot; never re-recorded
    Historic,
    /// Caller requests a fresh entry regardless of classification
    HistoryPush,
    /// Caller requests coalescing into the current entry
    HistoryMerge,
}

pub type EditorId = String;

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub state: Arc<EditorState>,
    pub editor: EditorId,
}

/// The undo/redo stacks plus the entry being accumulated
#[derive(Debug, Default)]
pub struct HistoryState {
    pub current: Option<HistoryEntry>,
    pub undo_stack: Vec<HistoryEntry>,
    pub redo_stack: Vec<HistoryEntry>,
}

pub fn create_empty_history_state() -> HistoryState {
    HistoryState::default()
}

impl HistoryState {
    /// Retire `current` to the undo stack; a new entry invalidates any
    /// redo future.
    fn push(&mut self) {
        if let Some(current) = self.current.take() {
            self.undo_stack.push(current);
        }
        self.redo_stack.clear();
    }

    fn merge(&mut self, entry: HistoryEntry) {
        self.current = Some(entry);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Merge,
    Push,
    Discard,
}

/// One committed update, as seen by the history engine
#[derive(Debug, Clone)]
pub struct HistoryUpdate {
    pub prev_state: Option<Arc<EditorState>>,
    pub next_state: Arc<EditorState>,
    pub dirty_leaves: HashSet<NodeKey>,
    pub dirty_elements: HashMap<NodeKey, IntentionallyDirty>,
    pub tags: HashSet<UpdateTag>,
    pub is_composing: bool,
    pub editor: EditorId,
}

/// Payload delivered to the change listener
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub editor_changed: bool,
    pub dirty_leaves: HashSet<NodeKey>,
    pub dirty_elements: HashMap<NodeKey, IntentionallyDirty>,
    pub tags: HashSet<UpdateTag>,
    pub can_undo: bool,
    pub can_redo: bool,
}

pub type ChangeListener = Box<dyn FnMut(&ChangeNotification)>;

pub struct HistoryEngine {
    state: HistoryState,
    delay: Duration,
    prev_change_kind: ChangeKind,
    prev_change_time: Instant,
    dirty: DirtyNodes,
    coalescer: Coalescer<ChangeNotification>,
    listener: Option<ChangeListener>,
}

impl std::fmt::Debug for HistoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryEngine")
            .field("undo_depth", &self.state.undo_stack.len())
            .field("redo_depth", &self.state.redo_stack.len())
            .field("prev_change_kind", &self.prev_change_kind)
            .finish()
    }
}

impl HistoryEngine {
    pub fn new(delay: Duration, now: Instant) -> Self {
        Self {
            state: create_empty_history_state(),
            delay,
            prev_change_kind: ChangeKind::Other,
            prev_change_time: now,
            dirty: DirtyNodes::new(),
            coalescer: Coalescer::new(delay),
            listener: None,
        }
    }

    pub fn set_listener(&mut self, listener: ChangeListener) {
        self.listener = Some(listener);
    }

    /// Install the freshly loaded snapshot as the current entry, so the
    /// first edit retires it to the undo stack. No-op once a current
    /// entry exists; never notifies.
    pub fn seed(&mut self, state: Arc<EditorState>, editor: EditorId) {
        if self.state.current.is_none() {
            self.state.current = Some(HistoryEntry { state, editor });
        }
    }

    /// Process one committed update
    pub fn record(&mut self, update: HistoryUpdate, now: Instant) {
        // Replayed history is already on the stacks. Reset the kind
        // tracking so the next organic edit compares against a neutral
        // baseline, then drop the candidate.
        if update.tags.contains(&UpdateTag::Historic) {
            self.prev_change_kind = ChangeKind::Other;
            self.prev_change_time = now;
            self.dirty.reset();
            return;
        }

        if let Some(current) = &self.state.current {
            if Arc::ptr_eq(&current.state, &update.next_state) {
                return;
            }
        }

        let merge_action = self.merge_action(&update, now);
        tracing::debug!(?merge_action, "history candidate");

        match merge_action {
            MergeAction::Push => {
                self.dirty.reset();
                self.state.push();
            }
            MergeAction::Discard => {
                self.dirty.reset();
                return;
            }
            MergeAction::Merge => {}
        }

        self.state.merge(HistoryEntry {
            state: Arc::clone(&update.next_state),
            editor: update.editor.clone(),
        });
        self.dirty.merge(&update.dirty_leaves, &update.dirty_elements);

        let editor_changed =
            !update.dirty_leaves.is_empty() || !update.dirty_elements.is_empty();
        let notification = ChangeNotification {
            editor_changed,
            dirty_leaves: self.dirty.leaves().clone(),
            dirty_elements: self.dirty.elements().clone(),
            tags: update.tags.clone(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        };

        // The first notification of a session bypasses the window; the
        // coalescer tracks whether it has ever fired.
        if let Some(notification) = self.coalescer.submit(notification, now) {
            if let Some(listener) = self.listener.as_mut() {
                listener(&notification);
            }
        }
    }

    fn merge_action(&mut self, update: &HistoryUpdate, now: Instant) -> MergeAction {
        let change_kind = classify_change(
            update.prev_state.as_deref(),
            &update.next_state,
            &update.dirty_leaves,
            &update.dirty_elements,
            update.is_composing,
        );

        let action = self.merge_action_inner(update, change_kind, now);

        self.prev_change_kind = change_kind;
        self.prev_change_time = now;
        action
    }

    fn merge_action_inner(
        &self,
        update: &HistoryUpdate,
        change_kind: ChangeKind,
        now: Instant,
    ) -> MergeAction {
        let is_same_editor = self
            .state
            .current
            .as_ref()
            .map(|current| current.editor == update.editor)
            .unwrap_or(true);
        let should_push = update.tags.contains(&UpdateTag::HistoryPush);
        let should_merge =
            !should_push && is_same_editor && update.tags.contains(&UpdateTag::HistoryMerge);

        if should_merge {
            return MergeAction::Merge;
        }

        let prev_state = match &update.prev_state {
            Some(prev) => prev,
            None => return MergeAction::Push,
        };

        let has_dirty_nodes =
            !update.dirty_leaves.is_empty() || !update.dirty_elements.is_empty();
        if !has_dirty_nodes {
            if update.next_state.selection().is_some() {
                return MergeAction::Merge;
            }
            return MergeAction::Discard;
        }

        if !should_push
            && change_kind != ChangeKind::Other
            && change_kind == self.prev_change_kind
            && now < self.prev_change_time + self.delay
            && is_same_editor
        {
            return MergeAction::Merge;
        }

        // A node can be marked dirty yet unchanged when a transform
        // reverted the edit.
        if update.dirty_leaves.len() == 1 {
            if let Some(key) = update.dirty_leaves.iter().next() {
                if is_text_node_unchanged(key, prev_state, &update.next_state) {
                    return MergeAction::Merge;
                }
            }
        }

        MergeAction::Push
    }

    /// Move `current` to the redo stack and surface the most recent undo
    /// entry; the caller replays the returned snapshot with a
    /// [`UpdateTag::Historic`] tag.
    pub fn undo(&mut self) -> Option<Arc<EditorState>> {
        let entry = self.state.undo_stack.pop()?;
        if let Some(current) = self.state.current.take() {
            self.state.redo_stack.push(current);
        }
        let snapshot = Arc::clone(&entry.state);
        self.state.current = Some(entry);
        Some(snapshot)
    }

    pub fn redo(&mut self) -> Option<Arc<EditorState>> {
        let entry = self.state.redo_stack.pop()?;
        if let Some(current) = self.state.current.take() {
            self.state.undo_stack.push(current);
        }
        let snapshot = Arc::clone(&entry.state);
        self.state.current = Some(entry);
        Some(snapshot)
    }

    /// Empty both stacks and the current entry. Starts a fresh
    /// notification session: the next notification fires immediately.
    pub fn clear(&mut self) {
        self.state = create_empty_history_state();
        self.dirty.reset();
        self.coalescer = Coalescer::new(self.delay);
    }

    /// Clear and restart change tracking from a neutral baseline
    pub fn reset(&mut self, now: Instant) {
        self.clear();
        self.prev_change_kind = ChangeKind::Other;
        self.prev_change_time = now;
    }

    pub fn can_undo(&self) -> bool {
        !self.state.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.state.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.state.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.state.redo_stack.len()
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.state.current.as_ref()
    }

    /// Deliver a coalesced notification whose window has elapsed
    pub fn poll_notifications(&mut self, now: Instant) {
        if let (Some(notification), Some(listener)) =
            (self.coalescer.poll(now), self.listener.as_mut())
        {
            listener(&notification);
        }
    }

    /// Deliver any held notification immediately (teardown path)
    pub fn flush_notifications(&mut self) {
        if let (Some(notification), Some(listener)) =
            (self.coalescer.flush(), self.listener.as_mut())
        {
            listener(&notification);
        }
    }
}
