//! Editing session.
//!
//! All mutations happen inside discrete update transactions. A
//! transaction clones the current snapshot, applies writes to the
//! clone, and either commits the whole new snapshot or is never
//! observed. Secondary writes produced by post-effects run as nested
//! transactions, to completion, before the outer update returns;
//! nothing can interleave.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use scriptorium_converter::DocNode;
use scriptorium_parser::id_generator::IdGenerator;

use crate::errors::EditorError;
use crate::history::{
    ChangeListener, EditorId, HistoryEngine, HistoryUpdate, UpdateTag,
};
use crate::operations::{OperationType, StructuralChange};
use crate::post_effects::{PostEffectEngine, SecondaryMutation};
use crate::renumber::RenumberVerses;
use crate::state::{EditorState, NodeBody, NodeKey, NodeKind, NodeRecord, Selection};

fn kind_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Element => "element",
        NodeKind::TextRun => "text-run",
        NodeKind::Verse => "verse",
        NodeKind::Chapter => "chapter",
        NodeKind::Graft => "graft",
    }
}

/// Write handle over the next snapshot
pub struct Transaction<'a> {
    next: EditorState,
    ids: &'a mut IdGenerator,
    registered_kinds: &'a HashSet<NodeKind>,
    dirty_leaves: HashSet<NodeKey>,
    dirty_elements: HashMap<NodeKey, bool>,
    structural: Vec<StructuralChange>,
}

impl<'a> Transaction<'a> {
    fn new(
        next: EditorState,
        ids: &'a mut IdGenerator,
        registered_kinds: &'a HashSet<NodeKind>,
    ) -> Self {
        Self {
            next,
            ids,
            registered_kinds,
            dirty_leaves: HashSet::new(),
            dirty_elements: HashMap::new(),
            structural: Vec::new(),
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.next
    }

    pub fn node(&self, key: &str) -> Option<&NodeRecord> {
        self.next.node(key)
    }

    fn mark_element_dirty(&mut self, key: &NodeKey, intentional: bool) {
        let entry = self.dirty_elements.entry(key.clone()).or_insert(false);
        *entry |= intentional;
    }

    /// Nearest element ancestor below the root, if any
    fn block_ancestor(&self, key: &str) -> Option<NodeKey> {
        let mut current = self.next.node(key)?.parent.clone();
        while let Some(parent_key) = current {
            if parent_key == *self.next.root() {
                return None;
            }
            let record = self.next.node(&parent_key)?;
            if matches!(record.body, NodeBody::Element { .. } | NodeBody::Graft { .. }) {
                return Some(parent_key);
            }
            current = record.parent.clone();
        }
        None
    }

    /// Record a Replace for the block containing `key`; the subtree
    /// snapshot is refreshed at commit time.
    fn touch_block_ancestor(&mut self, key: &str) {
        if let Some(ancestor) = self.block_ancestor(key) {
            if let Some(path) = self.next.path_of(&ancestor) {
                if let Ok(node) = self.next.to_doc_tree(&ancestor) {
                    self.structural.push(StructuralChange {
                        key: ancestor,
                        op: OperationType::Replace,
                        path,
                        node,
                    });
                }
            }
        }
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.next.set_selection(selection);
    }

    pub fn set_text(&mut self, key: &str, text: impl Into<String>) -> Result<(), EditorError> {
        let record = self
            .next
            .nodes_mut()
            .get_mut(key)
            .ok_or_else(|| EditorError::NodeNotFound(key.to_string()))?;
        match &mut record.body {
            NodeBody::TextRun { text: slot, .. } => {
                *slot = text.into();
            }
            _ => return Err(EditorError::NotText(key.to_string())),
        }
        let parent = record.parent.clone();
        self.dirty_leaves.insert(key.to_string());
        if let Some(parent) = parent {
            self.mark_element_dirty(&parent, false);
        }
        self.touch_block_ancestor(key);
        Ok(())
    }

    pub fn set_attribute(
        &mut self,
        key: &str,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), EditorError> {
        let record = self
            .next
            .nodes_mut()
            .get_mut(key)
            .ok_or_else(|| EditorError::NodeNotFound(key.to_string()))?;
        match &mut record.body {
            NodeBody::Element { attributes, .. } => {
                attributes.insert(name.into(), value.into());
            }
            _ => return Err(EditorError::NotAnElement(key.to_string())),
        }
        self.mark_element_dirty(&key.to_string(), true);

        if let (Some(path), Ok(node)) = (self.next.path_of(key), self.next.to_doc_tree(key)) {
            self.structural.push(StructuralChange {
                key: key.to_string(),
                op: OperationType::Replace,
                path,
                node,
            });
        }
        Ok(())
    }

    pub fn set_verse_number(
        &mut self,
        key: &str,
        number: impl Into<String>,
    ) -> Result<(), EditorError> {
        let record = self
            .next
            .nodes_mut()
            .get_mut(key)
            .ok_or_else(|| EditorError::NodeNotFound(key.to_string()))?;
        match &mut record.body {
            NodeBody::Verse { number: slot } => {
                *slot = number.into();
            }
            _ => return Err(EditorError::NotAnElement(key.to_string())),
        }
        self.mark_element_dirty(&key.to_string(), true);
        self.touch_block_ancestor(key);
        Ok(())
    }

    /// Insert a new node under `parent` at `index`, returning its key
    pub fn insert_node(
        &mut self,
        parent: &str,
        index: usize,
        body: NodeBody,
    ) -> Result<NodeKey, EditorError> {
        if !self.registered_kinds.contains(&body.kind()) {
            return Err(EditorError::NodeKindNotRegistered(kind_name(body.kind())));
        }
        let parent_record = self
            .next
            .node(parent)
            .ok_or_else(|| EditorError::NodeNotFound(parent.to_string()))?;
        if !matches!(
            parent_record.body,
            NodeBody::Element { .. } | NodeBody::Graft { .. }
        ) {
            return Err(EditorError::NotAnElement(parent.to_string()));
        }

        let key: NodeKey = self.ids.new_id();
        let is_leaf = body.is_text();
        self.next.nodes_mut().insert(
            key.clone(),
            NodeRecord {
                parent: Some(parent.to_string()),
                children: Vec::new(),
                body,
            },
        );
        if let Some(parent_record) = self.next.nodes_mut().get_mut(parent) {
            let index = index.min(parent_record.children.len());
            parent_record.children.insert(index, key.clone());
        }

        if is_leaf {
            self.dirty_leaves.insert(key.clone());
        } else {
            self.mark_element_dirty(&key, true);
        }
        self.mark_element_dirty(&parent.to_string(), true);

        if let (Some(path), Ok(node)) = (self.next.path_of(&key), self.next.to_doc_tree(&key)) {
            self.structural.push(StructuralChange {
                key: key.clone(),
                op: OperationType::Add,
                path,
                node,
            });
        }
        self.touch_block_ancestor(&key);
        Ok(key)
    }

    /// Insert a whole document-tree fragment under `parent`
    pub fn insert_subtree(
        &mut self,
        parent: &str,
        index: usize,
        tree: &DocNode,
    ) -> Result<NodeKey, EditorError> {
        let key = self.insert_node(parent, index, crate::state::body_of(tree))?;
        for (child_index, child) in tree.children().iter().enumerate() {
            self.insert_subtree(&key, child_index, child)?;
        }
        Ok(key)
    }

    /// Remove a node and its descendants
    pub fn remove_node(&mut self, key: &str) -> Result<(), EditorError> {
        if key == self.next.root() {
            return Err(EditorError::RootIsImmovable);
        }
        let path = self
            .next
            .path_of(key)
            .ok_or_else(|| EditorError::NodeNotFound(key.to_string()))?;
        let node = self.next.to_doc_tree(key)?;
        let parent = self
            .next
            .node(key)
            .and_then(|record| record.parent.clone());

        self.detach(key);
        self.remove_subtree(key);

        if let Some(parent) = parent {
            self.mark_element_dirty(&parent, true);
            self.touch_block_ancestor_of_element(&parent);
        }
        self.structural.push(StructuralChange {
            key: key.to_string(),
            op: OperationType::Remove,
            path,
            node,
        });
        Ok(())
    }

    /// Replace a node's payload in place, keeping its children
    pub fn replace_node(&mut self, key: &str, body: NodeBody) -> Result<(), EditorError> {
        if !self.registered_kinds.contains(&body.kind()) {
            return Err(EditorError::NodeKindNotRegistered(kind_name(body.kind())));
        }
        let is_leaf = body.is_text();
        let record = self
            .next
            .nodes_mut()
            .get_mut(key)
            .ok_or_else(|| EditorError::NodeNotFound(key.to_string()))?;
        record.body = body;

        if is_leaf {
            self.dirty_leaves.insert(key.to_string());
        } else {
            self.mark_element_dirty(&key.to_string(), true);
        }

        if let (Some(path), Ok(node)) = (self.next.path_of(key), self.next.to_doc_tree(key)) {
            self.structural.push(StructuralChange {
                key: key.to_string(),
                op: OperationType::Replace,
                path,
                node,
            });
        }
        Ok(())
    }

    /// Relocate a node under a new parent. The operation builder will
    /// signal this as unsupported; the tree itself moves fine.
    pub fn move_node(
        &mut self,
        key: &str,
        new_parent: &str,
        index: usize,
    ) -> Result<(), EditorError> {
        if key == self.next.root() {
            return Err(EditorError::RootIsImmovable);
        }
        if !self.next.contains(key) {
            return Err(EditorError::NodeNotFound(key.to_string()));
        }
        if !self.next.contains(new_parent) {
            return Err(EditorError::NodeNotFound(new_parent.to_string()));
        }

        // Reject moves into the node's own subtree.
        let mut cursor = Some(new_parent.to_string());
        while let Some(current) = cursor {
            if current == key {
                return Err(EditorError::CycleDetected(
                    key.to_string(),
                    new_parent.to_string(),
                ));
            }
            cursor = self.next.node(&current).and_then(|r| r.parent.clone());
        }

        self.detach(key);
        if let Some(record) = self.next.nodes_mut().get_mut(key) {
            record.parent = Some(new_parent.to_string());
        }
        if let Some(parent_record) = self.next.nodes_mut().get_mut(new_parent) {
            let index = index.min(parent_record.children.len());
            parent_record.children.insert(index, key.to_string());
        }

        self.mark_element_dirty(&new_parent.to_string(), true);
        if let (Some(path), Ok(node)) = (self.next.path_of(key), self.next.to_doc_tree(key)) {
            self.structural.push(StructuralChange {
                key: key.to_string(),
                op: OperationType::Move,
                path,
                node,
            });
        }
        Ok(())
    }

    fn touch_block_ancestor_of_element(&mut self, key: &str) {
        if key == self.next.root() {
            return;
        }
        if let Some(path) = self.next.path_of(key) {
            if let Ok(node) = self.next.to_doc_tree(key) {
                self.structural.push(StructuralChange {
                    key: key.to_string(),
                    op: OperationType::Replace,
                    path,
                    node,
                });
            }
        }
    }

    fn detach(&mut self, key: &str) {
        let parent = self.next.node(key).and_then(|r| r.parent.clone());
        if let Some(parent) = parent {
            if let Some(parent_record) = self.next.nodes_mut().get_mut(&parent) {
                parent_record.children.retain(|child| child != key);
            }
        }
    }

    fn remove_subtree(&mut self, key: &str) {
        let children = self
            .next
            .node(key)
            .map(|record| record.children.clone())
            .unwrap_or_default();
        for child in children {
            self.remove_subtree(&child);
        }
        self.next.nodes_mut().remove(key);
    }

    fn apply_secondary(&mut self, mutation: &SecondaryMutation) -> Result<(), EditorError> {
        match mutation {
            SecondaryMutation::SetVerseNumber { key, number } => {
                self.set_verse_number(key, number.clone())
            }
        }
    }
}

/// Result of one update transaction, nested post-effect transactions
/// included
#[derive(Debug, Default)]
pub struct UpdateResult {
    pub structural_changes: Vec<StructuralChange>,
}

/// Single-editor session over an arena snapshot
pub struct Editor {
    id: EditorId,
    state: Arc<EditorState>,
    ids: IdGenerator,
    registered_kinds: HashSet<NodeKind>,
    history: HistoryEngine,
    post_effects: PostEffectEngine,
    is_composing: bool,
}

impl Editor {
    pub fn new(
        id: impl Into<EditorId>,
        initial: EditorState,
        ids: IdGenerator,
        delay: Duration,
        now: Instant,
    ) -> Self {
        let registered_kinds = [
            NodeKind::Element,
            NodeKind::TextRun,
            NodeKind::Verse,
            NodeKind::Chapter,
            NodeKind::Graft,
        ]
        .into_iter()
        .collect();
        Self::with_node_kinds(id, initial, ids, delay, now, registered_kinds)
    }

    pub fn with_node_kinds(
        id: impl Into<EditorId>,
        initial: EditorState,
        ids: IdGenerator,
        delay: Duration,
        now: Instant,
        registered_kinds: HashSet<NodeKind>,
    ) -> Self {
        let id = id.into();
        let state = Arc::new(initial);
        let mut history = HistoryEngine::new(delay, now);
        history.seed(Arc::clone(&state), id.clone());
        Self {
            id,
            state,
            ids,
            registered_kinds,
            history,
            post_effects: PostEffectEngine::new(),
            is_composing: false,
        }
    }

    pub fn id(&self) -> &EditorId {
        &self.id
    }

    pub fn state(&self) -> &Arc<EditorState> {
        &self.state
    }

    pub fn set_change_listener(&mut self, listener: ChangeListener) {
        self.history.set_listener(listener);
    }

    /// Register the renumbering engine. The verse node kind must be
    /// available in this session; a missing kind is a setup error,
    /// raised here rather than at the first insert.
    pub fn register_verse_renumbering(&mut self) -> Result<(), EditorError> {
        if !self.registered_kinds.contains(&NodeKind::Verse) {
            return Err(EditorError::NodeKindNotRegistered("verse"));
        }
        self.post_effects.register(Box::new(RenumberVerses));
        Ok(())
    }

    pub fn set_composing(&mut self, is_composing: bool) {
        self.is_composing = is_composing;
    }

    /// Run one update transaction. Post-effect writes triggered by the
    /// transaction's structural mutations run as nested history-merge
    /// transactions before this returns.
    pub fn update<F>(
        &mut self,
        tags: HashSet<UpdateTag>,
        now: Instant,
        f: F,
    ) -> Result<UpdateResult, EditorError>
    where
        F: FnOnce(&mut Transaction) -> Result<(), EditorError>,
    {
        let mut changes = self.commit(tags, now, f)?;

        let mut cursor = 0;
        while cursor < changes.len() {
            let change = changes[cursor].clone();
            let secondary = self.post_effects.analyze(&change, &self.state);
            if !secondary.is_empty() {
                let merge_tags: HashSet<UpdateTag> =
                    [UpdateTag::HistoryMerge].into_iter().collect();
                let nested = self.commit(merge_tags, now, |tx| {
                    for mutation in &secondary {
                        tx.apply_secondary(mutation)?;
                    }
                    Ok(())
                })?;
                changes.extend(nested);
            }
            cursor += 1;
        }

        self.history.poll_notifications(now);
        Ok(UpdateResult {
            structural_changes: changes,
        })
    }

    fn commit<F>(
        &mut self,
        tags: HashSet<UpdateTag>,
        now: Instant,
        f: F,
    ) -> Result<Vec<StructuralChange>, EditorError>
    where
        F: FnOnce(&mut Transaction) -> Result<(), EditorError>,
    {
        let mut tx = Transaction::new(
            (*self.state).clone(),
            &mut self.ids,
            &self.registered_kinds,
        );
        f(&mut tx)?;

        let Transaction {
            next,
            dirty_leaves,
            dirty_elements,
            structural,
            ..
        } = tx;
        let structural = dedupe_replaces(refresh_snapshots(structural, &next));

        let next = Arc::new(next);
        let prev = Arc::clone(&self.state);
        self.state = Arc::clone(&next);

        self.history.record(
            HistoryUpdate {
                prev_state: Some(prev),
                next_state: next,
                dirty_leaves,
                dirty_elements,
                tags,
                is_composing: self.is_composing,
                editor: self.id.clone(),
            },
            now,
        );

        Ok(structural)
    }

    /// Restore the previous history snapshot; returns false when the
    /// undo stack is empty
    pub fn undo(&mut self, now: Instant) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.replay(snapshot, now);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self, now: Instant) -> bool {
        match self.history.redo() {
            Some(snapshot) => {
                self.replay(snapshot, now);
                true
            }
            None => false,
        }
    }

    fn replay(&mut self, snapshot: Arc<EditorState>, now: Instant) {
        let prev = std::mem::replace(&mut self.state, snapshot);
        let tags: HashSet<UpdateTag> = [UpdateTag::Historic].into_iter().collect();
        self.history.record(
            HistoryUpdate {
                prev_state: Some(prev),
                next_state: Arc::clone(&self.state),
                dirty_leaves: HashSet::new(),
                dirty_elements: HashMap::new(),
                tags,
                is_composing: false,
                editor: self.id.clone(),
            },
            now,
        );
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }

    pub fn redo_depth(&self) -> usize {
        self.history.redo_depth()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn reset_history(&mut self, now: Instant) {
        self.history.reset(now);
    }

    /// Deliver a coalesced change notification whose window elapsed
    pub fn poll_notifications(&mut self, now: Instant) {
        self.history.poll_notifications(now);
    }

    pub fn flush_notifications(&mut self) {
        self.history.flush_notifications();
    }
}

/// Re-export subtree snapshots from the final transaction state so a
/// change captured early in a transaction reflects writes that came
/// after it (an add records its children, a replace its final text).
/// Removed nodes keep the snapshot taken before removal.
fn refresh_snapshots(
    mut structural: Vec<StructuralChange>,
    next: &EditorState,
) -> Vec<StructuralChange> {
    for change in &mut structural {
        if change.op == OperationType::Remove {
            continue;
        }
        if let (Some(path), Ok(node)) = (next.path_of(&change.key), next.to_doc_tree(&change.key)) {
            change.path = path;
            change.node = node;
        }
    }
    structural
}

/// Collapse repeated replaces of the same node down to the last one
fn dedupe_replaces(structural: Vec<StructuralChange>) -> Vec<StructuralChange> {
    let mut last_replace: HashMap<NodeKey, usize> = HashMap::new();
    for (index, change) in structural.iter().enumerate() {
        if change.op == OperationType::Replace {
            last_replace.insert(change.key.clone(), index);
        }
    }
    structural
        .into_iter()
        .enumerate()
        .filter(|(index, change)| {
            change.op != OperationType::Replace || last_replace.get(&change.key) == Some(index)
        })
        .map(|(_, change)| change)
        .collect()
}
