//! # Scriptorium Editor
//!
//! Core editing engine for structured scripture documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ parser: marker text ↔ PERF tree             │
//! └─────────────────────────────────────────────┘
//!                     ↕
//! ┌─────────────────────────────────────────────┐
//! │ converter: PERF ↔ document node tree        │
//! └─────────────────────────────────────────────┘
//!                     ↕
//! ┌─────────────────────────────────────────────┐
//! │ editor: snapshot arena + transactions       │
//! │  - mutation classifier + history engine     │
//! │  - operation builder → validated patches    │
//! │  - verse renumbering post-effect            │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core principles
//!
//! 1. **Snapshots are immutable**: every transaction commits a whole new
//!    arena snapshot or is never observed
//! 2. **History decides merge-worthiness, not content**: the classifier
//!    only coalesces rapid single-character edits
//! 3. **Patches are validated**: a converted fragment that fails schema
//!    validation never reaches the emitted-operations list
//! 4. **Moves are signaled, not guessed**: the operation builder skips
//!    structural moves with a diagnostic instead of synthesizing pairs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scriptorium_editor::{Document, DEFAULT_MERGE_DELAY};
//!
//! let mut doc = Document::from_marker_text(
//!     "TIT", usfm, &context, DEFAULT_MERGE_DELAY, Instant::now(),
//! )?;
//!
//! let outcome = doc.update(tags, Instant::now(), |tx| {
//!     tx.set_text(&key, "new words")
//! })?;
//!
//! let usfm = doc.export_marker_text()?;
//! ```

mod classifier;
mod debounce;
mod dirty;
mod document;
mod editor;
mod errors;
mod history;
mod operations;
mod post_effects;
mod renumber;
mod state;
mod store;
mod validator;

pub use classifier::{classify_change, ChangeKind};
pub use debounce::Coalescer;
pub use dirty::{DirtyNodes, IntentionallyDirty};
pub use document::{Document, UpdateOutcome, DEFAULT_MERGE_DELAY};
pub use editor::{Editor, Transaction, UpdateResult};
pub use errors::{EditorError, OperationError, StoreError, VerseNumberError};
pub use history::{
    create_empty_history_state, ChangeListener, ChangeNotification, EditorId, HistoryEngine,
    HistoryEntry, HistoryState, HistoryUpdate, MergeAction, UpdateTag,
};
pub use operations::{
    BuildOutcome, Operation, OperationBuilder, OperationType, PathStep, StructuralChange,
};
pub use post_effects::{PostEffect, PostEffectEngine, SecondaryMutation};
pub use renumber::{RenumberVerses, VerseNumber, VersePart};
pub use state::{
    EditorState, NodeBody, NodeKey, NodeKind, NodeRecord, Point, PointKind, Selection, TextMode,
};
pub use store::{BookStore, MemoryStore};
pub use validator::{AcceptAllValidator, SchemaValidator, ValidationError, ValidationReport};

// Re-export the neighbouring layers for convenience.
pub use scriptorium_converter::{DocNode, PerfKind, PerfNode};
pub use scriptorium_parser::parser::SourceContext;
pub use scriptorium_parser::perf::PerfDocument;

#[cfg(test)]
pub(crate) mod test_util {
    use scriptorium_converter::perf_to_document;
    use scriptorium_parser::id_generator::IdGenerator;
    use scriptorium_parser::markers::MarkerTable;
    use scriptorium_parser::parser::{to_perf, SourceContext};

    use crate::state::{EditorState, NodeBody, NodeKey};

    /// Parse a USFM snippet all the way into an editor state arena
    pub fn state_from_usfm(source: &str) -> EditorState {
        let table = MarkerTable::standard().unwrap();
        let context = SourceContext::new("local", "local", "en", "test");
        let doc = to_perf(source, &context, &table).unwrap();
        let tree = perf_to_document(&doc, &table).unwrap();
        let mut ids = IdGenerator::new("test");
        EditorState::from_doc_tree(&tree, &mut ids)
    }

    /// Key of the first text run whose content matches `text`
    pub fn text_key_of(state: &EditorState, text: &str) -> NodeKey {
        state
            .document_order()
            .into_iter()
            .find(|key| {
                matches!(
                    state.node(key).map(|r| &r.body),
                    Some(NodeBody::TextRun { text: t, .. }) if t.trim() == text
                )
            })
            .unwrap_or_else(|| panic!("no text run {text:?}"))
    }

    /// Keys of all verse nodes in document order
    pub fn verse_keys(state: &EditorState) -> Vec<NodeKey> {
        state
            .document_order()
            .into_iter()
            .filter(|key| {
                matches!(
                    state.node(key).map(|r| &r.body),
                    Some(NodeBody::Verse { .. })
                )
            })
            .collect()
    }
}
