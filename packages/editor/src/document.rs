//! Document handle.
//!
//! Ties the full lifecycle together:
//!
//! ```text
//! Load → Parse → Convert → Edit → Convert back → Serialize → Save
//!   ↓      ↓        ↓        ↓          ↓            ↓         ↓
//! Store  PERF   node tree  arena   PERF patches    USFM     Store
//! ```

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use scriptorium_converter::{document_to_perf, perf_to_document, PerfKind, PerfNode};
use scriptorium_parser::id_generator::{get_document_id, IdGenerator};
use scriptorium_parser::markers::MarkerTable;
use scriptorium_parser::parser::{to_perf, SourceContext};
use scriptorium_parser::perf::PerfDocument;
use scriptorium_parser::serializer::to_marker_text;

use crate::editor::{Editor, Transaction};
use crate::errors::EditorError;
use crate::history::UpdateTag;
use crate::operations::{BuildOutcome, Operation, OperationBuilder};
use crate::state::EditorState;
use crate::store::BookStore;
use crate::validator::{AcceptAllValidator, SchemaValidator};

/// Window used for history merging and change-notification coalescing
pub const DEFAULT_MERGE_DELAY: Duration = Duration::from_millis(500);

/// Outcome of one document update
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    /// Validated patch operations derived from this update
    pub operations: Vec<Operation>,
    /// Structural moves that were signaled as unsupported
    pub skipped_moves: usize,
}

/// Editable scripture document
pub struct Document {
    pub book_id: String,
    /// Increments on each committed update
    pub version: u64,
    table: MarkerTable,
    metadata: Map<String, Value>,
    main_sequence_id: String,
    editor: Editor,
    validator: Box<dyn SchemaValidator>,
}

impl Document {
    /// Parse marker text and open it for editing
    pub fn from_marker_text(
        book_id: impl Into<String>,
        source: &str,
        context: &SourceContext,
        delay: Duration,
        now: Instant,
    ) -> Result<Self, EditorError> {
        let book_id = book_id.into();
        let table = MarkerTable::standard()?;
        let perf = to_perf(source, context, &table)?;
        Self::open(book_id, perf, table, delay, now)
    }

    /// Open an existing PERF document for editing
    pub fn from_perf(
        book_id: impl Into<String>,
        perf: PerfDocument,
        delay: Duration,
        now: Instant,
    ) -> Result<Self, EditorError> {
        let table = MarkerTable::standard()?;
        Self::open(book_id.into(), perf, table, delay, now)
    }

    /// Fetch a book from the external store and open it
    pub fn read_from(
        store: &dyn BookStore,
        book_id: &str,
        delay: Duration,
        now: Instant,
    ) -> Result<Self, EditorError> {
        let perf = store.read(book_id)?;
        Self::from_perf(book_id, perf, delay, now)
    }

    fn open(
        book_id: String,
        perf: PerfDocument,
        table: MarkerTable,
        delay: Duration,
        now: Instant,
    ) -> Result<Self, EditorError> {
        let tree = perf_to_document(&perf, &table)?;
        let mut ids = IdGenerator::from_seed(format!("{}-n", get_document_id(&book_id)));
        let state = EditorState::from_doc_tree(&tree, &mut ids);
        let editor = Editor::new(book_id.clone(), state, ids, delay, now);

        Ok(Self {
            book_id,
            version: 0,
            table,
            metadata: perf.metadata.clone(),
            main_sequence_id: perf.main_sequence_id.clone(),
            editor,
            validator: Box::new(AcceptAllValidator),
        })
    }

    /// Swap in the external schema validator
    pub fn set_validator(&mut self, validator: Box<dyn SchemaValidator>) {
        self.validator = validator;
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut Editor {
        &mut self.editor
    }

    pub fn marker_table(&self) -> &MarkerTable {
        &self.table
    }

    /// Run one update transaction, then derive patch operations from the
    /// structural mutations it produced. A fragment that fails schema
    /// validation aborts with an error; the committed editor state and
    /// the undo stack are left intact.
    pub fn update<F>(
        &mut self,
        tags: HashSet<UpdateTag>,
        now: Instant,
        f: F,
    ) -> Result<UpdateOutcome, EditorError>
    where
        F: FnOnce(&mut Transaction) -> Result<(), EditorError>,
    {
        let result = self.editor.update(tags, now, f)?;
        self.version += 1;

        let builder =
            OperationBuilder::new(&self.table, self.validator.as_ref(), &self.main_sequence_id);
        let mut outcome = UpdateOutcome::default();
        for change in &result.structural_changes {
            match builder.build(change)? {
                BuildOutcome::Operation(operation) => outcome.operations.push(operation),
                BuildOutcome::SkippedMove => outcome.skipped_moves += 1,
                BuildOutcome::NotApplicable => {}
            }
        }
        Ok(outcome)
    }

    /// Rebuild the PERF document from the current editor snapshot
    pub fn export_perf(&self) -> Result<PerfDocument, EditorError> {
        let state = self.editor.state();
        let tree = state.to_doc_tree(state.root())?;
        let conversion = document_to_perf(&tree, PerfKind::Sequence, &self.table)?;

        let mut perf = PerfDocument::new(self.main_sequence_id.clone());
        perf.metadata = self.metadata.clone();
        match conversion.node {
            PerfNode::Sequence(sequence) => {
                perf.sequences
                    .insert(self.main_sequence_id.clone(), sequence);
            }
            _ => return Err(crate::errors::OperationError::UnexpectedShape.into()),
        }
        for (id, sequence) in conversion.side_sequences {
            perf.sequences.insert(id, sequence);
        }
        perf.check_references()?;
        Ok(perf)
    }

    /// Serialize the current snapshot back to marker text
    pub fn export_marker_text(&self) -> Result<String, EditorError> {
        let perf = self.export_perf()?;
        Ok(to_marker_text(&perf)?)
    }

    /// Push the current snapshot to the external store
    pub fn save_to(&self, store: &mut dyn BookStore) -> Result<(), EditorError> {
        let perf = self.export_perf()?;
        store.sideload(&self.book_id, perf)?;
        Ok(())
    }
}
