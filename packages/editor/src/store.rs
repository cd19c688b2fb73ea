//! External document-store boundary.
//!
//! The core treats the store purely as a source/sink for a book's PERF
//! document and marker text. Retries, caching and transport belong to
//! the implementation behind the trait.

use std::collections::HashMap;

use scriptorium_parser::perf::PerfDocument;

use crate::errors::StoreError;

pub trait BookStore {
    fn read(&self, book_id: &str) -> Result<PerfDocument, StoreError>;

    fn sideload(&mut self, book_id: &str, document: PerfDocument) -> Result<(), StoreError>;

    fn read_marker_text(&self, book_id: &str) -> Result<String, StoreError>;
}

/// In-memory store for tests and temporary documents
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: HashMap<String, PerfDocument>,
    marker_texts: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marker_text(mut self, book_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.marker_texts.insert(book_id.into(), text.into());
        self
    }
}

impl BookStore for MemoryStore {
    fn read(&self, book_id: &str) -> Result<PerfDocument, StoreError> {
        self.documents
            .get(book_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(book_id.to_string()))
    }

    fn sideload(&mut self, book_id: &str, document: PerfDocument) -> Result<(), StoreError> {
        self.documents.insert(book_id.to_string(), document);
        Ok(())
    }

    fn read_marker_text(&self, book_id: &str) -> Result<String, StoreError> {
        self.marker_texts
            .get(book_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(book_id.to_string()))
    }
}
