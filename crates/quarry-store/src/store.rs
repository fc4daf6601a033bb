//! Vector store capability trait and backend factory.

use std::sync::Arc;

use ndarray::Array1;

use crate::memory::InMemoryStore;
use crate::types::{MetadataFilter, ScoredRecord};
use quarry_core::{DocumentRecord, Error, Result};

/// Capability set every vector store backend exposes. Concrete vector
/// databases plug in behind this trait.
pub trait VectorStore: Send + Sync {
    /// Insert records. Behavior for an existing id is backend-defined;
    /// use the repository for idempotent writes.
    fn add(&self, records: Vec<DocumentRecord>) -> Result<()>;

    /// Whether the backend upserts natively.
    fn native_upsert(&self) -> bool {
        false
    }

    /// Insert-or-replace by id. Backends without native upsert may leave
    /// the default; the repository falls back to delete-then-add.
    fn upsert(&self, _records: Vec<DocumentRecord>) -> Result<()> {
        Err(Error::Store("backend has no native upsert".into()))
    }

    /// Delete by ids. Returns the ids actually removed.
    fn delete_ids(&self, ids: &[String]) -> Result<Vec<String>>;

    /// Delete every record matching the metadata filter. Returns removed ids.
    fn delete_where(&self, filter: &MetadataFilter) -> Result<Vec<String>>;

    /// Ranked nearest-neighbor search; scores are cosine similarities.
    fn search(
        &self,
        query: &Array1<f32>,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredRecord>>;

    /// Fetch records by id; missing ids are skipped.
    fn get(&self, ids: &[String]) -> Result<Vec<DocumentRecord>>;

    fn count(&self) -> Result<usize>;
}

/// Selectable store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    InMemory,
}

/// Construct a store backend.
pub fn build_store(kind: StoreKind, dim: usize) -> Arc<dyn VectorStore> {
    match kind {
        StoreKind::InMemory => Arc::new(InMemoryStore::new(dim)),
    }
}
