//! Idempotent wrapper around a pluggable vector store.

use std::sync::Arc;

use ndarray::Array1;
use tracing::debug;

use crate::store::VectorStore;
use crate::types::{MetadataFilter, ScoredRecord};
use quarry_core::{DocumentRecord, Result};

/// Repository guaranteeing that re-indexing a file never leaves duplicate
/// chunks, whatever the backend's upsert support.
#[derive(Clone)]
pub struct StoreRepository {
    store: Arc<dyn VectorStore>,
}

impl StoreRepository {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Insert-or-replace records by id. Falls back to delete-then-add when
    /// the backend has no native upsert.
    pub fn upsert(&self, records: Vec<DocumentRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if self.store.native_upsert() {
            return self.store.upsert(records);
        }
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        self.store.delete_ids(&ids)?;
        self.store.add(records)
    }

    /// Replace every record of a source file with a fresh chunk set.
    /// Returns the ids that were removed.
    pub fn replace_path(&self, path: &str, records: Vec<DocumentRecord>) -> Result<Vec<String>> {
        let removed = self.store.delete_where(&MetadataFilter::for_path(path))?;
        if !removed.is_empty() {
            debug!("Replaced {} prior records for {}", removed.len(), path);
        }
        self.upsert(records)?;
        Ok(removed)
    }

    /// Delete every record of a source file. Returns removed ids.
    pub fn delete_path(&self, path: &str) -> Result<Vec<String>> {
        self.store.delete_where(&MetadataFilter::for_path(path))
    }

    pub fn search(
        &self,
        query: &Array1<f32>,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredRecord>> {
        self.store.search(query, k, filter)
    }

    pub fn get(&self, ids: &[String]) -> Result<Vec<DocumentRecord>> {
        self.store.get(ids)
    }

    pub fn count(&self) -> Result<usize> {
        self.store.count()
    }
}
