//! In-memory vector store with a pre-normalized similarity matrix.

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::store::VectorStore;
use crate::types::{MetadataFilter, ScoredRecord};
use quarry_core::{DocumentRecord, Error, Result};

struct SimilarityMatrix {
    /// Normalized embeddings, shape (N, dim).
    matrix: Array2<f32>,
    /// Record ids corresponding to each row.
    ids: Vec<String>,
    /// Whether the matrix needs rebuilding.
    dirty: bool,
}

/// Vector store backed by a hash map and an ndarray similarity matrix.
pub struct InMemoryStore {
    dim: usize,
    records: RwLock<HashMap<String, DocumentRecord>>,
    matrix: Mutex<SimilarityMatrix>,
}

impl InMemoryStore {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            records: RwLock::new(HashMap::new()),
            matrix: Mutex::new(SimilarityMatrix {
                matrix: Array2::zeros((0, dim)),
                ids: Vec::new(),
                dirty: false,
            }),
        }
    }

    fn mark_dirty(&self) {
        self.matrix.lock().dirty = true;
    }

    /// Rebuild the matrix from all records carrying embeddings.
    fn rebuild_matrix(&self) -> Result<()> {
        let records = self.records.read();
        let embedded: Vec<(&String, &Array1<f32>)> = records
            .iter()
            .filter_map(|(id, r)| r.embedding.as_ref().map(|e| (id, e)))
            .collect();

        let mut mat = self.matrix.lock();
        if embedded.is_empty() {
            mat.matrix = Array2::zeros((0, self.dim));
            mat.ids = Vec::new();
            mat.dirty = false;
            return Ok(());
        }

        let mut matrix = Array2::zeros((embedded.len(), self.dim));
        let mut ids = Vec::with_capacity(embedded.len());
        for (i, (id, embedding)) in embedded.iter().enumerate() {
            if embedding.len() != self.dim {
                return Err(Error::Store(format!(
                    "embedding dim {} != store dim {} for {}",
                    embedding.len(),
                    self.dim,
                    id
                )));
            }
            matrix.row_mut(i).assign(*embedding);
            ids.push((*id).clone());
        }

        // Normalize rows so cosine similarity is a dot product.
        for mut row in matrix.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 1e-9 {
                row /= norm;
            }
        }

        debug!("Rebuilt similarity matrix: {} rows", ids.len());
        mat.matrix = matrix;
        mat.ids = ids;
        mat.dirty = false;
        Ok(())
    }

    fn ensure_matrix(&self) -> Result<()> {
        if self.matrix.lock().dirty {
            self.rebuild_matrix()?;
        }
        Ok(())
    }
}

impl VectorStore for InMemoryStore {
    fn add(&self, records: Vec<DocumentRecord>) -> Result<()> {
        let mut map = self.records.write();
        for record in records {
            map.insert(record.id.clone(), record);
        }
        drop(map);
        self.mark_dirty();
        Ok(())
    }

    fn native_upsert(&self) -> bool {
        true
    }

    fn upsert(&self, records: Vec<DocumentRecord>) -> Result<()> {
        // Keyed by id, add already replaces.
        self.add(records)
    }

    fn delete_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        let mut map = self.records.write();
        let removed: Vec<String> = ids
            .iter()
            .filter(|id| map.remove(*id).is_some())
            .cloned()
            .collect();
        drop(map);
        if !removed.is_empty() {
            self.mark_dirty();
        }
        Ok(removed)
    }

    fn delete_where(&self, filter: &MetadataFilter) -> Result<Vec<String>> {
        let mut map = self.records.write();
        let matching: Vec<String> = map
            .iter()
            .filter(|(_, r)| filter.matches(&r.metadata))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &matching {
            map.remove(id);
        }
        drop(map);
        if !matching.is_empty() {
            self.mark_dirty();
        }
        Ok(matching)
    }

    fn search(
        &self,
        query: &Array1<f32>,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredRecord>> {
        self.ensure_matrix()?;

        let mat = self.matrix.lock();
        if mat.matrix.nrows() == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let norm = query.dot(query).sqrt();
        if norm < 1e-9 {
            return Ok(Vec::new());
        }
        let q = query / norm;

        // (N, dim) @ (dim,) → (N,)
        let similarities = mat.matrix.dot(&q);
        let mut ranked: Vec<(usize, f32)> = similarities.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let records = self.records.read();
        let mut results = Vec::with_capacity(k);
        for (row, score) in ranked {
            if results.len() == k {
                break;
            }
            let id = &mat.ids[row];
            let Some(record) = records.get(id) else {
                continue;
            };
            if let Some(f) = filter {
                if !f.matches(&record.metadata) {
                    continue;
                }
            }
            results.push(ScoredRecord {
                id: id.clone(),
                text: record.text.clone(),
                score: score as f64,
                metadata: record.metadata.clone(),
            });
        }
        Ok(results)
    }

    fn get(&self, ids: &[String]) -> Result<Vec<DocumentRecord>> {
        let map = self.records.read();
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, text: &str, embedding: Vec<f32>, path: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.into(),
            text: text.into(),
            embedding: Some(Array1::from_vec(embedding)),
            metadata: json!({"path": path}),
        }
    }

    #[test]
    fn test_add_and_count() {
        let store = InMemoryStore::new(3);
        store
            .add(vec![record("a", "alpha", vec![1.0, 0.0, 0.0], "/f")])
            .unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let store = InMemoryStore::new(3);
        store
            .add(vec![
                record("x", "x", vec![1.0, 0.0, 0.0], "/f"),
                record("y", "y", vec![0.0, 1.0, 0.0], "/f"),
                record("z", "z", vec![0.9, 0.1, 0.0], "/f"),
            ])
            .unwrap();
        let query = Array1::from_vec(vec![1.0, 0.0, 0.0]);
        let results = store.search(&query, 2, None).unwrap();
        assert_eq!(results[0].id, "x");
        assert_eq!(results[1].id, "z");
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_with_filter() {
        let store = InMemoryStore::new(2);
        store
            .add(vec![
                record("a", "a", vec![1.0, 0.0], "/one"),
                record("b", "b", vec![1.0, 0.0], "/two"),
            ])
            .unwrap();
        let query = Array1::from_vec(vec![1.0, 0.0]);
        let filter = MetadataFilter::for_path("/two");
        let results = store.search(&query, 10, Some(&filter)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[test]
    fn test_delete_where_reports_ids() {
        let store = InMemoryStore::new(2);
        store
            .add(vec![
                record("a", "a", vec![1.0, 0.0], "/one"),
                record("b", "b", vec![0.0, 1.0], "/one"),
                record("c", "c", vec![0.0, 1.0], "/two"),
            ])
            .unwrap();
        let mut removed = store.delete_where(&MetadataFilter::for_path("/one")).unwrap();
        removed.sort();
        assert_eq!(removed, vec!["a", "b"]);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let store = InMemoryStore::new(2);
        store
            .add(vec![record("a", "old", vec![1.0, 0.0], "/f")])
            .unwrap();
        store
            .upsert(vec![record("a", "new", vec![0.0, 1.0], "/f")])
            .unwrap();
        assert_eq!(store.count().unwrap(), 1);
        let fetched = store.get(&["a".into()]).unwrap();
        assert_eq!(fetched[0].text, "new");
    }
}
