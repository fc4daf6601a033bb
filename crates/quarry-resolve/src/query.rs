//! Query engine — embeds once, picks the retrieval path, shapes output.

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::Array1;
use parking_lot::RwLock;
use tracing::debug;

use crate::hybrid::{HybridSearcher, SearchMethods};
use quarry_core::{Error, QueryHit, Result, SearchConfig, SearchResult};
use quarry_index::Bm25Index;
use quarry_infer::{Embedder, FuzzyScorer, Reranker};
use quarry_store::{MetadataFilter, StoreRepository};

/// Vector/fuzzy mixing weights for the no-BM25 fallback path.
const FALLBACK_VECTOR_WEIGHT: f64 = 0.7;
const FALLBACK_FUZZY_WEIGHT: f64 = 0.3;

/// Read-side orchestrator over the shared indices.
pub struct QueryEngine {
    repo: StoreRepository,
    bm25: Arc<RwLock<Bm25Index>>,
    embedder: Arc<dyn Embedder>,
    fuzzy: Arc<dyn FuzzyScorer>,
    reranker: Option<Arc<dyn Reranker>>,
    config: SearchConfig,
}

impl QueryEngine {
    pub fn new(
        repo: StoreRepository,
        bm25: Arc<RwLock<Bm25Index>>,
        embedder: Arc<dyn Embedder>,
        fuzzy: Arc<dyn FuzzyScorer>,
        reranker: Option<Arc<dyn Reranker>>,
        config: SearchConfig,
    ) -> Self {
        Self {
            repo,
            bm25,
            embedder,
            fuzzy,
            reranker,
            config,
        }
    }

    /// Search the index. Hybrid when the BM25 index has content, otherwise
    /// vector search boosted by fuzzy partial matching against previews.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>> {
        let bm25 = self.bm25.read();
        if bm25.is_empty() && self.repo.count()? == 0 {
            return Err(Error::MissingIndex(
                "no documents indexed; run indexing first".into(),
            ));
        }

        let embedding = if self.embedder.is_available() {
            Some(
                self.embedder
                    .encode(&[query])?
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::Embedding("embedder returned no vector".into()))?,
            )
        } else {
            None
        };

        let results = if !bm25.is_empty() {
            let methods = if embedding.is_some() {
                SearchMethods::both()
            } else {
                SearchMethods::bm25_only()
            };
            let searcher = HybridSearcher::new(&self.repo, &bm25, &self.config.fusion);
            let rerank = self
                .reranker
                .as_deref()
                .zip(self.config.rerank_top_k)
                .map(|(r, top_k)| (r, top_k));
            searcher.search(query, embedding.as_ref(), k, methods, filter, rerank)?
        } else {
            let embedding = embedding.ok_or_else(|| {
                Error::MissingIndex("BM25 index empty and no embedder available".into())
            })?;
            self.vector_fallback(query, &embedding, k, filter)?
        };

        Ok(results.into_iter().map(|r| self.to_hit(r)).collect())
    }

    /// Vector-only path: oversample 2×, boost with fuzzy partial-match
    /// scores against a text preview, re-sort, truncate.
    fn vector_fallback(
        &self,
        query: &str,
        embedding: &Array1<f32>,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        let hits = self.repo.search(embedding, 2 * k, filter)?;
        debug!("Vector fallback: {} candidates for k={}", hits.len(), k);

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .map(|hit| {
                let preview = preview_of(&hit.text, self.config.preview_chars);
                let fuzzy = self.fuzzy.partial_ratio(query, &preview) / 100.0;
                let score = FALLBACK_VECTOR_WEIGHT * hit.score + FALLBACK_FUZZY_WEIGHT * fuzzy;
                SearchResult {
                    doc_id: hit.id,
                    text: hit.text,
                    score,
                    metadata: hit.metadata,
                    source_scores: HashMap::from([
                        ("vector".to_string(), hit.score),
                        ("fuzzy".to_string(), fuzzy),
                    ]),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        results.truncate(k);
        Ok(results)
    }

    fn to_hit(&self, result: SearchResult) -> QueryHit {
        let path = result
            .metadata
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let filename = result
            .metadata
            .get("filename")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                std::path::Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

        QueryHit {
            path,
            filename,
            score: round4(result.score),
            preview: preview_of(&result.text, self.config.preview_chars),
            metadata: result.metadata,
            source_scores: Some(result.source_scores),
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn preview_of(text: &str, max_chars: usize) -> String {
    let mut preview: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        preview.push('…');
    }
    preview
}
