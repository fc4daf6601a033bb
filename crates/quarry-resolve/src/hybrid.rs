//! Hybrid searcher — fuses BM25 and vector result lists.

use std::collections::HashMap;

use ndarray::Array1;
use tracing::debug;

use quarry_core::{FusionConfig, FusionMethod, Result, SearchResult};
use quarry_index::Bm25Index;
use quarry_infer::Reranker;
use quarry_store::{MetadataFilter, StoreRepository};

/// Which retrieval methods participate in a search.
#[derive(Debug, Clone, Copy)]
pub struct SearchMethods {
    pub vector: bool,
    pub bm25: bool,
}

impl SearchMethods {
    pub fn both() -> Self {
        Self {
            vector: true,
            bm25: true,
        }
    }

    pub fn vector_only() -> Self {
        Self {
            vector: true,
            bm25: false,
        }
    }

    pub fn bm25_only() -> Self {
        Self {
            vector: false,
            bm25: true,
        }
    }
}

/// One source's ranked candidate before fusion.
struct Candidate {
    doc_id: String,
    text: String,
    metadata: serde_json::Value,
    /// Raw score as the source produced it.
    raw: f64,
    /// Score normalized to the fusion scale.
    normalized: f64,
}

/// Fuses oversampled candidate lists from the vector store and the BM25
/// index; optionally re-scores the fused head with a reranker.
pub struct HybridSearcher<'a> {
    repo: &'a StoreRepository,
    bm25: &'a Bm25Index,
    fusion: &'a FusionConfig,
}

impl<'a> HybridSearcher<'a> {
    pub fn new(repo: &'a StoreRepository, bm25: &'a Bm25Index, fusion: &'a FusionConfig) -> Self {
        Self { repo, bm25, fusion }
    }

    pub fn search(
        &self,
        query: &str,
        query_embedding: Option<&Array1<f32>>,
        k: usize,
        methods: SearchMethods,
        filter: Option<&MetadataFilter>,
        reranker: Option<(&dyn Reranker, usize)>,
    ) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let fetch_k = (3 * k).min(100).max(k);

        let vector_candidates = if methods.vector {
            match query_embedding {
                Some(embedding) => self.vector_candidates(embedding, fetch_k, filter)?,
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        let bm25_candidates = if methods.bm25 {
            self.bm25_candidates(query, fetch_k, filter)?
        } else {
            Vec::new()
        };

        debug!(
            "Hybrid candidates: {} vector, {} bm25",
            vector_candidates.len(),
            bm25_candidates.len()
        );

        let mut fused = match (methods.vector, methods.bm25) {
            (true, false) => unfused("vector", vector_candidates),
            (false, true) => unfused("bm25", bm25_candidates),
            _ => self.fuse(vector_candidates, bm25_candidates),
        };

        if let Some((reranker, top_k)) = reranker {
            rerank_head(query, &mut fused, reranker, top_k)?;
        }

        fused.truncate(k);
        Ok(fused)
    }

    fn vector_candidates(
        &self,
        embedding: &Array1<f32>,
        fetch_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Candidate>> {
        let hits = self.repo.search(embedding, fetch_k, filter)?;
        Ok(hits
            .into_iter()
            .map(|hit| Candidate {
                doc_id: hit.id,
                text: hit.text,
                metadata: hit.metadata,
                raw: hit.score,
                normalized: hit.score,
            })
            .collect())
    }

    /// BM25 hits hydrated with store records; raw scores min-max normalized
    /// over the candidate set.
    fn bm25_candidates(
        &self,
        query: &str,
        fetch_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Candidate>> {
        let scored = self.bm25.search(query, fetch_k);
        if scored.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = scored.iter().map(|(id, _)| id.clone()).collect();
        let records: HashMap<String, _> = self
            .repo
            .get(&ids)?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let min = scored.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
        let max = scored
            .iter()
            .map(|(_, s)| *s)
            .fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;

        let mut candidates = Vec::with_capacity(scored.len());
        for (doc_id, raw) in scored {
            let (text, metadata) = match records.get(&doc_id) {
                Some(record) => (record.text.clone(), record.metadata.clone()),
                // Store and BM25 can briefly disagree between a file's two
                // commits; fall back to the indexed text.
                None => match self.bm25.doc_text(&doc_id) {
                    Some(text) => (text.to_string(), serde_json::Value::Null),
                    None => continue,
                },
            };
            if let Some(f) = filter {
                if !f.matches(&metadata) {
                    continue;
                }
            }
            let normalized = if range > 1e-12 { (raw - min) / range } else { 1.0 };
            candidates.push(Candidate {
                doc_id,
                text,
                metadata,
                raw,
                normalized,
            });
        }
        Ok(candidates)
    }

    fn fuse(&self, vector: Vec<Candidate>, bm25: Vec<Candidate>) -> Vec<SearchResult> {
        struct Fused {
            text: String,
            metadata: serde_json::Value,
            score: f64,
            source_scores: HashMap<String, f64>,
        }

        let mut by_id: HashMap<String, Fused> = HashMap::new();

        let absorb = |source: &'static str,
                          candidates: Vec<Candidate>,
                          weight: f64,
                          by_id: &mut HashMap<String, Fused>| {
            for (rank, candidate) in candidates.into_iter().enumerate() {
                let contribution = match self.fusion.method {
                    FusionMethod::Rrf => 1.0 / (self.fusion.rrf_k as f64 + rank as f64 + 1.0),
                    FusionMethod::Weighted => candidate.normalized * weight,
                    FusionMethod::Max => candidate.normalized,
                };
                let entry = by_id.entry(candidate.doc_id).or_insert_with(|| Fused {
                    text: candidate.text,
                    metadata: candidate.metadata,
                    score: match self.fusion.method {
                        FusionMethod::Max => f64::NEG_INFINITY,
                        _ => 0.0,
                    },
                    source_scores: HashMap::new(),
                });
                match self.fusion.method {
                    FusionMethod::Max => entry.score = entry.score.max(contribution),
                    _ => entry.score += contribution,
                }
                entry.source_scores.insert(source.to_string(), candidate.raw);
            }
        };

        absorb("vector", vector, self.fusion.vector_weight, &mut by_id);
        absorb("bm25", bm25, self.fusion.bm25_weight, &mut by_id);

        let mut results: Vec<SearchResult> = by_id
            .into_iter()
            .map(|(doc_id, fused)| SearchResult {
                doc_id,
                text: fused.text,
                score: fused.score,
                metadata: fused.metadata,
                source_scores: fused.source_scores,
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        results
    }
}

/// A single enabled source: its raw ranked list, unfused.
fn unfused(source: &'static str, candidates: Vec<Candidate>) -> Vec<SearchResult> {
    candidates
        .into_iter()
        .map(|c| SearchResult {
            doc_id: c.doc_id,
            text: c.text,
            score: c.raw,
            metadata: c.metadata,
            source_scores: HashMap::from([(source.to_string(), c.raw)]),
        })
        .collect()
}

/// Re-score the top `top_k` candidates in place; their order and scores are
/// replaced, the tail is untouched.
fn rerank_head(
    query: &str,
    results: &mut Vec<SearchResult>,
    reranker: &dyn Reranker,
    top_k: usize,
) -> Result<()> {
    let head = top_k.min(results.len());
    if head == 0 {
        return Ok(());
    }

    let pairs: Vec<(&str, &str)> = results[..head]
        .iter()
        .map(|r| (query, r.text.as_str()))
        .collect();
    let scores = reranker.predict(&pairs)?;

    for (result, score) in results[..head].iter_mut().zip(&scores) {
        result.score = *score as f64;
        result
            .source_scores
            .insert("rerank".to_string(), *score as f64);
    }
    results[..head].sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::DocumentRecord;
    use quarry_store::{build_store, StoreKind};
    use serde_json::json;

    fn repo_with(records: Vec<DocumentRecord>) -> StoreRepository {
        let repo = StoreRepository::new(build_store(StoreKind::InMemory, 2));
        repo.upsert(records).unwrap();
        repo
    }

    fn record(id: &str, text: &str, embedding: [f32; 2]) -> DocumentRecord {
        DocumentRecord {
            id: id.into(),
            text: text.into(),
            embedding: Some(Array1::from_vec(embedding.to_vec())),
            metadata: json!({"path": format!("/{}", id)}),
        }
    }

    fn bm25_with(docs: &[(&str, &str)]) -> Bm25Index {
        let mut index = Bm25Index::default();
        let ids: Vec<String> = docs.iter().map(|(id, _)| id.to_string()).collect();
        let texts: Vec<String> = docs.iter().map(|(_, t)| t.to_string()).collect();
        index.add_documents(&ids, &texts).unwrap();
        index
    }

    #[test]
    fn test_rrf_ranks_docs_in_both_sources_first() {
        // vector ranks [A, B, C]; bm25 ranks [B, A, D]
        let repo = repo_with(vec![
            record("A", "shared topic words", [1.0, 0.0]),
            record("B", "shared topic words too", [0.9, 0.1]),
            record("C", "vector only entry", [0.8, 0.2]),
            record("D", "keyword only entry", [0.0, 1.0]),
        ]);
        let bm25 = bm25_with(&[
            ("B", "fusion fusion fusion"),
            ("A", "fusion fusion"),
            ("D", "fusion"),
        ]);
        let fusion = FusionConfig::default();
        let searcher = HybridSearcher::new(&repo, &bm25, &fusion);

        let query = Array1::from_vec(vec![1.0, 0.0]);
        let results = searcher
            .search("fusion", Some(&query), 4, SearchMethods::both(), None, None)
            .unwrap();

        let top2: Vec<&str> = results[..2].iter().map(|r| r.doc_id.as_str()).collect();
        assert!(top2.contains(&"A") && top2.contains(&"B"));
        for tail in &results[2..] {
            assert!(tail.score < results[1].score);
        }
    }

    #[test]
    fn test_max_fusion_takes_larger_score() {
        let repo = repo_with(vec![record("A", "the only doc", [1.0, 0.0])]);
        // One doc in both sources: vector similarity 0.9, bm25 normalized 1.0
        let bm25 = bm25_with(&[("A", "unique term")]);
        let fusion = FusionConfig {
            method: FusionMethod::Max,
            ..FusionConfig::default()
        };
        let searcher = HybridSearcher::new(&repo, &bm25, &fusion);

        // Embedding at an angle so vector similarity is below 1.0
        let query = Array1::from_vec(vec![0.9f32, (1.0f32 - 0.81).sqrt()]);
        let results = searcher
            .search("unique term", Some(&query), 1, SearchMethods::both(), None, None)
            .unwrap();
        // Sole bm25 candidate normalizes to exactly 1.0, above the vector score
        assert!((results[0].score - 1.0).abs() < 1e-9);
        assert!(results[0].source_scores.contains_key("vector"));
        assert!(results[0].source_scores.contains_key("bm25"));
    }

    #[test]
    fn test_weighted_fusion_combines() {
        let repo = repo_with(vec![record("A", "doc a", [1.0, 0.0])]);
        let bm25 = bm25_with(&[("A", "term")]);
        let fusion = FusionConfig {
            method: FusionMethod::Weighted,
            ..FusionConfig::default()
        };
        let searcher = HybridSearcher::new(&repo, &bm25, &fusion);
        let query = Array1::from_vec(vec![1.0, 0.0]);
        let results = searcher
            .search("term", Some(&query), 1, SearchMethods::both(), None, None)
            .unwrap();
        // 0.7 * 1.0 (vector) + 0.3 * 1.0 (bm25 normalized)
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_method_returns_raw_list() {
        let repo = repo_with(vec![
            record("A", "alpha", [1.0, 0.0]),
            record("B", "beta", [0.0, 1.0]),
        ]);
        let bm25 = bm25_with(&[("A", "alpha content"), ("B", "beta content")]);
        let fusion = FusionConfig::default();
        let searcher = HybridSearcher::new(&repo, &bm25, &fusion);

        let results = searcher
            .search("alpha", None, 5, SearchMethods::bm25_only(), None, None)
            .unwrap();
        assert_eq!(results[0].doc_id, "A");
        assert_eq!(results[0].source_scores.len(), 1);
        // Raw BM25 score, not a normalized or fused value
        assert!(results[0].score > 0.0);
    }

    #[test]
    fn test_rerank_replaces_head_order() {
        let repo = repo_with(vec![
            record("A", "nothing relevant here", [1.0, 0.0]),
            record("B", "exact match for the query text", [0.9, 0.1]),
        ]);
        let bm25 = Bm25Index::default();
        let fusion = FusionConfig::default();
        let searcher = HybridSearcher::new(&repo, &bm25, &fusion);
        let reranker = quarry_infer::TermOverlapReranker;

        let query = Array1::from_vec(vec![1.0, 0.0]);
        let results = searcher
            .search(
                "exact match query",
                Some(&query),
                2,
                SearchMethods::vector_only(),
                None,
                Some((&reranker, 2)),
            )
            .unwrap();
        assert_eq!(results[0].doc_id, "B");
        assert!(results[0].source_scores.contains_key("rerank"));
    }

    #[test]
    fn test_empty_bm25_yields_vector_results() {
        let repo = repo_with(vec![record("A", "alpha", [1.0, 0.0])]);
        let bm25 = Bm25Index::default();
        let fusion = FusionConfig::default();
        let searcher = HybridSearcher::new(&repo, &bm25, &fusion);
        let query = Array1::from_vec(vec![1.0, 0.0]);
        let results = searcher
            .search("anything", Some(&query), 3, SearchMethods::both(), None, None)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_id, "A");
    }
}
