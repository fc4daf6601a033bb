//! Cross-encoder reranker seam.

use quarry_core::Result;

/// Trait for rerankers scoring (query, passage) pairs.
///
/// Real cross-encoder models live behind this seam; scores are model
/// logits and are only compared against each other.
pub trait Reranker: Send + Sync {
    fn predict(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>>;
}

/// Reranker that scores by query-term coverage of the passage.
///
/// Stand-in for tests; ranks passages containing more query terms higher.
pub struct TermOverlapReranker;

impl Reranker for TermOverlapReranker {
    fn predict(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>> {
        Ok(pairs
            .iter()
            .map(|(query, passage)| {
                let passage_lower = passage.to_lowercase();
                let terms: Vec<String> = query
                    .to_lowercase()
                    .split_whitespace()
                    .map(|t| t.to_string())
                    .collect();
                if terms.is_empty() {
                    return 0.0;
                }
                let matched = terms.iter().filter(|t| passage_lower.contains(*t)).count();
                matched as f32 / terms.len() as f32
            })
            .collect())
    }
}
