//! Store-level types: scored results and metadata filters.

use serde::Serialize;

/// A ranked record returned by a vector store search. `score` is cosine
/// similarity (1 − cosine distance) for normalized vectors.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    pub id: String,
    pub text: String,
    pub score: f64,
    pub metadata: serde_json::Value,
}

/// Equality filter over record metadata keys.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    equals: Vec<(String, serde_json::Value)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.equals.push((key.into(), value.into()));
        self
    }

    /// Filter matching every chunk of one source file.
    pub fn for_path(path: &str) -> Self {
        Self::new().with("path", path)
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    pub fn matches(&self, metadata: &serde_json::Value) -> bool {
        self.equals
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_all_keys() {
        let filter = MetadataFilter::new().with("path", "/a.md").with("strategy", "fixed");
        assert!(filter.matches(&json!({"path": "/a.md", "strategy": "fixed", "extra": 1})));
        assert!(!filter.matches(&json!({"path": "/a.md", "strategy": "sentence"})));
        assert!(!filter.matches(&json!({"strategy": "fixed"})));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(MetadataFilter::new().matches(&json!({})));
    }
}
