//! Data types for chunks, indexed documents, and search results.

use std::collections::HashMap;
use std::path::PathBuf;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// A contiguous span of a source text, produced during indexing.
///
/// Ephemeral: never persisted as its own record. Its content flows into
/// the vector store and the BM25 index.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// Char offset of the span start in the sanitized source text.
    pub start: usize,
    /// Char offset one past the span end.
    pub end: usize,
    pub metadata: ChunkMetadata,
}

/// Strategy tags attached to a chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Which strategy produced the chunk ("fixed", "sentence", "template").
    pub strategy: String,
    /// Template classification ("markdown", "code", "prose").
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Nearest ancestor markdown header, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// True when an oversized span was split by the fixed strategy.
    #[serde(default, skip_serializing_if = "is_false")]
    pub split: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Chunk {
    pub fn new(text: impl Into<String>, start: usize, end: usize, strategy: &str) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            metadata: ChunkMetadata {
                strategy: strategy.to_string(),
                ..Default::default()
            },
        }
    }
}

/// A document as committed to the vector store.
///
/// `id` is derived deterministically as `path:start-end`; no two live
/// documents share an id.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub text: String,
    pub embedding: Option<Array1<f32>>,
    pub metadata: serde_json::Value,
}

impl DocumentRecord {
    /// Derive the deterministic document id for a chunk of a file.
    pub fn make_id(path: &str, start: usize, end: usize) -> String {
        format!("{}:{}-{}", path, start, end)
    }
}

/// Intermediate search result with per-source score attribution.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub doc_id: String,
    pub text: String,
    pub score: f64,
    pub metadata: serde_json::Value,
    /// Raw contribution of each retrieval method, e.g. {"vector": 0.82, "bm25": 0.41}.
    pub source_scores: HashMap<String, f64>,
}

/// Normalized query output: one hit per matching chunk.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub path: String,
    pub filename: String,
    /// Fused score rounded to four decimal places.
    pub score: f64,
    pub preview: String,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_scores: Option<HashMap<String, f64>>,
}

/// Aggregate result of an indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub chunks_created: usize,
    pub chunks_filtered: usize,
    pub errors: usize,
    pub error_details: Vec<String>,
    pub skipped_large: Vec<PathBuf>,
    pub skipped_unchanged: Vec<PathBuf>,
}

/// Engine-level counters for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Documents live in the BM25 index.
    pub bm25_documents: usize,
    /// Records live in the vector store.
    pub store_records: usize,
    /// Files tracked in the ingestion state.
    pub tracked_files: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_id() {
        assert_eq!(
            DocumentRecord::make_id("/tmp/a.md", 0, 512),
            "/tmp/a.md:0-512"
        );
    }

    #[test]
    fn test_chunk_metadata_serialization() {
        let meta = ChunkMetadata {
            strategy: "template".into(),
            kind: Some("markdown".into()),
            header: Some("# Intro".into()),
            split: false,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "markdown");
        assert!(json.get("split").is_none());
    }
}
