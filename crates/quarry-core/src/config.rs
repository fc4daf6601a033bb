//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths to all Quarry data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Per-file ingestion state (`data/.ingest-state.json`).
    pub state_file: PathBuf,
    /// BM25 index snapshot (`data/bm25-index.json`).
    pub bm25_snapshot: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            state_file: root.join(".ingest-state.json"),
            bm25_snapshot: root.join("bm25-index.json"),
            root,
        })
    }
}

/// Chunking strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Sliding character window.
    Fixed,
    /// Sentence-boundary accumulation.
    Sentence,
    /// Structure-aware: markdown headers, code definitions, prose paragraphs.
    Template,
}

impl ChunkStrategy {
    /// Tag recorded in chunk and document metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Sentence => "sentence",
            Self::Template => "template",
        }
    }
}

/// Chunker parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub strategy: ChunkStrategy,
    /// Target chunk size in characters.
    pub size: usize,
    /// Overlap carried between consecutive chunks, in characters.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Template,
            size: 512,
            overlap: 100,
        }
    }
}

/// Quality filter parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum trimmed length for a chunk to survive.
    pub min_chars: usize,
    /// Minimum Shannon entropy over character frequencies; None disables.
    pub min_entropy: Option<f64>,
    /// Strip control characters (keeps `\n` and `\t`).
    pub strip_control: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_chars: 20,
            min_entropy: Some(1.5),
            strip_control: true,
        }
    }
}

/// Indexing pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Extensions (without dot) eligible for indexing.
    pub allowed_extensions: Vec<String>,
    /// Directory names pruned from traversal entirely.
    pub excluded_dirs: Vec<String>,
    /// Include globs relative to the root; non-empty means a file must match one.
    pub include_globs: Vec<String>,
    /// Exclude globs relative to the root.
    pub exclude_globs: Vec<String>,
    /// Files larger than this many bytes are skipped.
    pub max_file_bytes: u64,
    /// Per-run error ceiling; reaching it abandons remaining files.
    pub max_errors: usize,
    /// Worker pool size.
    pub workers: usize,
    pub chunk: ChunkConfig,
    pub filter: FilterConfig,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: [
                "txt", "md", "mdx", "markdown", "rst", "py", "rs", "js", "ts", "tsx", "jsx",
                "go", "java", "c", "cpp", "h", "rb", "sh", "toml", "yaml", "yml", "json",
                "html", "css", "sql",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            excluded_dirs: [
                ".git",
                ".hg",
                ".svn",
                "node_modules",
                "target",
                "__pycache__",
                ".venv",
                "venv",
                "dist",
                "build",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            include_globs: Vec::new(),
            exclude_globs: Vec::new(),
            max_file_bytes: 10 * 1024 * 1024,
            max_errors: 25,
            workers: default_workers(),
            chunk: ChunkConfig::default(),
            filter: FilterConfig::default(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Rank fusion method for hybrid search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    /// Reciprocal Rank Fusion.
    Rrf,
    /// Weighted sum of normalized per-source scores.
    Weighted,
    /// Max over per-source scores.
    Max,
}

/// Fusion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    pub method: FusionMethod,
    /// RRF rank constant.
    pub rrf_k: usize,
    pub vector_weight: f64,
    pub bm25_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            method: FusionMethod::Rrf,
            rrf_k: 60,
            vector_weight: 0.7,
            bm25_weight: 0.3,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default result count.
    pub k: usize,
    pub fusion: FusionConfig,
    /// Re-score this many fused candidates with the reranker; None disables.
    pub rerank_top_k: Option<usize>,
    /// Preview length in characters for query output.
    pub preview_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            k: 10,
            fusion: FusionConfig::default(),
            rerank_top_k: None,
            preview_chars: 200,
        }
    }
}

/// Top-level Quarry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarryConfig {
    pub data: DataPaths,
    pub indexing: IndexingConfig,
    pub search: SearchConfig,
    /// Embedding dimension the vector store is sized for.
    pub embedding_dim: usize,
}

impl QuarryConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut indexing = IndexingConfig::default();
        if let Some(workers) = std::env::var("QUARRY_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            indexing.workers = workers;
        }
        if let Some(max_errors) = std::env::var("QUARRY_MAX_ERRORS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            indexing.max_errors = max_errors;
        }

        Ok(Self {
            data: DataPaths::new(data_dir)?,
            indexing,
            search: SearchConfig::default(),
            embedding_dim: 384,
        })
    }
}
