//! Quarry Infer — provider seams for external models.

pub mod embedder;
pub mod fuzzy;
pub mod rerank;

pub use embedder::{Embedder, HashingEmbedder, NoopEmbedder};
pub use fuzzy::{FuzzyScorer, WindowFuzzy};
pub use rerank::{Reranker, TermOverlapReranker};
