//! Embedding provider trait and implementations.
//!
//! The `Embedder` trait abstracts over embedding generation. Real models
//! (ONNX, remote APIs) live behind this seam; the crate ships:
//! - `NoopEmbedder`: signals no embeddings available (BM25-only fallback)
//! - `HashingEmbedder`: deterministic token-hash vectors for tests and
//!   offline smoke runs

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use ndarray::Array1;
use quarry_core::{Error, Result};

/// Trait for embedding providers. Vectors are L2-normalized.
pub trait Embedder: Send + Sync {
    /// Encode a batch of texts into normalized vectors.
    fn encode(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>>;

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Whether the provider can serve embeddings (model loaded).
    fn is_available(&self) -> bool;
}

/// Placeholder embedder that is never available (BM25-only mode).
pub struct NoopEmbedder {
    dim: usize,
}

impl NoopEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Embedder for NoopEmbedder {
    fn encode(&self, _texts: &[&str]) -> Result<Vec<Array1<f32>>> {
        Err(Error::Embedding("no embedding model loaded".into()))
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Deterministic embedder that hashes word tokens into buckets.
///
/// Texts sharing vocabulary land close together in cosine space, which is
/// enough for pipeline tests without a model.
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, text: &str) -> Array1<f32> {
        let mut counts = vec![0.0f32; self.dim];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dim as u64) as usize;
            counts[bucket] += 1.0;
        }

        let mut vec = Array1::from_vec(counts);
        let norm = vec.dot(&vec).sqrt();
        if norm > 1e-9 {
            vec /= norm;
        }
        vec
    }
}

impl Embedder for HashingEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_unavailable() {
        let e = NoopEmbedder::new(384);
        assert!(!e.is_available());
        assert!(e.encode(&["hello"]).is_err());
    }

    #[test]
    fn test_hashing_deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let a = e.encode(&["rust systems programming"]).unwrap();
        let b = e.encode(&["rust systems programming"]).unwrap();
        assert_eq!(a[0], b[0]);
        let norm = a[0].dot(&a[0]).sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_similarity_orders_topics() {
        let e = HashingEmbedder::new(128);
        let vecs = e
            .encode(&[
                "rust borrow checker ownership",
                "rust ownership model explained",
                "gardening tomatoes in spring",
            ])
            .unwrap();
        let close = vecs[0].dot(&vecs[1]);
        let far = vecs[0].dot(&vecs[2]);
        assert!(close > far);
    }
}
