//! Quarry Index — from-scratch BM25 inverted index.

pub mod bm25;

pub use bm25::{tokenize, Bm25Index, DEFAULT_B, DEFAULT_K1};
