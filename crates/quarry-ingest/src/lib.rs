//! Quarry Ingest — discovery, extraction, chunking, quality filtering.

pub mod chunking;
pub mod discovery;
pub mod extract;
pub mod filters;
pub mod sanitize;

pub use chunking::{
    build_chunker, ChunkContext, Chunker, FixedChunker, SentenceChunker, TemplateChunker,
};
pub use discovery::Discovery;
pub use extract::{FileKind, PlainTextExtractor, TextExtractor};
pub use filters::{shannon_entropy, QualityFilter};
pub use sanitize::sanitize;
