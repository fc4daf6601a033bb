//! Quarry Core — errors, configuration, shared data types.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ChunkConfig, ChunkStrategy, DataPaths, FilterConfig, FusionConfig, FusionMethod,
    IndexingConfig, QuarryConfig, SearchConfig,
};
pub use error::{Error, Result};
pub use types::{
    Chunk, ChunkMetadata, DocumentRecord, EngineStats, IndexReport, QueryHit, SearchResult,
};
