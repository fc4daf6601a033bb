//! Quarry Runtime — the indexing orchestrator and ingestion state.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{content_hash, Indexer};
pub use state::{FileState, IngestionState};
