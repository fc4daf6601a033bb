//! Quarry Store — pluggable vector store with an idempotent repository.

pub mod memory;
pub mod repository;
pub mod store;
pub mod types;

pub use memory::InMemoryStore;
pub use repository::StoreRepository;
pub use store::{build_store, StoreKind, VectorStore};
pub use types::{MetadataFilter, ScoredRecord};
