//! Per-file ingestion state for incremental indexing.
//!
//! Persisted as JSON: `{ "<abs_path>": {"hash": "<sha1hex>", "mtime": n, "chunks": n} }`.
//! An entry is written only after a file's chunks are fully committed.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use quarry_core::Result;

/// What was committed for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// SHA-1 hex of the file content.
    pub hash: String,
    /// Modification time, epoch seconds.
    pub mtime: i64,
    /// Number of chunks committed.
    pub chunks: usize,
}

/// Map of absolute path → committed file state.
#[derive(Debug, Clone, Default)]
pub struct IngestionState {
    files: HashMap<String, FileState>,
}

impl IngestionState {
    /// Load state from disk. A missing or unreadable file yields an empty
    /// state, which forces a full reindex on the next run.
    pub fn load(path: &Path) -> Self {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Self::default();
            }
            Err(e) => {
                warn!("State file unreadable ({}), starting empty: {}", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_str::<HashMap<String, FileState>>(&json) {
            Ok(files) => {
                debug!("Loaded ingestion state: {} files", files.len());
                Self { files }
            }
            Err(e) => {
                warn!("State file corrupt ({}), starting empty: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Persist to disk via a temp file and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.files)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn is_unchanged(&self, path: &str, hash: &str) -> bool {
        self.files.get(path).is_some_and(|f| f.hash == hash)
    }

    pub fn get(&self, path: &str) -> Option<&FileState> {
        self.files.get(path)
    }

    pub fn record(&mut self, path: String, state: FileState) {
        self.files.insert(path, state);
    }

    pub fn remove(&mut self, path: &str) -> Option<FileState> {
        self.files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileState {
        FileState {
            hash: "da39a3ee5e6b4b0d3255bfef95601890afd80709".into(),
            mtime: 1_700_000_000,
            chunks: 3,
        }
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = IngestionState::default();
        state.record("/docs/a.md".into(), sample());
        state.save(&path).unwrap();

        let loaded = IngestionState::load(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("/docs/a.md"), Some(&sample()));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(IngestionState::load(&dir.path().join("absent.json")).is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "]{ garbage").unwrap();
        assert!(IngestionState::load(&path).is_empty());
    }

    #[test]
    fn test_unchanged_check() {
        let mut state = IngestionState::default();
        state.record("/a".into(), sample());
        assert!(state.is_unchanged("/a", &sample().hash));
        assert!(!state.is_unchanged("/a", "differenthash"));
        assert!(!state.is_unchanged("/b", &sample().hash));
    }
}
