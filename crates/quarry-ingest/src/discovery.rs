//! File discovery — filtered traversal under a root directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use quarry_core::{Error, IndexingConfig, Result};

/// Enumerates candidate files under a root.
///
/// A file is excluded when any ancestor directory name matches the excluded
/// set, its extension is not allowed, it matches none of the include globs
/// (when those are non-empty), or it matches any exclude glob. Traversal
/// order is whatever the filesystem yields.
pub struct Discovery {
    root: PathBuf,
    allowed_extensions: HashSet<String>,
    excluded_dirs: HashSet<String>,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl Discovery {
    pub fn new(root: impl AsRef<Path>, cfg: &IndexingConfig) -> Result<Self> {
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            allowed_extensions: cfg
                .allowed_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            excluded_dirs: cfg.excluded_dirs.iter().cloned().collect(),
            include: build_globset(&cfg.include_globs)?,
            exclude: build_globset(&cfg.exclude_globs)?,
        })
    }

    /// Lazy, finite, restartable sequence of candidate files.
    pub fn files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                // Pruning the directory here excludes every descendant.
                if entry.depth() > 0 && entry.file_type().is_dir() {
                    let name = entry.file_name().to_string_lossy();
                    if self.excluded_dirs.contains(name.as_ref()) {
                        debug!("Pruning excluded directory: {}", entry.path().display());
                        return false;
                    }
                }
                true
            })
            .filter_map(|res| res.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(move |path| self.accepts(path))
    }

    fn accepts(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !self.allowed_extensions.contains(&ext) {
            return false;
        }

        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if let Some(include) = &self.include {
            if !include.is_match(relative) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(relative) {
                return false;
            }
        }
        true
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern)
                .map_err(|e| Error::Config(format!("bad glob {:?}: {}", pattern, e)))?,
        );
    }
    let set = builder
        .build()
        .map_err(|e| Error::Config(format!("glob set: {}", e)))?;
    Ok(Some(set))
}
