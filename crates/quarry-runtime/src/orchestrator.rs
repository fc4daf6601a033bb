//! Indexing orchestrator — bounded workers feeding a single committer task.
//!
//! Workers read, extract, chunk, filter, and embed independent files with no
//! shared mutable state, then send the finished chunk set over a channel. One
//! committer task owns every index mutation, so no two files' commits
//! interleave. The store is written before BM25 and the state entry last; a
//! crash between the two index writes leaves that one file inconsistent
//! until its next reindex, which the missing state entry forces.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use parking_lot::{Mutex, RwLock};
use sha1::{Digest, Sha1};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::{FileState, IngestionState};
use quarry_core::{
    DocumentRecord, EngineStats, Error, IndexReport, QuarryConfig, Result,
};
use quarry_index::Bm25Index;
use quarry_infer::Embedder;
use quarry_ingest::{build_chunker, ChunkContext, Chunker, Discovery, QualityFilter, TextExtractor};
use quarry_store::StoreRepository;

/// Compute the SHA-1 content hash as lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// A fully prepared file waiting for its serialized commit.
struct CommitMsg {
    path: String,
    hash: String,
    mtime: i64,
    records: Vec<DocumentRecord>,
    filtered: usize,
}

/// Drives discovery → extraction → chunking → filtering → embedding →
/// commit, tracking per-file state for incremental runs. Owns all writes to
/// the BM25 index and the vector store; query paths hold read access only.
pub struct Indexer {
    config: QuarryConfig,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    repo: StoreRepository,
    bm25: Arc<RwLock<Bm25Index>>,
}

impl Indexer {
    pub fn new(
        config: QuarryConfig,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn Embedder>,
        repo: StoreRepository,
        bm25: Arc<RwLock<Bm25Index>>,
    ) -> Self {
        Self {
            config,
            extractor,
            embedder,
            repo,
            bm25,
        }
    }

    /// Index every candidate file under `root`. With `force`, unchanged
    /// files are reprocessed instead of skipped.
    ///
    /// Per-file errors accumulate in the report; reaching the configured
    /// ceiling abandons the remaining files while keeping everything already
    /// committed.
    pub async fn index(&self, root: &Path, force: bool) -> Result<IndexReport> {
        let discovery = Discovery::new(root, &self.config.indexing)?;
        let files: Vec<PathBuf> = discovery.files().collect();
        info!(
            "Discovered {} candidate files under {}",
            files.len(),
            root.display()
        );

        let state = Arc::new(RwLock::new(IngestionState::load(
            &self.config.data.state_file,
        )));
        let report = Arc::new(Mutex::new(IndexReport::default()));
        let error_count = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(Mutex::new(files.into_iter()));
        let workers = self.config.indexing.workers.max(1);
        let max_errors = self.config.indexing.max_errors.max(1);

        let (tx, mut rx) = mpsc::channel::<CommitMsg>(workers * 2);

        // Single committer: owns all BM25/store/state mutation.
        let committer = {
            let repo = self.repo.clone();
            let bm25 = self.bm25.clone();
            let state = state.clone();
            let report = report.clone();
            let error_count = error_count.clone();
            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    let chunk_count = msg.records.len();
                    let filtered = msg.filtered;
                    match commit_file(&repo, &bm25, msg) {
                        Ok((path, file_state)) => {
                            let mut r = report.lock();
                            r.files_processed += 1;
                            r.chunks_created += chunk_count;
                            r.chunks_filtered += filtered;
                            drop(r);
                            debug!("Committed {} ({} chunks)", path, chunk_count);
                            state.write().record(path, file_state);
                        }
                        Err((path, e)) => {
                            error_count.fetch_add(1, Ordering::SeqCst);
                            let mut r = report.lock();
                            r.errors += 1;
                            r.error_details.push(format!("{}: {}", path, e));
                        }
                    }
                }
            })
        };

        let shared = Arc::new(WorkerShared {
            extractor: self.extractor.clone(),
            embedder: self.embedder.clone(),
            chunker: Arc::from(build_chunker(&self.config.indexing.chunk)),
            filter: QualityFilter::new(self.config.indexing.filter.clone()),
            strategy: self.config.indexing.chunk.strategy.as_str(),
            max_file_bytes: self.config.indexing.max_file_bytes,
            state: state.clone(),
            report: report.clone(),
            force,
        });

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let shared = shared.clone();
            let queue = queue.clone();
            let error_count = error_count.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    if error_count.load(Ordering::SeqCst) >= max_errors {
                        break;
                    }
                    let next = queue.lock().next();
                    let Some(path) = next else {
                        break;
                    };
                    match shared.process_file(&path) {
                        Ok(Some(msg)) => {
                            if tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let reached = error_count.fetch_add(1, Ordering::SeqCst) + 1;
                            let mut r = shared.report.lock();
                            r.errors += 1;
                            r.error_details.push(format!("{}: {}", path.display(), e));
                            drop(r);
                            if reached >= max_errors {
                                warn!(
                                    "Error ceiling reached ({}); abandoning remaining files",
                                    reached
                                );
                                break;
                            }
                        }
                    }
                }
            }));
        }
        drop(tx);

        for handle in handles {
            let _ = handle.await;
        }
        let _ = committer.await;

        // Files left unvisited after the error ceiling count as skipped.
        let abandoned = queue.lock().by_ref().count();
        {
            let mut r = report.lock();
            r.files_skipped += abandoned;
        }

        state.read().save(&self.config.data.state_file)?;
        self.bm25.read().save(&self.config.data.bm25_snapshot)?;

        let report = report.lock().clone();
        info!(
            "Indexing finished: {} processed, {} skipped, {} chunks, {} errors",
            report.files_processed, report.files_skipped, report.chunks_created, report.errors
        );
        Ok(report)
    }

    /// Counters for status surfaces.
    pub fn stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            bm25_documents: self.bm25.read().len(),
            store_records: self.repo.count()?,
            tracked_files: IngestionState::load(&self.config.data.state_file).len(),
        })
    }
}

/// Read-only collaborators shared by all workers.
struct WorkerShared {
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    chunker: Arc<dyn Chunker>,
    filter: QualityFilter,
    strategy: &'static str,
    max_file_bytes: u64,
    state: Arc<RwLock<IngestionState>>,
    report: Arc<Mutex<IndexReport>>,
    force: bool,
}

impl WorkerShared {
    /// Prepare one file. Returns `None` when the file was skipped, the
    /// commit message otherwise.
    fn process_file(&self, path: &Path) -> Result<Option<CommitMsg>> {
        let meta = std::fs::metadata(path)?;
        if meta.len() > self.max_file_bytes {
            let mut r = self.report.lock();
            r.files_skipped += 1;
            r.skipped_large.push(path.to_path_buf());
            return Ok(None);
        }

        let abs = std::fs::canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf())
            .to_string_lossy()
            .into_owned();
        let bytes = std::fs::read(path)?;
        let hash = content_hash(&bytes);

        if !self.force && self.state.read().is_unchanged(&abs, &hash) {
            let mut r = self.report.lock();
            r.files_skipped += 1;
            r.skipped_unchanged.push(path.to_path_buf());
            return Ok(None);
        }

        let text = self.extractor.extract(path)?;
        let extension = path.extension().and_then(|e| e.to_str());
        let ctx = extension.map(ChunkContext::for_extension).unwrap_or_default();
        let chunks = self.chunker.chunk(&text, &ctx);
        let (kept, filtered) = self.filter.apply(chunks);

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let embeddings: Vec<Option<ndarray::Array1<f32>>> = if !kept.is_empty()
            && self.embedder.is_available()
        {
            let texts: Vec<&str> = kept.iter().map(|c| c.text.as_str()).collect();
            self.embedder
                .encode(&texts)?
                .into_iter()
                .map(Some)
                .collect()
        } else {
            vec![None; kept.len()]
        };

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let records: Vec<DocumentRecord> = kept
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (chunk, embedding))| {
                let mut metadata = match serde_json::to_value(&chunk.metadata) {
                    Ok(serde_json::Value::Object(map)) => map,
                    _ => serde_json::Map::new(),
                };
                metadata.insert("path".into(), abs.clone().into());
                metadata.insert("filename".into(), filename.clone().into());
                metadata.insert("start".into(), chunk.start.into());
                metadata.insert("end".into(), chunk.end.into());
                metadata.insert("chunk_index".into(), chunk_index.into());
                metadata.insert("mtime".into(), mtime.into());
                if !metadata.contains_key("strategy") {
                    metadata.insert("strategy".into(), self.strategy.into());
                }
                DocumentRecord {
                    id: DocumentRecord::make_id(&abs, chunk.start, chunk.end),
                    text: chunk.text,
                    embedding,
                    metadata: serde_json::Value::Object(metadata),
                }
            })
            .collect();

        Ok(Some(CommitMsg {
            path: abs,
            hash,
            mtime,
            records,
            filtered,
        }))
    }
}

/// Commit one file: replace its store records, mirror the change into BM25.
/// Returns the state entry to record on success.
fn commit_file(
    repo: &StoreRepository,
    bm25: &Arc<RwLock<Bm25Index>>,
    msg: CommitMsg,
) -> std::result::Result<(String, FileState), (String, Error)> {
    let ids: Vec<String> = msg.records.iter().map(|r| r.id.clone()).collect();
    let texts: Vec<String> = msg.records.iter().map(|r| r.text.clone()).collect();
    let chunks = msg.records.len();

    let removed = repo
        .replace_path(&msg.path, msg.records)
        .map_err(|e| (msg.path.clone(), e))?;

    let mut index = bm25.write();
    for id in &removed {
        index.remove_document(id);
    }
    index
        .add_documents(&ids, &texts)
        .map_err(|e| (msg.path.clone(), e))?;
    drop(index);

    Ok((
        msg.path,
        FileState {
            hash: msg.hash,
            mtime: msg.mtime,
            chunks,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_sha1_hex() {
        assert_eq!(
            content_hash(b"hello"),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
        assert_eq!(content_hash(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }
}
