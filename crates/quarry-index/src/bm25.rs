//! Okapi BM25 over an in-memory inverted index.
//!
//! Postings are keyed by stable opaque document ids, so removal is a plain
//! retain with no positional renumbering. Snapshots serialize the full
//! index; a loaded index reproduces identical search results.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use quarry_core::{Error, Result};

/// Default term-frequency saturation.
pub const DEFAULT_K1: f64 = 1.5;
/// Default length normalization.
pub const DEFAULT_B: f64 = 0.75;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have",
        "in", "is", "it", "its", "not", "of", "on", "or", "that", "the", "this", "to", "was",
        "were", "will", "with",
    ]
    .into_iter()
    .collect()
});

/// Lowercase word tokens, stopwords and single characters dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| t.chars().count() > 1 && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocEntry {
    text: String,
    length: usize,
}

/// In-memory BM25 index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Index {
    k1: f64,
    b: f64,
    /// Insertion order, kept for stable snapshots and stats.
    doc_order: Vec<String>,
    docs: HashMap<String, DocEntry>,
    /// term → doc id → term frequency.
    postings: HashMap<String, HashMap<String, u32>>,
    avg_doc_length: f64,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new(DEFAULT_K1, DEFAULT_B)
    }
}

impl Bm25Index {
    pub fn new(k1: f64, b: f64) -> Self {
        Self {
            k1,
            b,
            doc_order: Vec::new(),
            docs: HashMap::new(),
            postings: HashMap::new(),
            avg_doc_length: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.docs.contains_key(doc_id)
    }

    /// Stored text of a document, if present.
    pub fn doc_text(&self, doc_id: &str) -> Option<&str> {
        self.docs.get(doc_id).map(|d| d.text.as_str())
    }

    /// Distinct term count, for status surfaces.
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Add a batch of documents. Re-adding an existing id replaces the
    /// previous version; live ids stay unique.
    pub fn add_documents(&mut self, ids: &[String], texts: &[String]) -> Result<()> {
        if ids.len() != texts.len() {
            return Err(Error::Index(format!(
                "ids/texts length mismatch: {} vs {}",
                ids.len(),
                texts.len()
            )));
        }

        for (id, text) in ids.iter().zip(texts) {
            if self.docs.contains_key(id) {
                self.remove_entry(id);
            }

            let tokens = tokenize(text);
            let mut frequencies: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *frequencies.entry(token.clone()).or_insert(0) += 1;
            }

            for (term, tf) in frequencies {
                self.postings
                    .entry(term)
                    .or_default()
                    .insert(id.clone(), tf);
            }

            self.docs.insert(
                id.clone(),
                DocEntry {
                    text: text.clone(),
                    length: tokens.len(),
                },
            );
            self.doc_order.push(id.clone());
        }

        self.recompute_avg();
        Ok(())
    }

    /// Remove a document and all of its postings. Returns whether it existed.
    pub fn remove_document(&mut self, doc_id: &str) -> bool {
        if !self.docs.contains_key(doc_id) {
            return false;
        }
        self.remove_entry(doc_id);
        self.recompute_avg();
        true
    }

    fn remove_entry(&mut self, doc_id: &str) {
        self.docs.remove(doc_id);
        self.doc_order.retain(|id| id != doc_id);
        self.postings.retain(|_, docs| {
            docs.remove(doc_id);
            !docs.is_empty()
        });
    }

    fn recompute_avg(&mut self) {
        self.avg_doc_length = if self.docs.is_empty() {
            0.0
        } else {
            self.docs.values().map(|d| d.length as f64).sum::<f64>() / self.docs.len() as f64
        };
    }

    /// Top-k documents by BM25 score, descending. Empty or all-stopword
    /// queries return an empty list.
    pub fn search(&self, query: &str, k: usize) -> Vec<(String, f64)> {
        let terms = tokenize(query);
        if terms.is_empty() || self.docs.is_empty() || k == 0 {
            return Vec::new();
        }

        let n = self.docs.len() as f64;
        let mut scores: HashMap<&str, f64> = HashMap::new();

        for term in &terms {
            let Some(docs) = self.postings.get(term) else {
                continue;
            };
            let df = docs.len() as f64;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for (doc_id, &tf) in docs {
                let length = self.docs[doc_id].length as f64;
                let tf = tf as f64;
                let denom =
                    tf + self.k1 * (1.0 - self.b + self.b * length / self.avg_doc_length);
                *scores.entry(doc_id.as_str()).or_insert(0.0) +=
                    idf * tf * (self.k1 + 1.0) / denom;
            }
        }

        let mut ranked: Vec<(String, f64)> = scores
            .into_iter()
            .map(|(id, score)| (id.to_string(), score))
            .collect();
        // Ties broken by id so results are deterministic.
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
    }

    // ---------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------

    /// Serialize the full index to a JSON snapshot.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        debug!("Saved BM25 snapshot: {} docs, {}", self.len(), path.display());
        Ok(())
    }

    /// Load a snapshot written by `save`.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let index: Self = serde_json::from_str(&json)?;
        Ok(index)
    }

    /// Load a snapshot, falling back to an empty index when the file is
    /// missing or corrupt. Corruption forces a full reindex later, never a
    /// startup failure.
    pub fn load_or_default(path: &Path, k1: f64, b: f64) -> Self {
        match Self::load(path) {
            Ok(index) => index,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::new(k1, b),
            Err(e) => {
                warn!("BM25 snapshot unreadable ({}), starting empty: {}", path.display(), e);
                Self::new(k1, b)
            }
        }
    }
}
