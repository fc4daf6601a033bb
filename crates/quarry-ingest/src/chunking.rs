//! Chunking strategies: fixed window, sentence accumulation, structure-aware template.
//!
//! All strategies sanitize first and report char offsets into the sanitized
//! text. Default chunk size 512 chars aligned with all-MiniLM-class models
//! (256 tokens ≈ 512 chars).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::sanitize::sanitize;
use quarry_core::{Chunk, ChunkConfig, ChunkStrategy};

/// Per-file context passed to chunkers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkContext<'a> {
    /// File extension without dot, used by template classification.
    pub extension: Option<&'a str>,
}

impl<'a> ChunkContext<'a> {
    pub fn for_extension(extension: &'a str) -> Self {
        Self {
            extension: Some(extension),
        }
    }
}

/// A chunking strategy. Pure function of its input: each call restarts
/// from scratch and yields a finite chunk list.
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str, ctx: &ChunkContext<'_>) -> Vec<Chunk>;
}

/// Construct the chunker selected by the config.
pub fn build_chunker(cfg: &ChunkConfig) -> Box<dyn Chunker> {
    match cfg.strategy {
        ChunkStrategy::Fixed => Box::new(FixedChunker::new(cfg.size, cfg.overlap)),
        ChunkStrategy::Sentence => Box::new(SentenceChunker::new(cfg.size, cfg.overlap)),
        ChunkStrategy::Template => Box::new(TemplateChunker::new(cfg.size, cfg.overlap)),
    }
}

// ---------------------------------------------------------------
// Fixed
// ---------------------------------------------------------------

/// Sliding character window of `size` with `overlap`.
pub struct FixedChunker {
    size: usize,
    overlap: usize,
}

impl FixedChunker {
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size - 1),
        }
    }

    /// Window over a char slice, offsets reported relative to `base`.
    fn chunk_chars(&self, chars: &[char], base: usize, strategy: &str, split: bool) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        if chars.is_empty() {
            return chunks;
        }
        let mut start = 0;
        loop {
            let end = (start + self.size).min(chars.len());
            let mut chunk = Chunk::new(
                chars[start..end].iter().collect::<String>(),
                base + start,
                base + end,
                strategy,
            );
            chunk.metadata.split = split;
            chunks.push(chunk);
            if end == chars.len() {
                break;
            }
            start = end - self.overlap;
        }
        chunks
    }
}

impl Chunker for FixedChunker {
    fn chunk(&self, text: &str, _ctx: &ChunkContext<'_>) -> Vec<Chunk> {
        let text = sanitize(text);
        if text.trim().is_empty() {
            return Vec::new();
        }
        let chars: Vec<char> = text.chars().collect();
        self.chunk_chars(&chars, 0, "fixed", false)
    }
}

// ---------------------------------------------------------------
// Sentence
// ---------------------------------------------------------------

/// Accumulates whole sentences up to `size`, carrying trailing sentences
/// forward within the `overlap` budget.
pub struct SentenceChunker {
    size: usize,
    overlap: usize,
    splitter: FixedChunker,
}

impl SentenceChunker {
    pub fn new(size: usize, overlap: usize) -> Self {
        Self {
            size: size.max(1),
            overlap,
            splitter: FixedChunker::new(size, overlap),
        }
    }

    /// Sentence spans over `chars`: end of sentence is terminal punctuation
    /// (plus closing quotes/brackets) followed by whitespace leading into an
    /// uppercase letter, or containing a newline, or end of text.
    fn split_sentences(chars: &[char]) -> Vec<(usize, usize)> {
        let n = chars.len();
        let mut sentences = Vec::new();
        let mut start = match chars.iter().position(|c| !c.is_whitespace()) {
            Some(p) => p,
            None => return sentences,
        };

        let mut i = start;
        while i < n {
            if matches!(chars[i], '.' | '!' | '?') {
                let mut end = i + 1;
                while end < n && matches!(chars[end], '"' | '\'' | ')' | ']') {
                    end += 1;
                }
                if end >= n {
                    sentences.push((start, end));
                    start = end;
                    i = end;
                    continue;
                }
                if chars[end].is_whitespace() {
                    let mut next = end;
                    let mut saw_newline = false;
                    while next < n && chars[next].is_whitespace() {
                        saw_newline |= chars[next] == '\n';
                        next += 1;
                    }
                    if next >= n || saw_newline || chars[next].is_uppercase() {
                        sentences.push((start, end));
                        start = next;
                        i = next;
                        continue;
                    }
                }
                i = end;
            } else {
                i += 1;
            }
        }

        if start < n {
            let end = n - chars[start..].iter().rev().take_while(|c| c.is_whitespace()).count();
            if end > start {
                sentences.push((start, end));
            }
        }
        sentences
    }

    fn make_chunk(&self, chars: &[char], start: usize, end: usize) -> Chunk {
        Chunk::new(
            chars[start..end].iter().collect::<String>(),
            start,
            end,
            "sentence",
        )
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, text: &str, _ctx: &ChunkContext<'_>) -> Vec<Chunk> {
        let text = sanitize(text);
        if text.trim().is_empty() {
            return Vec::new();
        }
        let chars: Vec<char> = text.chars().collect();
        let sentences = Self::split_sentences(&chars);

        let mut chunks = Vec::new();
        let mut group: Vec<(usize, usize)> = Vec::new();
        // Carried-over sentences were already emitted; only groups containing
        // a new sentence produce a chunk.
        let mut fresh = false;

        for &(s, e) in &sentences {
            let sentence_len = e - s;

            if sentence_len > self.size {
                if fresh {
                    chunks.push(self.make_chunk(&chars, group[0].0, group.last().unwrap().1));
                }
                group.clear();
                fresh = false;
                chunks.extend(self.splitter.chunk_chars(&chars[s..e], s, "sentence", true));
                continue;
            }

            if !group.is_empty() && e - group[0].0 > self.size {
                if fresh {
                    chunks.push(self.make_chunk(&chars, group[0].0, group.last().unwrap().1));
                }
                let mut carried: Vec<(usize, usize)> = Vec::new();
                let mut budget = 0;
                for &(cs, ce) in group.iter().rev() {
                    if budget + (ce - cs) > self.overlap {
                        break;
                    }
                    budget += ce - cs;
                    carried.push((cs, ce));
                }
                carried.reverse();
                group = carried;
                fresh = false;
            }

            group.push((s, e));
            fresh = true;
        }

        if fresh {
            chunks.push(self.make_chunk(&chars, group[0].0, group.last().unwrap().1));
        }
        chunks
    }
}

// ---------------------------------------------------------------
// Template
// ---------------------------------------------------------------

static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}[ \t].*$").unwrap());
static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n+").unwrap());

static RUST_DEF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:pub(?:\([^)]*\))?\s+)?(?:async\s+|unsafe\s+|const\s+)*(?:fn|struct|enum|trait|impl|mod)\b").unwrap()
});
static PYTHON_DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(?:async\s+)?(?:def|class)\s").unwrap());
static JS_DEF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:export\s+)?(?:default\s+)?(?:async\s+)?(?:function|class|interface|enum)\b|^(?:export\s+)?(?:const|let|var)\s+\w+\s*=").unwrap()
});
static GO_DEF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(?:func|type)\s").unwrap());
static JVM_DEF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]{0,4}(?:public\s+|private\s+|protected\s+|abstract\s+|final\s+|static\s+|open\s+)*(?:class|interface|enum|object|fun|void|def)\b").unwrap()
});
static C_DEF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:static\s+|inline\s+|extern\s+)?[A-Za-z_][A-Za-z0-9_ \t\*]*\([^;]*$").unwrap()
});

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "mdx", "markdown"];

fn code_pattern(extension: &str) -> Option<&'static Regex> {
    match extension {
        "rs" => Some(&RUST_DEF_RE),
        "py" => Some(&PYTHON_DEF_RE),
        "js" | "jsx" | "ts" | "tsx" => Some(&JS_DEF_RE),
        "go" => Some(&GO_DEF_RE),
        "java" | "kt" | "scala" | "cs" => Some(&JVM_DEF_RE),
        "c" | "h" | "cpp" | "hpp" | "cc" => Some(&C_DEF_RE),
        _ => None,
    }
}

enum DocKind {
    Markdown,
    Code(&'static Regex),
    Prose,
}

/// A contiguous span awaiting merge/emit, with its governing header.
struct Segment {
    start: usize,
    end: usize,
    /// Start of the body, past the header line for markdown segments.
    body_start: usize,
    header: Option<String>,
}

/// Byte→char offset conversion for regex match positions.
struct CharMap {
    byte_offsets: Vec<usize>,
}

impl CharMap {
    fn new(text: &str) -> Self {
        Self {
            byte_offsets: text.char_indices().map(|(b, _)| b).collect(),
        }
    }

    fn char_at(&self, byte: usize) -> usize {
        self.byte_offsets.partition_point(|&b| b < byte)
    }
}

/// Structure-aware chunker: markdown headers, code definitions, prose
/// paragraphs, with small-segment merging and fixed splitting of
/// oversized segments.
pub struct TemplateChunker {
    size: usize,
    overlap: usize,
}

impl TemplateChunker {
    pub fn new(size: usize, overlap: usize) -> Self {
        Self {
            size: size.max(1),
            overlap,
        }
    }

    fn classify(text: &str, extension: Option<&str>) -> DocKind {
        if let Some(ext) = extension {
            let ext = ext.to_lowercase();
            if MARKDOWN_EXTENSIONS.contains(&ext.as_str()) {
                return DocKind::Markdown;
            }
            if let Some(re) = code_pattern(&ext) {
                return DocKind::Code(re);
            }
        }
        if HEADER_RE.find_iter(text).count() >= 2 || text.contains("```") {
            return DocKind::Markdown;
        }
        DocKind::Prose
    }

    fn markdown_segments(text: &str, chars: &[char]) -> Vec<Segment> {
        let map = CharMap::new(text);
        let headers: Vec<(usize, usize, String)> = HEADER_RE
            .find_iter(text)
            .map(|m| {
                (
                    map.char_at(m.start()),
                    map.char_at(m.end()),
                    m.as_str().trim().to_string(),
                )
            })
            .collect();

        if headers.is_empty() {
            return vec![Segment {
                start: 0,
                end: chars.len(),
                body_start: 0,
                header: None,
            }];
        }

        let mut segments = Vec::new();
        if headers[0].0 > 0 {
            segments.push(Segment {
                start: 0,
                end: headers[0].0,
                body_start: 0,
                header: None,
            });
        }
        for (i, (start, line_end, header)) in headers.iter().enumerate() {
            let end = headers.get(i + 1).map(|h| h.0).unwrap_or(chars.len());
            segments.push(Segment {
                start: *start,
                end,
                body_start: (line_end + 1).min(end),
                header: Some(header.clone()),
            });
        }
        segments
    }

    fn boundary_segments(text: &str, chars: &[char], re: &Regex) -> Vec<Segment> {
        let map = CharMap::new(text);
        let starts: Vec<usize> = re.find_iter(text).map(|m| map.char_at(m.start())).collect();

        let mut segments = Vec::new();
        let mut prev = 0;
        for &s in &starts {
            if s > prev {
                segments.push(Segment {
                    start: prev,
                    end: s,
                    body_start: prev,
                    header: None,
                });
            }
            prev = s;
        }
        if prev < chars.len() {
            segments.push(Segment {
                start: prev,
                end: chars.len(),
                body_start: prev,
                header: None,
            });
        }
        segments
    }

    fn prose_segments(text: &str, chars: &[char]) -> Vec<Segment> {
        Self::boundary_segments(text, chars, &BLANK_LINE_RE)
    }

    /// Merge adjacent segments while the combined span stays within `size`.
    /// The first segment's header governs the merged span.
    fn merge_small(&self, segments: Vec<Segment>) -> Vec<Segment> {
        let mut merged: Vec<Segment> = Vec::new();
        for seg in segments {
            match merged.last_mut() {
                Some(last) if seg.end - last.start <= self.size => {
                    last.end = seg.end;
                }
                _ => merged.push(seg),
            }
        }
        merged
    }

    fn emit(&self, chars: &[char], segments: Vec<Segment>, kind: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for seg in segments {
            if chars[seg.start..seg.end].iter().all(|c| c.is_whitespace()) {
                continue;
            }

            if seg.end - seg.start <= self.size {
                let mut chunk = Chunk::new(
                    chars[seg.start..seg.end].iter().collect::<String>(),
                    seg.start,
                    seg.end,
                    "template",
                );
                chunk.metadata.kind = Some(kind.to_string());
                chunk.metadata.header = seg.header;
                chunks.push(chunk);
                continue;
            }

            // Oversized: fixed-split the body, prefixing the governing header
            // as context with the window budget reduced by the prefix.
            let prefix = seg
                .header
                .as_ref()
                .map(|h| format!("{}\n\n", h))
                .filter(|p| p.chars().count() < self.size);
            let budget = self.size - prefix.as_ref().map(|p| p.chars().count()).unwrap_or(0);
            let body_start = if prefix.is_some() { seg.body_start } else { seg.start };
            let inner = FixedChunker::new(budget, self.overlap.min(budget.saturating_sub(1)));

            for piece in inner.chunk_chars(&chars[body_start..seg.end], body_start, "template", true)
            {
                let mut chunk = piece;
                if let Some(p) = &prefix {
                    chunk.text = format!("{}{}", p, chunk.text);
                }
                chunk.metadata.kind = Some(kind.to_string());
                chunk.metadata.header = seg.header.clone();
                chunks.push(chunk);
            }
        }
        chunks
    }
}

impl Chunker for TemplateChunker {
    fn chunk(&self, text: &str, ctx: &ChunkContext<'_>) -> Vec<Chunk> {
        let text = sanitize(text);
        if text.trim().is_empty() {
            return Vec::new();
        }
        let chars: Vec<char> = text.chars().collect();

        match Self::classify(&text, ctx.extension) {
            DocKind::Markdown => {
                let segments = self.merge_small(Self::markdown_segments(&text, &chars));
                self.emit(&chars, segments, "markdown")
            }
            DocKind::Code(re) => {
                let mut segments = Self::boundary_segments(&text, &chars, re);
                if segments.len() <= 1 {
                    segments = Self::prose_segments(&text, &chars);
                }
                let segments = self.merge_small(segments);
                self.emit(&chars, segments, "code")
            }
            DocKind::Prose => {
                let segments = self.merge_small(Self::prose_segments(&text, &chars));
                self.emit(&chars, segments, "prose")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ChunkContext<'static> {
        ChunkContext::default()
    }

    #[test]
    fn test_fixed_empty_and_whitespace() {
        let chunker = FixedChunker::new(100, 0);
        assert!(chunker.chunk("", &ctx()).is_empty());
        assert!(chunker.chunk("   \n\t  ", &ctx()).is_empty());
    }

    #[test]
    fn test_fixed_short_text_single_chunk() {
        let chunker = FixedChunker::new(100, 20);
        let chunks = chunker.chunk("short text", &ctx());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short text");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 10));
    }

    #[test]
    fn test_fixed_coverage_without_overlap() {
        let text = "x".repeat(300);
        let chunker = FixedChunker::new(100, 0);
        let chunks = chunker.chunk(&text, &ctx());
        assert_eq!(chunks.len(), 3);
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_fixed_overlap_geometry() {
        let text = "y".repeat(200);
        let chunker = FixedChunker::new(100, 20);
        let chunks = chunker.chunk(&text, &ctx());
        assert_eq!(chunks[1].start, chunks[0].end - 20);
    }

    #[test]
    fn test_sentence_boundaries() {
        let chunks = SentenceChunker::new(512, 0).chunk(
            "First sentence here. Second one follows. Third closes it.",
            &ctx(),
        );
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.starts_with("First"));
        assert!(chunks[0].text.ends_with("it."));
    }

    #[test]
    fn test_sentence_accumulation_respects_size() {
        let text = "Alpha alpha alpha alpha. Bravo bravo bravo bravo. Charlie charlie charlie.";
        let chunks = SentenceChunker::new(55, 0).chunk(text, &ctx());
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.text.chars().count() <= 55, "chunk too long: {:?}", c.text);
        }
    }

    #[test]
    fn test_sentence_overlap_carries_whole_sentences() {
        let text = "One two three four. Five six seven eight. Nine ten eleven twelve.";
        let chunks = SentenceChunker::new(45, 25).chunk(text, &ctx());
        assert!(chunks.len() >= 2);
        // The second chunk starts at a sentence boundary inside the first.
        assert!(chunks[1].start < chunks[0].end);
        let boundary_char = chunks[1].text.chars().next().unwrap();
        assert!(boundary_char.is_uppercase());
    }

    #[test]
    fn test_sentence_oversized_is_split_and_tagged() {
        let long = format!("{}.", "word ".repeat(60).trim());
        let chunks = SentenceChunker::new(80, 10).chunk(&long, &ctx());
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.metadata.split));
    }

    #[test]
    fn test_template_markdown_headers_tagged() {
        let text = "# Title\n\nIntro paragraph.\n\n## Usage\n\nUsage details here.\n";
        let chunks = TemplateChunker::new(30, 0).chunk(text, &ChunkContext::for_extension("md"));
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.metadata.kind.as_deref() == Some("markdown")));
        assert!(chunks
            .iter()
            .any(|c| c.metadata.header.as_deref() == Some("## Usage")));
    }

    #[test]
    fn test_template_markdown_oversized_prefixes_header() {
        let body = "line of body text that keeps going. ".repeat(10);
        let text = format!("# Guide\n\n{}", body);
        let chunks = TemplateChunker::new(120, 0).chunk(&text, &ChunkContext::for_extension("md"));
        assert!(chunks.len() > 1);
        let tail = &chunks[chunks.len() - 1];
        assert!(tail.metadata.split);
        assert!(tail.text.starts_with("# Guide\n\n"));
        assert!(tail.text.chars().count() <= 120);
    }

    #[test]
    fn test_template_code_segments_at_definitions() {
        let text = "use std::fmt;\n\nfn alpha() {\n    body();\n}\n\nfn bravo() {\n    body();\n}\n";
        let chunks = TemplateChunker::new(40, 0).chunk(text, &ChunkContext::for_extension("rs"));
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.metadata.kind.as_deref() == Some("code")));
        assert!(chunks.iter().any(|c| c.text.contains("fn bravo")));
    }

    #[test]
    fn test_template_prose_paragraphs() {
        let text = "First paragraph with several words in it.\n\nSecond paragraph, also with words.";
        let chunks = TemplateChunker::new(50, 0).chunk(text, &ctx());
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.metadata.kind.as_deref() == Some("prose")));
    }

    #[test]
    fn test_template_merges_small_segments() {
        let text = "Tiny one.\n\nTiny two.\n\nTiny three.";
        let chunks = TemplateChunker::new(512, 0).chunk(text, &ctx());
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_all_strategies_agree_on_empty() {
        for strategy in [ChunkStrategy::Fixed, ChunkStrategy::Sentence, ChunkStrategy::Template] {
            let cfg = ChunkConfig {
                strategy,
                size: 128,
                overlap: 16,
            };
            let chunker = build_chunker(&cfg);
            assert!(chunker.chunk("", &ctx()).is_empty());
            assert!(chunker.chunk(" \n \t ", &ctx()).is_empty());
        }
    }

    #[test]
    fn test_nul_bytes_stripped() {
        let chunks = FixedChunker::new(100, 0).chunk("hel\0lo world", &ctx());
        assert_eq!(chunks[0].text, "hello world");
    }
}
