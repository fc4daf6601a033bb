//! File text extraction.
//!
//! `TextExtractor` is the seam for external extraction engines (PDF, OCR,
//! office formats). The built-in `PlainTextExtractor` handles text-based
//! files and rejects binary content.

use std::path::Path;

use quarry_core::{Error, Result};

/// Supported file categories for the built-in extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    PlainText,
    Markdown,
    Code,
    Data,
    Unsupported,
    Unknown,
}

impl FileKind {
    /// Detect category from extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "txt" | "rst" | "log" => Self::PlainText,
            "md" | "mdx" | "markdown" => Self::Markdown,
            "py" | "js" | "ts" | "tsx" | "jsx" | "rs" | "go" | "java" | "cpp" | "c" | "h"
            | "hpp" | "cc" | "cs" | "rb" | "php" | "swift" | "kt" | "scala" | "sh" | "bash"
            | "zsh" | "html" | "css" | "scss" | "sql" => Self::Code,
            "json" | "yaml" | "yml" | "toml" | "ini" | "cfg" | "xml" | "csv" => Self::Data,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "png" | "jpg" | "jpeg"
            | "gif" | "zip" | "gz" | "tar" => Self::Unsupported,
            _ => Self::Unknown,
        }
    }
}

/// Trait for text extraction providers. May return an empty string for a
/// file that exists but has no extractable text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Extension-driven extractor for text-based formats.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match FileKind::from_extension(ext) {
            FileKind::PlainText | FileKind::Markdown | FileKind::Code | FileKind::Data => {
                std::fs::read_to_string(path).map_err(|e| {
                    Error::Extraction(format!("{}: {}", path.display(), e))
                })
            }
            FileKind::Unsupported => Err(Error::Extraction(format!(
                "{}: no extraction engine for .{}",
                path.display(),
                ext
            ))),
            FileKind::Unknown => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Extraction(format!("{}: {}", path.display(), e))
                })?;
                if looks_binary(&content) {
                    Err(Error::Extraction(format!(
                        "{}: binary content",
                        path.display()
                    )))
                } else {
                    Ok(content)
                }
            }
        }
    }
}

/// More than 10% control characters means binary.
fn looks_binary(content: &str) -> bool {
    if content.is_empty() {
        return false;
    }
    let control = content
        .chars()
        .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
        .count();
    control * 10 > content.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_kind_detection() {
        assert_eq!(FileKind::from_extension("md"), FileKind::Markdown);
        assert_eq!(FileKind::from_extension("RS"), FileKind::Code);
        assert_eq!(FileKind::from_extension("pdf"), FileKind::Unsupported);
        assert_eq!(FileKind::from_extension("weird"), FileKind::Unknown);
    }

    #[test]
    fn test_extracts_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "some note content").unwrap();
        let text = PlainTextExtractor.extract(&path).unwrap();
        assert_eq!(text, "some note content");
    }

    #[test]
    fn test_unsupported_format_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        assert!(PlainTextExtractor.extract(&path).is_err());
    }

    #[test]
    fn test_binary_sniff_rejects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.unknownext");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all("a\u{1}\u{2}\u{3}\u{4}\u{5}b".as_bytes()).unwrap();
        drop(f);
        assert!(PlainTextExtractor.extract(&path).is_err());
    }
}
