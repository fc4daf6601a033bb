//! Quality filter — drops low-value chunks before embedding.

use quarry_core::{Chunk, FilterConfig};

/// Filters chunks by length and character-distribution entropy.
pub struct QualityFilter {
    cfg: FilterConfig,
}

impl QualityFilter {
    pub fn new(cfg: FilterConfig) -> Self {
        Self { cfg }
    }

    /// Returns survivors (offsets unchanged) and the number of drops.
    /// Dropping is intentional exclusion, not an error.
    pub fn apply(&self, chunks: Vec<Chunk>) -> (Vec<Chunk>, usize) {
        let mut kept = Vec::with_capacity(chunks.len());
        let mut dropped = 0;

        for mut chunk in chunks {
            if self.cfg.strip_control && chunk.text.chars().any(is_stripped_control) {
                chunk.text = chunk
                    .text
                    .chars()
                    .filter(|c| !is_stripped_control(*c))
                    .collect();
            }

            if chunk.text.trim().chars().count() < self.cfg.min_chars {
                dropped += 1;
                continue;
            }

            if let Some(min_entropy) = self.cfg.min_entropy {
                if shannon_entropy(&chunk.text) < min_entropy {
                    dropped += 1;
                    continue;
                }
            }

            kept.push(chunk);
        }

        (kept, dropped)
    }
}

/// Control characters other than newline and tab.
fn is_stripped_control(c: char) -> bool {
    c.is_control() && c != '\n' && c != '\t'
}

/// Shannon entropy in bits over the character frequency distribution.
pub fn shannon_entropy(text: &str) -> f64 {
    let mut counts: std::collections::HashMap<char, usize> = std::collections::HashMap::new();
    let mut total = 0usize;
    for c in text.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    counts
        .values()
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk::new(text, 0, text.chars().count(), "fixed")
    }

    fn filter(min_chars: usize, min_entropy: Option<f64>) -> QualityFilter {
        QualityFilter::new(FilterConfig {
            min_chars,
            min_entropy,
            strip_control: true,
        })
    }

    #[test]
    fn test_short_chunk_dropped_long_kept() {
        let f = filter(40, None);
        let short = chunk("ten chars.");
        let long = chunk("this chunk carries fifty characters of real text..");
        let (kept, dropped) = f.apply(vec![short, long]);
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, 1);
        assert!(kept[0].text.starts_with("this chunk"));
    }

    #[test]
    fn test_low_entropy_dropped() {
        let f = filter(5, Some(1.5));
        let noise = chunk("aaaaaaaaaaaaaaaaaaaaaaaa");
        let prose = chunk("a reasonably varied piece of text");
        let (kept, dropped) = f.apply(vec![noise, prose]);
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_control_chars_stripped_offsets_unchanged() {
        let f = filter(5, None);
        let c = chunk("hello\x07 world with a bell somewhere in it");
        let original_end = c.end;
        let (kept, _) = f.apply(vec![c]);
        assert!(!kept[0].text.contains('\x07'));
        assert_eq!(kept[0].end, original_end);
    }

    #[test]
    fn test_entropy_values() {
        assert_eq!(shannon_entropy(""), 0.0);
        assert_eq!(shannon_entropy("aaaa"), 0.0);
        assert!((shannon_entropy("abab") - 1.0).abs() < 1e-9);
    }
}
