
use tracing::debug;

use crate::config::ChunkingConfig;

/// Splits raw document text into overlapping, size-bounded windows.
///
/// Boundaries prefer natural breakpoints (paragraph, then line, then word)
/// when one falls in the back half of the window, and fall back to a hard
/// character cut so the splitter always makes forward progress.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl TextSplitter {
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Self {
        // Config validation enforces overlap < chunk_size; clamp anyway so a
        // hand-built config cannot stall the split loop.
        let chunk_size = config.chunk_size.max(1);
        let overlap = config.overlap.min(chunk_size - 1);

        Self {
            chunk_size,
            overlap,
        }
    }

    /// Split `text` into ordered chunks of at most `chunk_size` characters,
    /// with consecutive chunks sharing up to `overlap` characters.
    ///
    /// Empty or whitespace-only input yields zero chunks. Lengths are
    /// measured in Unicode scalar values, not bytes.
    #[inline]
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end < total {
                self.find_break(&chars, start, hard_end)
            } else {
                hard_end
            };

            let chunk: String = chars[start..end].iter().collect();
            let trimmed = chunk.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }

            if end >= total {
                break;
            }

            // Step back by the overlap, but never revisit the same start
            // offset; termination depends on strictly increasing starts.
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        debug!(
            "Split {} chars into {} chunks (size {}, overlap {})",
            total,
            chunks.len(),
            self.chunk_size,
            self.overlap
        );

        chunks
    }

    /// Pick a break position in `(start, hard_end]`, preferring a paragraph
    /// boundary, then a line break, then any whitespace. A natural break is
    /// only taken if it keeps the chunk at least half the target size.
    fn find_break(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let min_end = start + self.chunk_size / 2;

        let mut line_break = None;
        let mut word_break = None;

        for i in (min_end.max(start + 1)..hard_end).rev() {
            let c = chars[i];
            if c == '\n' {
                if i > start && chars[i - 1] == '\n' {
                    return i + 1;
                }
                line_break.get_or_insert(i + 1);
            } else if c.is_whitespace() {
                word_break.get_or_insert(i + 1);
            }
        }

        line_break.or(word_break).unwrap_or(hard_end)
    }
}
