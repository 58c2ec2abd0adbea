//! Splits source text into overlapping chunks for ingestion into a topic store.

use serde::{Deserialize, Serialize};

use crate::core::config::settings::ChunkingSettings;

/// A text chunk with source information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    /// The text content
    pub text: String,
    /// Source identifier (file name, URL, ...)
    pub source: String,
    /// Character offset in original document
    pub start_offset: usize,
    /// Chunk index within the source
    pub chunk_index: usize,
}

#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Self {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    /// Split text into overlapping chunks, cutting at a sentence end when one
    /// falls in the last fifth of a window.
    pub fn split(&self, text: &str, source: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        let mut chunks = Vec::new();

        if total_chars == 0 {
            return chunks;
        }

        let mut start = 0;
        let mut chunk_index = 0;

        while start < total_chars {
            let end = (start + self.chunk_size).min(total_chars);
            let window = &chars[start..end];

            let cut = if end < total_chars {
                sentence_boundary(window)
            } else {
                window.len()
            };

            let chunk_text: String = window[..cut].iter().collect();
            let trimmed = chunk_text.trim();
            if !trimmed.is_empty() {
                chunks.push(TextChunk {
                    text: trimmed.to_string(),
                    source: source.to_string(),
                    start_offset: start,
                    chunk_index,
                });
                chunk_index += 1;
            }

            if end == total_chars {
                break;
            }
            // Next window overlaps the end of this chunk, not the end of the window.
            start = (start + cut).saturating_sub(self.chunk_overlap).max(start + 1);
        }

        chunks
    }
}

/// Length (in chars) of the window up to and including the last sentence end
/// found in its final 20%, or the full window length.
fn sentence_boundary(window: &[char]) -> usize {
    let search_start = (window.len() * 80) / 100;

    for idx in (search_start..window.len().saturating_sub(1)).rev() {
        let is_terminal = matches!(window[idx], '.' | '!' | '?');
        let followed_by_space = window[idx + 1].is_whitespace();
        if is_terminal && followed_by_space {
            return idx + 2;
        }
    }

    window.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_with_overlap_and_sentence_cuts() {
        let chunker = TextChunker::new(100, 20);
        let text = "This is a test. ".repeat(20);
        let chunks = chunker.split(&text, "test.txt");

        assert!(chunks.len() >= 3);
        for (idx, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, idx);
            assert_eq!(chunk.source, "test.txt");
            assert!(chunk.text.chars().count() <= 100);
        }
        // Non-final chunks end on a sentence boundary.
        assert!(chunks[0].text.ends_with('.'));
        // First cut lands after the sentence ending at offset 94.
        assert_eq!(chunks[1].start_offset, 96 - 20);
    }

    #[test]
    fn short_sentence_cuts_leave_no_gaps() {
        let text: String = (0..30)
            .map(|i| format!("Sentence number {:03} here. ", i))
            .collect();
        let chunks = TextChunker::new(100, 10).split(&text, "gaps.txt");

        let mut covered = vec![false; text.len()];
        for chunk in &chunks {
            let offset = chunk.start_offset
                + text[chunk.start_offset..]
                    .find(&chunk.text)
                    .expect("chunk text comes from the source");
            covered[offset..offset + chunk.text.len()].fill(true);
        }

        let lost: String = text
            .char_indices()
            .filter(|(i, c)| !covered[*i] && !c.is_whitespace())
            .map(|(_, c)| c)
            .collect();
        assert_eq!(lost, "");
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 100));
    }

    #[test]
    fn covers_the_end_of_the_text() {
        let chunker = TextChunker::new(10, 0);
        let chunks = chunker.split("abcdefghijklmnopqrstuvwxy", "alpha");
        let ids: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(ids, vec!["abcdefghij", "klmnopqrst", "uvwxy"]);
    }

    #[test]
    fn empty_or_blank_text_yields_nothing() {
        let chunker = TextChunker::new(10, 2);
        assert!(chunker.split("", "empty").is_empty());
        assert!(chunker.split("     ", "blank").is_empty());
    }

    #[test]
    fn handles_multibyte_text() {
        let chunker = TextChunker::new(5, 1);
        let chunks = chunker.split("カール・G・メーザーの生涯。", "jp");
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 5));
    }
}
