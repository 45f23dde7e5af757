//! ============================================================================
//! Text Chunker - Character-window splitting with boundary awareness
//! ============================================================================
//! Splits documents into overlapping windows sized in characters, preferring
//! to cut at sentence or whitespace boundaries so retrieved chunks stay
//! readable.
//! ============================================================================

/// Splitter configuration
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl TextChunker {
    /// Create a chunker. Overlap is clamped below the chunk size so the
    /// window always advances.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let overlap = overlap.min(chunk_size.saturating_sub(1));
        Self { chunk_size, overlap }
    }

    /// Split `text` into chunks of at most `chunk_size` characters, each
    /// chunk sharing roughly `overlap` characters with its predecessor.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let hard_end = (start + self.chunk_size).min(chars.len());
            let end = if hard_end < chars.len() {
                self.find_break(&chars, start, hard_end)
            } else {
                hard_end
            };

            chunks.push(chars[start..end].iter().collect());

            if end >= chars.len() {
                break;
            }
            // Step back by the overlap, but always make forward progress.
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        chunks
    }

    /// Look backwards from `hard_end` for a sentence or whitespace boundary.
    /// Never shrinks the chunk below half the target size.
    fn find_break(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let floor = start + self.chunk_size / 2;

        let mut whitespace_break = None;
        for i in (floor..hard_end).rev() {
            match chars[i] {
                '.' | '!' | '?' | '\n' => return i + 1,
                c if c.is_whitespace() && whitespace_break.is_none() => {
                    whitespace_break = Some(i + 1);
                }
                _ => {}
            }
        }

        whitespace_break.unwrap_or(hard_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        let chunker = TextChunker::default();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n ").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = TextChunker::default();
        let chunks = chunker.chunk("Texto corto.");
        assert_eq!(chunks, vec!["Texto corto.".to_string()]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let chunker = TextChunker::new(50, 10);
        let text = "Una frase. ".repeat(40);
        let chunks = chunker.chunk(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50, "chunk too long: {:?}", chunk);
        }
    }

    #[test]
    fn test_full_coverage() {
        let chunker = TextChunker::new(40, 0);
        let text = "La actividad física regular reduce el riesgo cardiometabólico. \
                    Dormir bien también ayuda. Evitar el tabaco es fundamental.";
        let chunks = chunker.chunk(text);

        // With no overlap, concatenating the chunks reproduces the input.
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_overlap_present() {
        let chunker = TextChunker::new(30, 10);
        let text = "palabra ".repeat(30);
        let chunks = chunker.chunk(&text);

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev_tail: String = pair[0]
                .chars()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            assert!(
                pair[1].contains(prev_tail.trim()),
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let chunker = TextChunker::new(40, 0);
        let text = "Primera oración completa aquí. Segunda oración que sigue después del punto.";
        let chunks = chunker.chunk(text);

        assert!(chunks[0].ends_with('.'), "first chunk: {:?}", chunks[0]);
    }

    #[test]
    fn test_multibyte_safety() {
        let chunker = TextChunker::new(10, 3);
        let text = "áéíóú ñçüö ÁÉÍÓÚ ÑÇÜÖ áéíóú ñçüö";
        let chunks = chunker.chunk(text);

        // Re-joining must not panic and every chunk is valid UTF-8 by
        // construction; verify nothing was lost at the edges.
        assert!(chunks.first().unwrap().starts_with('á'));
        assert!(chunks.last().unwrap().ends_with('ö'));
    }

    #[test]
    fn test_overlap_clamped() {
        // Overlap >= size would never advance; the constructor clamps it.
        let chunker = TextChunker::new(10, 50);
        let text = "abcdefghij".repeat(5);
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() >= 5);
    }
}
