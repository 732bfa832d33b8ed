// Mnemo Engine — Document Chunker
//
// Splits long text (notes, conversation turns) into bounded, overlapping
// segments suitable for embedding. Prefers paragraph breaks, then sentence
// breaks, before falling back to hard character cuts. Ordering is stable
// and deterministic for identical input.

use crate::atoms::types::DocumentChunk;

/// Split `text` into chunks of at most `max_chars` bytes with `overlap`
/// bytes of trailing context carried into the next chunk.
///
/// Guarantees:
///   • no chunk is empty;
///   • every chunk records exact byte offsets into `text`, so concatenating
///     chunk 0 with each later chunk's non-overlapping suffix reconstructs
///     the input byte-for-byte;
///   • all cut points land on UTF-8 character boundaries.
pub fn split(text: &str, source_id: &str, max_chars: usize, overlap: usize) -> Vec<DocumentChunk> {
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }
    // Overlap must leave room to make progress.
    let overlap = overlap.min(max_chars / 2);

    let len = text.len();
    if len <= max_chars {
        return vec![DocumentChunk {
            text: text.to_string(),
            source_id: source_id.to_string(),
            start: 0,
            end: len,
            embedding: None,
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let hard_end = (start + max_chars).min(len);
        let end = if hard_end < len {
            pick_break(text, start, hard_end)
        } else {
            len
        };

        chunks.push(DocumentChunk {
            text: text[start..end].to_string(),
            source_id: source_id.to_string(),
            start,
            end,
            embedding: None,
        });

        if end == len {
            break;
        }

        // Step back by the overlap, but always move forward.
        let mut next = end.saturating_sub(overlap).max(start + 1);
        while next < len && !text.is_char_boundary(next) {
            next += 1;
        }
        start = next;
    }

    chunks
}

/// Choose the cut point for a chunk spanning [start, hard_end).
///
/// Preference order: last paragraph break, then last sentence break, both in
/// the second half of the window (a break too close to `start` would produce
/// a sliver chunk). Falls back to the nearest character boundary at or below
/// `hard_end`.
fn pick_break(text: &str, start: usize, hard_end: usize) -> usize {
    let window = &text[start..hard_end];
    let min_cut = window.len() / 2;

    if let Some(pos) = window.rfind("\n\n") {
        let cut = pos + 2; // keep the separator with the leading chunk
        if cut > min_cut {
            return start + cut;
        }
    }

    for sep in [". ", "! ", "? ", "\n"] {
        if let Some(pos) = window.rfind(sep) {
            let cut = pos + sep.len();
            if cut > min_cut {
                return start + cut;
            }
        }
    }

    let mut end = hard_end;
    while end > start && !text.is_char_boundary(end) {
        end -= 1;
    }
    if end == start {
        // A single code point wider than max_chars; take it whole.
        end = hard_end;
        while end < text.len() && !text.is_char_boundary(end) {
            end += 1;
        }
    }
    end
}

/// Reassemble the original text from chunks using their recorded offsets.
/// The inverse of `split`; used by reconciliation tests.
pub fn reconstruct(chunks: &[DocumentChunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        if chunk.end <= covered {
            continue;
        }
        let skip = covered.saturating_sub(chunk.start);
        out.push_str(&chunk.text[skip..]);
        covered = chunk.end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split("hello world", "s", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 11));
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split("", "s", 1000, 200).is_empty());
    }

    #[test]
    fn no_chunk_is_empty() {
        let text = "word ".repeat(500);
        for chunk in split(&text, "s", 100, 20) {
            assert!(!chunk.text.is_empty());
        }
    }

    #[test]
    fn reconstruction_is_exact() {
        let text = "First paragraph about hiking.\n\nSecond paragraph about Colorado. \
                    It has several sentences. Some are short. Some are quite a bit longer \
                    and ramble on about the mountains.\n\nThird paragraph to close."
            .repeat(5);
        let chunks = split(&text, "s", 120, 30);
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn reconstruction_is_exact_for_unbroken_text() {
        // No paragraph or sentence boundaries at all — forces hard cuts.
        let text = "a".repeat(950);
        let chunks = split(&text, "s", 100, 25);
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "x".repeat(80), "y".repeat(80));
        let chunks = split(&text, "s", 100, 10);
        // First cut should land right after the paragraph separator.
        assert!(chunks[0].text.ends_with("\n\n"));
    }

    #[test]
    fn chunks_respect_max_length() {
        let text = "lorem ipsum dolor sit amet ".repeat(100);
        for chunk in split(&text, "s", 200, 50) {
            assert!(chunk.text.len() <= 200, "chunk of {} bytes", chunk.text.len());
        }
    }

    #[test]
    fn deterministic_for_identical_input() {
        let text = "The quick brown fox. ".repeat(60);
        let a = split(&text, "s", 150, 40);
        let b = split(&text, "s", 150, 40);
        assert_eq!(a, b);
    }

    #[test]
    fn multibyte_input_never_panics() {
        let text = "日本語のテキストです。".repeat(50);
        let chunks = split(&text, "s", 100, 20);
        assert!(!chunks.is_empty());
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn overlap_carries_context() {
        let text = "abcdefghij".repeat(30);
        let chunks = split(&text, "s", 100, 20);
        for pair in chunks.windows(2) {
            assert!(pair[1].start < pair[0].end, "chunks should overlap");
        }
    }
}
