//! Length-bounded, index-ordered text splitter (`spec.md` §2 data flow).
//!
//! Out of the core's invariant set but needed to produce the `chunk::Chunk`
//! sequence the manager seals into a neuron; splits on byte length with a
//! configurable maximum, never splitting inside a UTF-8 character boundary.

use crate::chunk::Chunk;

/// Split `text` into chunks of at most `max_len` bytes each, in order,
/// without cutting a multi-byte UTF-8 codepoint in half.
pub fn split(text: &str, max_len: usize) -> Vec<Chunk> {
    assert!(max_len > 0, "max_len must be positive");

    let bytes = text.as_bytes();
    let mut chunks = Vec::new();
    let mut offset = 0usize;
    let mut index = 0u32;

    while offset < bytes.len() {
        let mut end = (offset + max_len).min(bytes.len());
        while end < bytes.len() && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == offset {
            // A single codepoint longer than max_len; take it whole rather
            // than produce an empty chunk.
            end = offset + text[offset..].chars().next().map(char::len_utf8).unwrap_or(1);
        }

        let data = bytes[offset..end].to_vec();
        chunks.push(Chunk::new(index, offset as u64, data, None));
        index += 1;
        offset = end;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_bounded_ordered_chunks() {
        let chunks = split("abcdefghij", 3);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].data, b"abc");
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[3].data, b"j");
        assert_eq!(chunks[3].offset, 9);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i as u32);
        }
    }

    #[test]
    fn never_splits_inside_a_utf8_codepoint() {
        let text = "a\u{1F600}b"; // emoji is 4 bytes
        let chunks = split(text, 2);
        for chunk in &chunks {
            assert!(std::str::from_utf8(&chunk.data).is_ok());
        }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split("", 10).is_empty());
    }
}
