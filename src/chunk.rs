//! Sentence-boundary text chunker.
//!
//! Splits page text into retrievable units of at most `max_chunk_size`
//! characters, packing whole sentences greedily so that each chunk stays
//! semantically coherent.
//!
//! # Algorithm
//!
//! 1. Collapse every run of whitespace to a single space and trim the ends.
//! 2. Split into sentence-like segments. A run of `.`, `!` or `?` closes a
//!    segment and stays attached to it; trailing text without terminal
//!    punctuation forms the last segment.
//! 3. Accumulate segments while `current + next <= max_chunk_size`. When the
//!    next segment would overflow, flush the current chunk and start a new
//!    one with that segment.
//! 4. A single segment longer than `max_chunk_size` is emitted as its own
//!    oversized chunk; it is never split mid-sentence.
//!
//! Lengths are measured in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use page_index::chunk::chunk_text;
//!
//! let chunks = chunk_text("Hello   world.\n\nSecond sentence!", 500);
//! assert_eq!(chunks, vec!["Hello world. Second sentence!".to_string()]);
//! ```

use sha2::{Digest, Sha256};

/// Default maximum chunk length in characters.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 500;

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Collapse whitespace runs to single spaces and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split normalized text into sentence-like segments.
///
/// Concatenating the segments reproduces the input exactly.
fn split_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminal(c) {
            continue;
        }
        let next_is_terminal = chars.peek().map(|&(_, n)| is_terminal(n)).unwrap_or(false);
        if !next_is_terminal {
            let end = i + c.len_utf8();
            segments.push(&text[start..end]);
            start = end;
        }
    }

    if start < text.len() {
        segments.push(&text[start..]);
    }

    segments
}

/// Split text into chunks on sentence boundaries, respecting `max_chunk_size`.
///
/// Returns an empty vector for empty or whitespace-only input. Output is
/// deterministic: the same input always yields the same chunks.
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    let clean = normalize_whitespace(text);
    if clean.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for segment in split_segments(&clean) {
        let segment_len = segment.chars().count();
        if current_len + segment_len <= max_chunk_size {
            current.push_str(segment);
            current_len += segment_len;
        } else {
            push_chunk(&mut chunks, &current);
            current = segment.to_string();
            current_len = segment_len;
        }
    }
    push_chunk(&mut chunks, &current);

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, buf: &str) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// SHA-256 hex digest of a chunk's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
