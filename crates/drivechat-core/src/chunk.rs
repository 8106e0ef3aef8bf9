//! Paragraph-boundary text chunker.
//!
//! Splits a document's text into [`Chunk`]s no longer than `max_tokens`
//! (approximated as 4 characters per token). Paragraphs (`\n\n`) are packed
//! together until the next one would overflow; a single paragraph that is
//! too long on its own is hard-split at the last newline or space that fits.
//!
//! Chunk ids are derived from the document id and the chunk position, so
//! rebuilding the index from the same folder yields the same ids.
//!
//! ```rust
//! use drivechat_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("file-1", "Hello world.\n\nSecond paragraph.", 700);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].id, "file-1#0");
//! ```

use crate::models::Chunk;

const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into chunks with contiguous indices starting at 0.
///
/// Whitespace-only text produces no chunks.
pub fn chunk_text(document_id: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let needed = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };
        if needed > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if para.len() > max_chars {
            pieces.extend(hard_split(para, max_chars));
            continue;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }
    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(document_id, i as i64, piece))
        .collect()
}

/// Cut an oversized paragraph into pieces of at most `max_chars` bytes,
/// preferring newline, then space, boundaries.
fn hard_split(para: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = para;
    while !rest.is_empty() {
        if rest.len() <= max_chars {
            out.push(rest.trim().to_string());
            break;
        }
        let limit = floor_char_boundary(rest, max_chars);
        let cut = rest[..limit]
            .rfind('\n')
            .or_else(|| rest[..limit].rfind(' '))
            .map(|pos| pos + 1)
            .filter(|&pos| pos > 0)
            .unwrap_or(limit);
        // a single char wider than max_chars still has to make progress
        let cut = if cut == 0 {
            rest.chars().next().map_or(rest.len(), char::len_utf8)
        } else {
            cut
        };
        let piece = rest[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        rest = &rest[cut..];
    }
    out.retain(|p| !p.is_empty());
    out
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    Chunk {
        id: format!("{}#{}", document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
    }
}
