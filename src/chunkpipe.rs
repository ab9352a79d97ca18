//! Paragraph-boundary chunker for extracted document text.
//!
//! Splits a record's content into [`DocumentChunk`]s that respect a
//! `max_tokens` limit, breaking on paragraph boundaries (`\n\n`) so each
//! chunk stays semantically coherent. Chunks carry contiguous indices,
//! the parent document's content hash, and a SHA-256 of their own text
//! for staleness detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{DocumentChunk, DocumentRecord};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Chunks one record's extracted text. Records with no extractable
/// content (container stubs, images) yield no chunks.
pub fn chunk_record(record: &DocumentRecord, max_tokens: usize) -> Vec<DocumentChunk> {
    if record.content.trim().is_empty() || record.requires_extraction {
        return Vec::new();
    }
    chunk_text(&record.content_hash, &record.content, max_tokens)
}

/// Split text into chunks on paragraph boundaries, respecting max_tokens.
/// Returns chunks with contiguous indices starting at 0.
pub fn chunk_text(document_hash: &str, text: &str, max_tokens: usize) -> Vec<DocumentChunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    let mut chunks = Vec::new();
    let mut current_buf = String::new();
    let mut chunk_index: i64 = 0;

    for para in paragraphs {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len() // +2 for \n\n separator
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(make_chunk(document_hash, chunk_index, &current_buf));
            chunk_index += 1;
            current_buf.clear();
        }

        // A single oversize paragraph is hard-split at max_chars,
        // preferring newline or space boundaries.
        if trimmed.len() > max_chars {
            if !current_buf.is_empty() {
                chunks.push(make_chunk(document_hash, chunk_index, &current_buf));
                chunk_index += 1;
                current_buf.clear();
            }
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = floor_char_boundary(remaining, remaining.len().min(max_chars));
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                let piece = &remaining[..actual_split];
                chunks.push(make_chunk(document_hash, chunk_index, piece.trim()));
                chunk_index += 1;
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        chunks.push(make_chunk(document_hash, chunk_index, &current_buf));
    }

    chunks
}

/// Largest char boundary at or below `index`, but never zero for
/// non-empty text: a split point inside the first character advances to
/// the end of that character so the hard-split loop always makes
/// progress.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut at = index;
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }
    if at == 0 && !text.is_empty() {
        at = text
            .char_indices()
            .nth(1)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
    }
    at
}

fn make_chunk(document_hash: &str, index: i64, text: &str) -> DocumentChunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    DocumentChunk {
        id: Uuid::new_v4().to_string(),
        document_hash: document_hash.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_is_one_chunk() {
        let chunks = chunk_text("hash1", "Balance: $100", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Balance: $100");
    }

    #[test]
    fn indices_stay_contiguous() {
        let text = (0..50)
            .map(|i| format!("Transaction number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("hash1", &text, 10);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "index mismatch at {}", i);
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let a = chunk_text("hash1", text, 5);
        let b = chunk_text("hash1", text, 5);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
            assert_eq!(x.chunk_index, y.chunk_index);
        }
    }

    #[test]
    fn hard_split_respects_char_boundaries() {
        // max_chars = 4 forces a split inside the second two-byte char.
        let chunks = chunk_text("hash1", "aéé", 1);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "aé");
        assert_eq!(chunks[1].text, "é");
    }

    #[test]
    fn multibyte_paragraph_round_trips_through_hard_split() {
        let text = "é".repeat(100);
        let chunks = chunk_text("hash1", &text, 10);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
        let rejoined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn stub_records_yield_no_chunks() {
        let record = DocumentRecord {
            file_path: "/tmp/a.zip".to_string(),
            relative_path: "a.zip".to_string(),
            file_name: "a.zip".to_string(),
            file_type: ".zip".to_string(),
            file_size: 10,
            modified_time: "2024-01-01T00:00:00Z".to_string(),
            content: "Archive file - requires extraction".to_string(),
            content_length: 34,
            category: "other".to_string(),
            content_hash: "aa".to_string(),
            email_metadata: None,
            requires_extraction: true,
            source: None,
        };
        assert!(chunk_record(&record, 700).is_empty());
    }
}
