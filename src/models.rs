//! Core data models used throughout fundtrace.
//!
//! These types represent the document records, text chunks, and search
//! results that flow through the intake and retrieval pipeline. Everything
//! here serializes with serde because records are persisted as JSON: cache
//! entries, scan exports, and index snapshots all carry these shapes.

use serde::{Deserialize, Serialize};

/// One processed file from a scan.
///
/// Records are immutable once written to the cache. The `content_hash` is
/// the cache and dedup key: byte-identical files anywhere in the tree
/// collapse to a single cache entry regardless of path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Absolute path at scan time.
    pub file_path: String,
    /// Path relative to the configured scan root.
    pub relative_path: String,
    pub file_name: String,
    /// Lowercase extension including the dot (e.g. `".pdf"`).
    pub file_type: String,
    pub file_size: u64,
    /// Last-modified timestamp, ISO-8601.
    pub modified_time: String,
    /// Extracted text. Empty on extraction failure or for formats that
    /// carry no text (images, container stubs).
    pub content: String,
    pub content_length: usize,
    /// Category label from the configured classification table, or `"other"`.
    pub category: String,
    /// Hex digest over the file bytes.
    pub content_hash: String,
    /// Message headers for email-derived records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_metadata: Option<EmailMeta>,
    /// Set for container formats (archives, mailbox files, legacy word
    /// processor documents) cataloged without extracting their contents.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_extraction: bool,
    /// Origin tag for records not read from the local tree
    /// (e.g. `"remote_email"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Parsed message headers attached to email-derived records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailMeta {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub cc: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

/// A chunk of a document's extracted text, keyed back to the document
/// by content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_hash: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of the chunk text, for staleness detection.
    pub hash: String,
}

/// Document metadata carried alongside chunks in the search index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub content_hash: String,
    pub file_name: String,
    pub relative_path: String,
    pub category: String,
    pub modified_time: String,
}

impl IndexedDocument {
    pub fn from_record(record: &DocumentRecord) -> Self {
        Self {
            content_hash: record.content_hash.clone(),
            file_name: record.file_name.clone(),
            relative_path: record.relative_path.clone(),
            category: record.category.clone(),
            modified_time: record.modified_time.clone(),
        }
    }
}

/// A ranked search result returned from the index.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    pub chunk_id: String,
    pub score: f64,
    pub snippet: String,
    pub document: IndexedDocument,
}
