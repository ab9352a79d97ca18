//! Parsing of `.eml` message files found during a scan.
//!
//! Headers and a plain-text body are extracted (all `text/plain` parts of
//! a multipart message are concatenated). A message is classified as
//! `communications` when any configured relevance pattern matches the
//! combined header and body text; otherwise it falls back to the normal
//! path-based classification.

use anyhow::{Context, Result};
use mail_parser::{Address, MessageParser, MimeHeaders};
use regex::Regex;
use std::path::Path;

use crate::catalog::DocumentCatalog;
use crate::models::{DocumentRecord, EmailMeta};

/// Compiles the configured relevance patterns once per scan. Patterns
/// are validated at config load time, so failures here indicate a bug.
pub fn compile_relevance_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            regex::RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("Invalid relevance pattern: '{}'", p))
        })
        .collect()
}

/// Parses an `.eml` file into a document record carrying its headers.
pub fn process_eml(
    catalog: &DocumentCatalog,
    path: &Path,
    relevance: &[Regex],
) -> Result<DocumentRecord> {
    let raw = std::fs::read(path)
        .with_context(|| format!("Failed to read message file: {}", path.display()))?;
    let message = MessageParser::default()
        .parse(&raw)
        .with_context(|| format!("Unparseable message file: {}", path.display()))?;

    let meta = EmailMeta {
        from: address_text(message.from()),
        to: address_text(message.to()),
        cc: address_text(message.cc()),
        subject: message.subject().unwrap_or_default().to_string(),
        date: message
            .date()
            .map(|d| d.to_rfc3339())
            .unwrap_or_default(),
        message_id: message.message_id().map(|s| s.to_string()),
        attachments: message
            .attachments()
            .filter_map(|a| a.attachment_name().map(|n| n.to_string()))
            .collect(),
    };

    let mut body = String::new();
    for part in message.text_bodies() {
        if let Some(text) = part.text_contents() {
            body.push_str(text);
            body.push('\n');
        }
    }

    let header_and_body = format!("{} {} {} {}", meta.from, meta.to, meta.cc, body);
    let is_relevant = relevance.iter().any(|re| re.is_match(&header_and_body));

    let digest = crate::cache::CacheStore::content_hash(path)?;
    let mut record = catalog.stub_record(path, ".eml", body, &digest)?;
    record.requires_extraction = false;
    record.email_metadata = Some(meta);
    if is_relevant {
        record.category = "communications".to_string();
    }
    Ok(record)
}

fn address_text(address: Option<&Address>) -> String {
    address
        .map(|a| {
            a.iter()
                .filter_map(|addr| addr.address.as_deref())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}
