//! Remote email ingestion from a mailbox-export endpoint.
//!
//! One authenticated POST per scan requests messages for a trailing
//! one-year date range; returned message objects become synthetic
//! document records with a deterministic identifier derived from
//! sender+subject+date, so repeated ingestion is idempotent. Distinct
//! messages with identical headers sent the same instant collide on that
//! identifier; this is a known weakness of the scheme, kept as-is.
//!
//! Any network or auth failure degrades to zero additional documents
//! with a warning; the local scan is never affected.

use md5::{Digest, Md5};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::RemoteEmailConfig;
use crate::models::{DocumentRecord, EmailMeta};

#[derive(Deserialize)]
struct RemoteMailResponse {
    #[serde(default)]
    emails: Vec<RemoteMessage>,
}

#[derive(Deserialize)]
struct RemoteMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    cc: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    attachments: Vec<String>,
}

/// Fetches remotely hosted messages and translates them into synthetic
/// records. Returns an empty collection on any failure.
pub async fn fetch_remote_emails(config: &RemoteEmailConfig) -> Vec<DocumentRecord> {
    match try_fetch(config).await {
        Ok(docs) => {
            info!(count = docs.len(), endpoint = %config.endpoint, "ingested remote emails");
            docs
        }
        Err(e) => {
            warn!(endpoint = %config.endpoint, error = %e, "remote email ingestion failed");
            Vec::new()
        }
    }
}

async fn try_fetch(config: &RemoteEmailConfig) -> anyhow::Result<Vec<DocumentRecord>> {
    let token = std::env::var(&config.token_env).unwrap_or_else(|_| {
        warn!(var = %config.token_env, "remote email token not set, sending unauthenticated request");
        String::new()
    });

    let now = chrono::Utc::now();
    let start = now - chrono::Duration::days(365);
    let payload = serde_json::json!({
        "action": "fetch_emails",
        "email": config.mailbox,
        "date_range": {
            "start": start.to_rfc3339(),
            "end": now.to_rfc3339(),
        }
    });

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    let response = client
        .post(&config.endpoint)
        .header("Authorization", format!("Bearer {}", token))
        .json(&payload)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("mailbox export endpoint returned {}", status);
    }

    let body: RemoteMailResponse = response.json().await?;
    Ok(body.emails.iter().map(message_to_record).collect())
}

fn message_to_record(message: &RemoteMessage) -> DocumentRecord {
    let email_id = message
        .id
        .clone()
        .unwrap_or_else(|| synthetic_id(&message.from, &message.subject, &message.date));
    let virtual_path = format!("remote_emails/{}.eml", email_id);

    DocumentRecord {
        file_path: virtual_path.clone(),
        relative_path: virtual_path,
        file_name: format!("{}.eml", email_id),
        file_type: ".eml".to_string(),
        file_size: message.body.len() as u64,
        modified_time: if message.date.is_empty() {
            chrono::Utc::now().to_rfc3339()
        } else {
            message.date.clone()
        },
        content: message.body.clone(),
        content_length: message.body.len(),
        category: "communications".to_string(),
        content_hash: email_id,
        email_metadata: Some(EmailMeta {
            from: message.from.clone(),
            to: message.to.clone(),
            cc: message.cc.clone(),
            subject: message.subject.clone(),
            date: message.date.clone(),
            message_id: None,
            attachments: message.attachments.clone(),
        }),
        requires_extraction: false,
        source: Some("remote_email".to_string()),
    }
}

/// md5(sender+subject+date). Collisions between distinct messages with
/// identical headers at the same instant are possible.
fn synthetic_id(from: &str, subject: &str, date: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(from.as_bytes());
    hasher.update(subject.as_bytes());
    hasher.update(date.as_bytes());
    format!("{:x}", hasher.finalize())
}
