//! Authentication-package export for external submission.
//!
//! Collects, per requested file name, the newest authentication record
//! (located through the custody log's authentication id), a fresh
//! integrity check when the source file still exists, the relevant
//! custody-log entries, and the public key into one portable directory.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::authenticate::{
    AuthenticationRecord, EvidenceAuthenticator, IntegrityReport, PUBLIC_KEY_NAME,
};
use crate::config::Config;
use crate::custody::{CustodyEntry, CUSTODY_LOG_NAME};

#[derive(Debug, Serialize)]
pub struct ExportManifest {
    pub package_location: String,
    pub files_authenticated: usize,
    pub integrity_verified: usize,
    pub package_files: Vec<String>,
}

/// Writes the package directory and returns a manifest of what was
/// collected. Files with no authentication record are skipped with a
/// warning rather than failing the whole export.
pub fn export_package(
    authenticator: &EvidenceAuthenticator,
    file_names: &[String],
    output_dir: &Path,
) -> Result<ExportManifest> {
    std::fs::create_dir_all(output_dir).with_context(|| {
        format!(
            "Failed to create package directory: {}",
            output_dir.display()
        )
    })?;

    let log_entries = authenticator.custody().read()?;
    let mut records: BTreeMap<String, AuthenticationRecord> = BTreeMap::new();
    let mut integrity: BTreeMap<String, IntegrityReport> = BTreeMap::new();

    for file_name in file_names {
        let record = match find_record(authenticator, &log_entries, file_name) {
            Some(record) => record,
            None => {
                warn!(file = %file_name, "no authentication record found, skipping");
                continue;
            }
        };

        let source = PathBuf::from(&record.file_path);
        if source.exists() {
            match authenticator.check_integrity(&source, &record) {
                Ok(report) => {
                    integrity.insert(file_name.clone(), report);
                }
                Err(e) => {
                    warn!(file = %file_name, error = %e, "integrity re-check failed");
                }
            }
        }
        records.insert(file_name.clone(), record);
    }

    let custody_slice: Vec<&CustodyEntry> = log_entries
        .iter()
        .filter(|e| file_names.iter().any(|f| f == e.file_name()))
        .collect();

    write_json(output_dir, "authentication_records.json", &records)?;
    write_json(output_dir, "integrity_verification.json", &integrity)?;
    write_json(output_dir, CUSTODY_LOG_NAME, &custody_slice)?;

    let public_key = authenticator.evidence_dir().join(PUBLIC_KEY_NAME);
    std::fs::copy(&public_key, output_dir.join(PUBLIC_KEY_NAME)).with_context(|| {
        format!("Failed to copy public key: {}", public_key.display())
    })?;

    Ok(ExportManifest {
        package_location: output_dir.to_string_lossy().to_string(),
        files_authenticated: records.len(),
        integrity_verified: integrity.values().filter(|r| r.is_verified()).count(),
        package_files: vec![
            "authentication_records.json".to_string(),
            "integrity_verification.json".to_string(),
            CUSTODY_LOG_NAME.to_string(),
            PUBLIC_KEY_NAME.to_string(),
        ],
    })
}

/// Newest `document_authenticated` entry for the file, resolved to its
/// persisted record.
fn find_record(
    authenticator: &EvidenceAuthenticator,
    entries: &[CustodyEntry],
    file_name: &str,
) -> Option<AuthenticationRecord> {
    let auth_id = entries.iter().rev().find_map(|entry| match entry {
        CustodyEntry::DocumentAuthenticated {
            file_name: name,
            authentication_id,
            ..
        } if name == file_name => Some(authentication_id.clone()),
        _ => None,
    })?;

    let record_path = authenticator.record_path(&auth_id);
    let bytes = match std::fs::read(&record_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(record = %record_path.display(), error = %e, "cannot read authentication record");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(record = %record_path.display(), error = %e, "malformed authentication record");
            None
        }
    }
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// CLI entry: export an authentication package for the named files.
pub fn run_export(config: &Config, output_dir: &Path, file_names: &[String]) -> Result<()> {
    let authenticator = EvidenceAuthenticator::open(&config.evidence.dir)?;
    let manifest = export_package(&authenticator, file_names, output_dir)?;
    println!("Package written to {}", manifest.package_location);
    println!("  files authenticated: {}", manifest.files_authenticated);
    println!("  integrity verified:  {}", manifest.integrity_verified);
    for file in &manifest.package_files {
        println!("  - {}", file);
    }
    Ok(())
}
