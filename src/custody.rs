//! Chain-of-custody log for evidentiary files.
//!
//! The log is a single ordered JSON array (`chain_of_custody.json` in the
//! evidence directory). Every mutation reads the whole file, appends one
//! entry in memory, and rewrites the file, which is not safe for
//! concurrent writers: two simultaneous appends can lose one entry.
//! Callers must serialize all custody-mutating operations per evidence
//! directory (single-writer discipline). The array format is an external
//! interface and is kept despite that fragility.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::Config;

pub const CUSTODY_LOG_NAME: &str = "chain_of_custody.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CustodyEntry {
    DocumentAuthenticated {
        timestamp: String,
        file_name: String,
        custodian: String,
        hash_sha256: String,
        authentication_id: String,
    },
    CustodyTransfer {
        timestamp: String,
        file_name: String,
        from_custodian: String,
        to_custodian: String,
        reason: String,
        transfer_id: String,
    },
}

impl CustodyEntry {
    pub fn file_name(&self) -> &str {
        match self {
            CustodyEntry::DocumentAuthenticated { file_name, .. } => file_name,
            CustodyEntry::CustodyTransfer { file_name, .. } => file_name,
        }
    }
}

pub struct CustodyLog {
    path: PathBuf,
}

impl CustodyLog {
    pub fn open(evidence_dir: &Path) -> Self {
        Self {
            path: evidence_dir.join(CUSTODY_LOG_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns all entries in append order. A missing log is empty, not
    /// an error.
    pub fn read(&self) -> Result<Vec<CustodyEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read custody log: {}", self.path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Malformed custody log: {}", self.path.display()))
    }

    /// Appends one entry via whole-file read/modify/write. See the module
    /// doc for the single-writer requirement.
    pub fn append(&self, entry: CustodyEntry) -> Result<()> {
        let mut entries = self.read()?;
        entries.push(entry);
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write custody log: {}", self.path.display()))?;
        Ok(())
    }

    pub fn entries_for(&self, file_name: &str) -> Result<Vec<CustodyEntry>> {
        Ok(self
            .read()?
            .into_iter()
            .filter(|e| e.file_name() == file_name)
            .collect())
    }

    /// Records a custody transfer and returns the appended entry. The
    /// transfer id is derived from the four inputs plus the current time.
    pub fn record_transfer(
        &self,
        file_name: &str,
        from_custodian: &str,
        to_custodian: &str,
        reason: &str,
    ) -> Result<CustodyEntry> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut hasher = Sha256::new();
        hasher.update(file_name.as_bytes());
        hasher.update(from_custodian.as_bytes());
        hasher.update(to_custodian.as_bytes());
        hasher.update(now.as_bytes());
        let transfer_id = format!("{:x}", hasher.finalize())[..16].to_string();

        let entry = CustodyEntry::CustodyTransfer {
            timestamp: now,
            file_name: file_name.to_string(),
            from_custodian: from_custodian.to_string(),
            to_custodian: to_custodian.to_string(),
            reason: reason.to_string(),
            transfer_id,
        };
        self.append(entry.clone())?;
        Ok(entry)
    }
}

/// CLI entry: record a custody transfer for an authenticated file.
pub fn run_transfer(
    config: &Config,
    file_name: &str,
    from_custodian: &str,
    to_custodian: &str,
    reason: &str,
) -> Result<()> {
    std::fs::create_dir_all(&config.evidence.dir).with_context(|| {
        format!(
            "Failed to create evidence directory: {}",
            config.evidence.dir.display()
        )
    })?;
    let log = CustodyLog::open(&config.evidence.dir);
    let entry = log.record_transfer(file_name, from_custodian, to_custodian, reason)?;
    if let CustodyEntry::CustodyTransfer { transfer_id, .. } = &entry {
        println!("Recorded transfer of {}", file_name);
        println!("  {} -> {}", from_custodian, to_custodian);
        println!("  transfer_id: {}", transfer_id);
    }
    Ok(())
}

/// CLI entry: print the custody log, optionally filtered to one file.
pub fn run_custody(config: &Config, file_name: Option<&str>) -> Result<()> {
    let log = CustodyLog::open(&config.evidence.dir);
    let entries = match file_name {
        Some(name) => log.entries_for(name)?,
        None => log.read()?,
    };
    if entries.is_empty() {
        println!("No custody entries.");
        return Ok(());
    }
    for entry in &entries {
        match entry {
            CustodyEntry::DocumentAuthenticated {
                timestamp,
                file_name,
                custodian,
                authentication_id,
                ..
            } => {
                println!(
                    "{}  authenticated  {}  custodian={}  id={}",
                    timestamp, file_name, custodian, authentication_id
                );
            }
            CustodyEntry::CustodyTransfer {
                timestamp,
                file_name,
                from_custodian,
                to_custodian,
                reason,
                transfer_id,
            } => {
                println!(
                    "{}  transfer       {}  {} -> {}  reason=\"{}\"  id={}",
                    timestamp, file_name, from_custodian, to_custodian, reason, transfer_id
                );
            }
        }
    }
    Ok(())
}
