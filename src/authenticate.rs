//! Digital evidence authentication.
//!
//! For each authenticated file this module computes a four-algorithm hash
//! set (md5/sha1/sha256/sha512, one streaming read updating all four),
//! probes format-specific technical metadata best-effort, signs a
//! canonical JSON form of the record with the evidence directory's RSA
//! key, appends a summary entry to the chain-of-custody log, and persists
//! the full record as `<authentication_id>_auth.json`.
//!
//! The canonical form is the record serialized with sorted keys and
//! compact separators, minus the two signature fields. Verification
//! re-derives exactly those bytes, so records survive round trips through
//! JSON files regardless of in-memory field order.
//!
//! One authenticator instance per evidence directory: the signing key is
//! loaded or generated at construction and the custody log requires a
//! single writer.

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use md5::Md5;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Signer, Verifier};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

use crate::config::Config;
use crate::custody::{CustodyEntry, CustodyLog};

pub const SIGNING_KEY_NAME: &str = "signing_key.pem";
pub const PUBLIC_KEY_NAME: &str = "public_key.pem";

/// One document's evidentiary authentication. Immutable once signed;
/// re-authenticating a modified file produces a new record with a new id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationRecord {
    pub file_path: String,
    pub file_name: String,
    /// ISO-8601 UTC timestamp of the authentication event.
    pub authenticated_at: String,
    pub custodian: String,
    pub collection_method: String,
    pub file_size: u64,
    pub modification_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,
    /// Algorithm name → hex digest over the full file content.
    pub hashes: BTreeMap<String, String>,
    /// Format-specific technical metadata, best-effort.
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub authentication_method: String,
    pub compliance: ComplianceRefs,
    /// Base64 RSA-PSS signature over the canonical record. Absent only
    /// while the record is being assembled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_algorithm: Option<String>,
}

/// Static Federal-Rules references attached to every record. A lookup
/// table for admissibility review, not a legal determination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRefs {
    pub fed_rules_evidence: Vec<String>,
    pub best_evidence_rule: bool,
    pub hearsay_exceptions: Vec<String>,
}

impl Default for ComplianceRefs {
    fn default() -> Self {
        Self {
            fed_rules_evidence: vec!["901".into(), "902".into(), "1001".into()],
            best_evidence_rule: true,
            hearsay_exceptions: vec!["803(6)".into(), "902(11)".into(), "902(13)".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub file_path: String,
    pub verified_at: String,
    /// `"verified"` iff every algorithm matches, else `"compromised"`.
    pub integrity_status: String,
    pub hash_comparison: BTreeMap<String, HashComparison>,
}

impl IntegrityReport {
    pub fn is_verified(&self) -> bool {
        self.integrity_status == "verified"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashComparison {
    pub original: Option<String>,
    pub current: String,
    pub matches: bool,
}

pub struct EvidenceAuthenticator {
    evidence_dir: PathBuf,
    key: PKey<Private>,
    custody: CustodyLog,
}

impl EvidenceAuthenticator {
    /// Opens an evidence directory, creating it and its signing keypair
    /// on first use. Key load/generate failures are fatal: without key
    /// material the subsystem cannot function.
    pub fn open(evidence_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(evidence_dir).with_context(|| {
            format!(
                "Failed to create evidence directory: {}",
                evidence_dir.display()
            )
        })?;
        let key = load_or_generate_key(evidence_dir)?;
        Ok(Self {
            evidence_dir: evidence_dir.to_path_buf(),
            key,
            custody: CustodyLog::open(evidence_dir),
        })
    }

    pub fn evidence_dir(&self) -> &Path {
        &self.evidence_dir
    }

    pub fn custody(&self) -> &CustodyLog {
        &self.custody
    }

    pub fn record_path(&self, authentication_id: &str) -> PathBuf {
        self.evidence_dir
            .join(format!("{}_auth.json", authentication_id))
    }

    /// Creates, signs, logs, and persists an authentication record for
    /// one file.
    pub fn authenticate(
        &self,
        path: &Path,
        custodian: &str,
        collection_method: &str,
    ) -> Result<AuthenticationRecord> {
        let hashes = compute_file_hashes(path)?;
        let metadata = extract_technical_metadata(path);
        let stat = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat file: {}", path.display()))?;
        let modified: DateTime<Utc> = stat
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
            .into();

        let mut record = AuthenticationRecord {
            file_path: path.to_string_lossy().to_string(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            authenticated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            custodian: custodian.to_string(),
            collection_method: collection_method.to_string(),
            file_size: stat.len(),
            modification_time: modified.to_rfc3339_opts(SecondsFormat::Secs, true),
            creation_time: stat
                .created()
                .ok()
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true)),
            hashes,
            metadata,
            authentication_method: "digital_signature".to_string(),
            compliance: ComplianceRefs::default(),
            digital_signature: None,
            signature_algorithm: None,
        };

        let canonical = canonical_bytes(&record)?;
        let signature = self.sign(&canonical)?;
        record.digital_signature = Some(base64::engine::general_purpose::STANDARD.encode(signature));
        // Kept verbatim for record compatibility; the padding is PSS.
        record.signature_algorithm = Some("RSA-2048-SHA256".to_string());

        let auth_id = authentication_id(&record);
        self.custody.append(CustodyEntry::DocumentAuthenticated {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            file_name: record.file_name.clone(),
            custodian: record.custodian.clone(),
            hash_sha256: record.hashes.get("sha256").cloned().unwrap_or_default(),
            authentication_id: auth_id.clone(),
        })?;

        let record_path = self.record_path(&auth_id);
        std::fs::write(&record_path, serde_json::to_string_pretty(&record)?)
            .with_context(|| {
                format!(
                    "Failed to persist authentication record: {}",
                    record_path.display()
                )
            })?;

        Ok(record)
    }

    /// Verifies a record's signature against this directory's key. Every
    /// failure mode (missing signature, malformed base64, mismatch)
    /// yields `false`, never an error.
    pub fn verify(&self, record: &AuthenticationRecord) -> bool {
        match self.try_verify(record) {
            Ok(valid) => valid,
            Err(e) => {
                error!(file = %record.file_name, error = %e, "signature verification failed");
                false
            }
        }
    }

    fn try_verify(&self, record: &AuthenticationRecord) -> Result<bool> {
        let encoded = record
            .digital_signature
            .as_deref()
            .context("record carries no signature")?;
        let signature = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        let canonical = canonical_bytes(record)?;

        let mut verifier = Verifier::new(MessageDigest::sha256(), &self.key)?;
        verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
        verifier.set_rsa_pss_saltlen(RsaPssSaltlen::MAXIMUM_LENGTH)?;
        verifier.set_rsa_mgf1_md(MessageDigest::sha256())?;
        verifier.update(&canonical)?;
        Ok(verifier.verify(&signature)?)
    }

    /// Recomputes all four hashes for the file's current content and
    /// compares entrywise against the original record. A mismatch is an
    /// expected, actionable outcome reported in the result, not an error.
    pub fn check_integrity(
        &self,
        path: &Path,
        original: &AuthenticationRecord,
    ) -> Result<IntegrityReport> {
        let current = compute_file_hashes(path)?;
        let mut comparison = BTreeMap::new();
        let mut all_match = true;
        for (algo, digest) in &current {
            let original_digest = original.hashes.get(algo).cloned();
            let matches = original_digest.as_deref() == Some(digest.as_str());
            all_match &= matches;
            comparison.insert(
                algo.clone(),
                HashComparison {
                    original: original_digest,
                    current: digest.clone(),
                    matches,
                },
            );
        }

        Ok(IntegrityReport {
            file_path: path.to_string_lossy().to_string(),
            verified_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            integrity_status: if all_match { "verified" } else { "compromised" }.to_string(),
            hash_comparison: comparison,
        })
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)?;
        signer.set_rsa_padding(Padding::PKCS1_PSS)?;
        signer.set_rsa_pss_saltlen(RsaPssSaltlen::MAXIMUM_LENGTH)?;
        signer.set_rsa_mgf1_md(MessageDigest::sha256())?;
        signer.update(data)?;
        Ok(signer.sign_to_vec()?)
    }
}

/// sha256(file_name + authenticated_at + custodian), first 16 hex chars.
pub fn authentication_id(record: &AuthenticationRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.file_name.as_bytes());
    hasher.update(record.authenticated_at.as_bytes());
    hasher.update(record.custodian.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// The exact byte sequence that is signed: the record minus its two
/// signature fields, serialized with sorted keys and compact separators.
pub fn canonical_bytes(record: &AuthenticationRecord) -> Result<Vec<u8>> {
    let mut unsigned = record.clone();
    unsigned.digital_signature = None;
    unsigned.signature_algorithm = None;
    // serde_json maps are key-sorted and Value serialization is compact,
    // so this is deterministic for any in-memory field order.
    let value = serde_json::to_value(&unsigned)?;
    Ok(serde_json::to_string(&value)?.into_bytes())
}

/// All four digests from a single streaming read.
pub fn compute_file_hashes(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut sha512 = Sha512::new();

    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        if n == 0 {
            break;
        }
        md5.update(&buf[..n]);
        sha1.update(&buf[..n]);
        sha256.update(&buf[..n]);
        sha512.update(&buf[..n]);
    }

    let mut hashes = BTreeMap::new();
    hashes.insert("md5".to_string(), format!("{:x}", md5.finalize()));
    hashes.insert("sha1".to_string(), format!("{:x}", sha1.finalize()));
    hashes.insert("sha256".to_string(), format!("{:x}", sha256.finalize()));
    hashes.insert("sha512".to_string(), format!("{:x}", sha512.finalize()));
    Ok(hashes)
}

/// Format-specific metadata probes, each independently best-effort: a
/// failed probe records an error note instead of its fields and never
/// fails the authentication.
pub fn extract_technical_metadata(path: &Path) -> BTreeMap<String, serde_json::Value> {
    let ext = crate::catalog::extension_of(path);
    let mut metadata = BTreeMap::new();
    metadata.insert("file_type".to_string(), serde_json::json!(ext));

    #[cfg(unix)]
    if let Ok(stat) = std::fs::metadata(path) {
        use std::os::unix::fs::MetadataExt;
        metadata.insert(
            "permissions".to_string(),
            serde_json::json!(format!("{:03o}", stat.mode() & 0o777)),
        );
        metadata.insert("inode".to_string(), serde_json::json!(stat.ino()));
    }

    match ext.as_str() {
        ".pdf" => match probe_pdf(path) {
            Ok(fields) => metadata.extend(fields),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "could not extract PDF metadata");
                metadata.insert("pdf_extraction_error".to_string(), serde_json::json!(e.to_string()));
            }
        },
        ".xlsx" | ".xls" => match probe_spreadsheet(path) {
            Ok(fields) => metadata.extend(fields),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "could not extract spreadsheet metadata");
                metadata.insert(
                    "spreadsheet_extraction_error".to_string(),
                    serde_json::json!(e.to_string()),
                );
            }
        },
        ".jpg" | ".jpeg" | ".png" => match probe_image(path) {
            Ok(fields) => metadata.extend(fields),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "could not extract image metadata");
                metadata.insert(
                    "image_extraction_error".to_string(),
                    serde_json::json!(e.to_string()),
                );
            }
        },
        _ => {}
    }

    metadata
}

fn probe_pdf(path: &Path) -> Result<BTreeMap<String, serde_json::Value>> {
    let doc = lopdf::Document::load(path)?;
    let mut fields = BTreeMap::new();
    fields.insert("pdf_version".to_string(), serde_json::json!(doc.version));
    fields.insert(
        "page_count".to_string(),
        serde_json::json!(doc.get_pages().len()),
    );
    fields.insert("encrypted".to_string(), serde_json::json!(doc.is_encrypted()));

    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| obj.as_reference().ok())
        .and_then(|id| doc.get_object(id).ok())
        .and_then(|obj| obj.as_dict().ok());
    if let Some(info) = info {
        for (key, field) in [
            (&b"Creator"[..], "creator"),
            (&b"Producer"[..], "producer"),
            (&b"CreationDate"[..], "creation_date"),
            (&b"ModDate"[..], "modification_date"),
        ] {
            if let Some(text) = info_string(info, key) {
                fields.insert(field.to_string(), serde_json::json!(text));
            }
        }
    }
    Ok(fields)
}

fn info_string(info: &lopdf::Dictionary, key: &[u8]) -> Option<String> {
    match info.get(key) {
        Ok(lopdf::Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).to_string()),
        _ => None,
    }
}

fn probe_spreadsheet(path: &Path) -> Result<BTreeMap<String, serde_json::Value>> {
    use calamine::Reader;
    let workbook = calamine::open_workbook_auto(path)?;
    let names = workbook.sheet_names().to_owned();
    let mut fields = BTreeMap::new();
    fields.insert("sheet_count".to_string(), serde_json::json!(names.len()));
    fields.insert("sheet_names".to_string(), serde_json::json!(names));
    Ok(fields)
}

fn probe_image(path: &Path) -> Result<BTreeMap<String, serde_json::Value>> {
    let mut fields = BTreeMap::new();
    let (width, height) = image::image_dimensions(path)?;
    fields.insert("image_size".to_string(), serde_json::json!([width, height]));

    // EXIF is optional; plenty of evidentiary images carry none.
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    if let Ok(exif) = exif::Reader::new().read_from_container(&mut reader) {
        let mut tags = BTreeMap::new();
        for field in exif.fields() {
            tags.insert(
                field.tag.to_string(),
                field.display_value().with_unit(field).to_string(),
            );
        }
        fields.insert("exif".to_string(), serde_json::json!(tags));
    }
    Ok(fields)
}

fn load_or_generate_key(evidence_dir: &Path) -> Result<PKey<Private>> {
    let key_path = evidence_dir.join(SIGNING_KEY_NAME);
    if key_path.exists() {
        let pem = std::fs::read(&key_path)
            .with_context(|| format!("Failed to read signing key: {}", key_path.display()))?;
        return PKey::private_key_from_pem(&pem)
            .with_context(|| format!("Malformed signing key: {}", key_path.display()));
    }

    let rsa = Rsa::generate(2048).context("Failed to generate signing keypair")?;
    let key = PKey::from_rsa(rsa)?;
    std::fs::write(&key_path, key.private_key_to_pem_pkcs8()?)
        .with_context(|| format!("Failed to persist signing key: {}", key_path.display()))?;
    let public_path = evidence_dir.join(PUBLIC_KEY_NAME);
    std::fs::write(&public_path, key.public_key_to_pem()?)
        .with_context(|| format!("Failed to persist public key: {}", public_path.display()))?;
    Ok(key)
}

/// CLI entry: authenticate one file with a named custodian.
pub fn run_authenticate(
    config: &Config,
    file: &Path,
    custodian: &str,
    method: &str,
) -> Result<()> {
    let authenticator = EvidenceAuthenticator::open(&config.evidence.dir)?;
    let record = authenticator.authenticate(file, custodian, method)?;
    let auth_id = authentication_id(&record);
    println!("Authenticated {}", record.file_name);
    println!("  authentication_id: {}", auth_id);
    println!("  sha256:            {}", record.hashes["sha256"]);
    println!("  custodian:         {}", record.custodian);
    println!(
        "  record:            {}",
        authenticator.record_path(&auth_id).display()
    );
    Ok(())
}

/// CLI entry: verify a persisted record's signature.
pub fn run_verify(config: &Config, record_path: &Path) -> Result<()> {
    let authenticator = EvidenceAuthenticator::open(&config.evidence.dir)?;
    let bytes = std::fs::read(record_path)
        .with_context(|| format!("Failed to read record: {}", record_path.display()))?;
    let record: AuthenticationRecord = serde_json::from_slice(&bytes)
        .with_context(|| format!("Malformed authentication record: {}", record_path.display()))?;
    let valid = authenticator.verify(&record);
    println!("Signature valid: {}", valid);
    Ok(())
}

/// CLI entry: compare a file's current hashes against a persisted record.
pub fn run_integrity(config: &Config, file: &Path, record_path: &Path) -> Result<()> {
    let authenticator = EvidenceAuthenticator::open(&config.evidence.dir)?;
    let bytes = std::fs::read(record_path)
        .with_context(|| format!("Failed to read record: {}", record_path.display()))?;
    let record: AuthenticationRecord = serde_json::from_slice(&bytes)
        .with_context(|| format!("Malformed authentication record: {}", record_path.display()))?;
    let report = authenticator.check_integrity(file, &record)?;
    println!("Integrity status: {}", report.integrity_status);
    for (algo, cmp) in &report.hash_comparison {
        println!(
            "  {:<8} {}",
            algo,
            if cmp.matches { "match" } else { "MISMATCH" }
        );
    }
    Ok(())
}
