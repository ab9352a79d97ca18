use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ftr_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ftr");
    path
}

fn run_ftr(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ftr_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ftr binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn setup_evidence_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("contract.pdf"),
        b"not a real pdf, but hashes and signatures do not care",
    )
    .unwrap();

    let config_content = format!(
        r#"[scan]
root = "{root}/docs"

[cache]
dir = "{root}/cache"

[evidence]
dir = "{root}/evidence"
"#,
        root = root.display()
    );

    let config_path = root.join("ftr.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

/// The single `<id>_auth.json` record in the evidence directory.
fn find_auth_record(evidence_dir: &Path) -> PathBuf {
    let mut records: Vec<PathBuf> = fs::read_dir(evidence_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().ends_with("_auth.json"))
                .unwrap_or(false)
        })
        .collect();
    assert_eq!(records.len(), 1, "expected exactly one auth record");
    records.pop().unwrap()
}

#[test]
fn test_authenticate_verify_integrity_flow() {
    let (tmp, config_path) = setup_evidence_env();
    let file = tmp.path().join("docs").join("contract.pdf");

    let (stdout, stderr, success) = run_ftr(
        &config_path,
        &[
            "authenticate",
            file.to_str().unwrap(),
            "--custodian",
            "A. Reyes",
        ],
    );
    assert!(
        success,
        "authenticate failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("Authenticated contract.pdf"));

    let evidence_dir = tmp.path().join("evidence");
    assert!(evidence_dir.join("signing_key.pem").exists());
    assert!(evidence_dir.join("public_key.pem").exists());
    assert!(evidence_dir.join("chain_of_custody.json").exists());

    let record_path = find_auth_record(&evidence_dir);
    let record: serde_json::Value =
        serde_json::from_slice(&fs::read(&record_path).unwrap()).unwrap();
    assert_eq!(record["custodian"], "A. Reyes");
    assert_eq!(record["signature_algorithm"], "RSA-2048-SHA256");
    assert_eq!(record["hashes"]["sha256"].as_str().unwrap().len(), 64);
    assert_eq!(record["hashes"]["md5"].as_str().unwrap().len(), 32);
    // Record file name carries the 16-char authentication id.
    let stem = record_path.file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(stem.trim_end_matches("_auth.json").len(), 16);

    let (stdout, _, success) = run_ftr(&config_path, &["verify", record_path.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("Signature valid: true"));

    let (stdout, _, success) = run_ftr(
        &config_path,
        &[
            "integrity",
            file.to_str().unwrap(),
            record_path.to_str().unwrap(),
        ],
    );
    assert!(success);
    assert!(stdout.contains("Integrity status: verified"));
}

#[test]
fn test_tampering_is_detected() {
    let (tmp, config_path) = setup_evidence_env();
    let file = tmp.path().join("docs").join("contract.pdf");

    let (_, _, success) = run_ftr(&config_path, &["authenticate", file.to_str().unwrap()]);
    assert!(success);
    let record_path = find_auth_record(&tmp.path().join("evidence"));

    // Edit the evidence after authentication.
    fs::write(&file, b"edited after the fact").unwrap();

    let (stdout, _, success) = run_ftr(
        &config_path,
        &[
            "integrity",
            file.to_str().unwrap(),
            record_path.to_str().unwrap(),
        ],
    );
    assert!(success, "integrity check reports, never fails the command");
    assert!(stdout.contains("Integrity status: compromised"));
    assert!(stdout.contains("MISMATCH"));

    // A tampered record no longer verifies.
    let mut record: serde_json::Value =
        serde_json::from_slice(&fs::read(&record_path).unwrap()).unwrap();
    record["custodian"] = serde_json::Value::String("Mallory".to_string());
    fs::write(&record_path, serde_json::to_string(&record).unwrap()).unwrap();
    let (stdout, _, success) = run_ftr(&config_path, &["verify", record_path.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("Signature valid: false"));
}

#[test]
fn test_transfer_and_custody_listing() {
    let (tmp, config_path) = setup_evidence_env();
    let file = tmp.path().join("docs").join("contract.pdf");

    let (_, _, success) = run_ftr(
        &config_path,
        &[
            "authenticate",
            file.to_str().unwrap(),
            "--custodian",
            "A. Reyes",
        ],
    );
    assert!(success);

    let (stdout, stderr, success) = run_ftr(
        &config_path,
        &[
            "transfer",
            "contract.pdf",
            "--from",
            "A. Reyes",
            "--to",
            "Expert Witness",
            "--reason",
            "expert review",
        ],
    );
    assert!(
        success,
        "transfer failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("A. Reyes -> Expert Witness"));

    let (stdout, _, success) = run_ftr(&config_path, &["custody", "--file", "contract.pdf"]);
    assert!(success);
    assert!(stdout.contains("authenticated"));
    assert!(stdout.contains("transfer"));
    assert!(stdout.contains("expert review"));

    let log: serde_json::Value = serde_json::from_slice(
        &fs::read(tmp.path().join("evidence").join("chain_of_custody.json")).unwrap(),
    )
    .unwrap();
    let entries = log.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["action"], "document_authenticated");
    assert_eq!(entries[1]["action"], "custody_transfer");
    assert_eq!(entries[1]["transfer_id"].as_str().unwrap().len(), 16);
}

#[test]
fn test_export_builds_portable_package() {
    let (tmp, config_path) = setup_evidence_env();
    let file = tmp.path().join("docs").join("contract.pdf");
    let package = tmp.path().join("package");

    let (_, _, success) = run_ftr(
        &config_path,
        &[
            "authenticate",
            file.to_str().unwrap(),
            "--custodian",
            "A. Reyes",
        ],
    );
    assert!(success);

    let (stdout, stderr, success) = run_ftr(
        &config_path,
        &["export", package.to_str().unwrap(), "contract.pdf"],
    );
    assert!(
        success,
        "export failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("files authenticated: 1"));
    assert!(stdout.contains("integrity verified:  1"));

    assert!(package.join("authentication_records.json").exists());
    assert!(package.join("integrity_verification.json").exists());
    assert!(package.join("chain_of_custody.json").exists());
    assert!(package.join("public_key.pem").exists());

    let records: serde_json::Value = serde_json::from_slice(
        &fs::read(package.join("authentication_records.json")).unwrap(),
    )
    .unwrap();
    assert!(records["contract.pdf"]["digital_signature"].is_string());
}
