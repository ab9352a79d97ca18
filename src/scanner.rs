//! Depth-bounded recursive scanner over a document tree.
//!
//! Extends the catalog's flat scan with manual recursion, a visited-path
//! set that terminates symlink cycles, optional symlink following, and
//! inline handling of archive containers and email message files.
//! Container extraction is deliberately deferred: archives are cataloged
//! as stub records noting that extraction is pending, and their nested
//! entries are not indexed.
//!
//! Failure policy: permission denial while listing a directory is logged
//! at warn level and siblings continue; any other traversal error
//! abandons that subtree with an error log. A single file's failure never
//! aborts the scan.

use anyhow::Result;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::cache::CacheStore;
use crate::catalog::{extension_of, DocumentCatalog};
use crate::config::Config;
use crate::extract;
use crate::mailfile;
use crate::models::DocumentRecord;
use crate::remote_mail;

const COMMUNICATION_EXTENSIONS: &[&str] = &[".eml", ".msg", ".mbox", ".pst", ".ost"];
const ARCHIVE_EXTENSIONS: &[&str] = &[".zip", ".tar", ".gz", ".7z", ".rar"];
/// Legacy word-processor formats cataloged as stubs; `.docx` goes through
/// the extractor instead.
const WORD_PROCESSOR_EXTENSIONS: &[&str] = &[".doc", ".rtf", ".odt", ".pages"];

pub struct RecursiveScanner<'a> {
    catalog: &'a DocumentCatalog,
    max_depth: usize,
    follow_symlinks: bool,
    max_file_bytes: u64,
    relevance: Vec<Regex>,
    visited: HashSet<PathBuf>,
}

impl<'a> RecursiveScanner<'a> {
    pub fn new(catalog: &'a DocumentCatalog, config: &Config) -> Result<Self> {
        Ok(Self {
            catalog,
            max_depth: config.scan.max_depth,
            follow_symlinks: config.scan.follow_symlinks,
            max_file_bytes: config.scan.max_file_mb * 1024 * 1024,
            relevance: mailfile::compile_relevance_patterns(&config.scan.relevance_patterns)?,
            visited: HashSet::new(),
        })
    }

    /// Walks the tree rooted at the catalog's scan root and returns a
    /// best-effort flat collection of records. Failures are visible only
    /// in logs.
    pub fn scan(&mut self) -> Vec<DocumentRecord> {
        let root = self.catalog.root().to_path_buf();
        let mut documents = Vec::new();
        self.scan_directory(&root, 0, &mut documents);
        info!(count = documents.len(), "recursive scan complete");
        documents
    }

    fn scan_directory(&mut self, path: &Path, depth: usize, out: &mut Vec<DocumentRecord>) {
        if depth > self.max_depth {
            return;
        }
        let abs = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if !self.visited.insert(abs) {
            return;
        }

        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!(dir = %path.display(), "permission denied");
                return;
            }
            Err(e) => {
                error!(dir = %path.display(), error = %e, "error scanning directory");
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!(dir = %path.display(), error = %e, "error reading directory entry");
                    continue;
                }
            };
            let entry_path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    warn!(file = %entry_path.display(), error = %e, "cannot stat entry");
                    continue;
                }
            };

            if file_type.is_file() {
                if let Some(record) = self.process_file(&entry_path) {
                    out.push(record);
                }
            } else if file_type.is_dir() {
                let hidden = entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with('.');
                if !hidden {
                    self.scan_directory(&entry_path, depth + 1, out);
                }
            } else if file_type.is_symlink() && self.follow_symlinks {
                match std::fs::canonicalize(&entry_path) {
                    Ok(target) if target.is_file() => {
                        if let Some(record) = self.process_file(&target) {
                            out.push(record);
                        }
                    }
                    Ok(target) if target.is_dir() => {
                        self.scan_directory(&target, depth + 1, out);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(link = %entry_path.display(), error = %e, "dangling symlink");
                    }
                }
            }
        }
    }

    /// Eligibility filter: supported extension, not a temp/hidden name,
    /// not excluded by glob, under the size ceiling.
    fn should_process(&self, path: &Path, ext: &str) -> bool {
        if !is_scannable_extension(ext) {
            return false;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.starts_with('~') || name.starts_with('.') {
            return false;
        }
        let relative = path
            .strip_prefix(self.catalog.root())
            .unwrap_or(path)
            .to_string_lossy();
        if self.catalog.is_excluded(&relative) {
            return false;
        }
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > self.max_file_bytes => {
                warn!(file = %path.display(), size = meta.len(), "skipping oversized file");
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "cannot access file");
                false
            }
        }
    }

    fn process_file(&self, path: &Path) -> Option<DocumentRecord> {
        let ext = extension_of(path);
        if !self.should_process(path, &ext) {
            return None;
        }
        let result = if extract::SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            self.catalog.process(path)
        } else if COMMUNICATION_EXTENSIONS.contains(&ext.as_str()) {
            self.process_communication(path, &ext)
        } else if ARCHIVE_EXTENSIONS.contains(&ext.as_str()) {
            self.process_archive(path, &ext)
        } else if WORD_PROCESSOR_EXTENSIONS.contains(&ext.as_str()) {
            self.stub(path, &ext, format!("{} document - requires extraction", ext))
        } else {
            return None;
        };
        match result {
            Ok(record) => Some(record),
            Err(e) => {
                error!(file = %path.display(), error = %e, "failed to process file");
                None
            }
        }
    }

    fn process_communication(&self, path: &Path, ext: &str) -> Result<DocumentRecord> {
        match ext {
            ".eml" => mailfile::process_eml(self.catalog, path, &self.relevance),
            ".msg" => self.stub(
                path,
                ext,
                "Outlook message file - requires specialized extraction".to_string(),
            ),
            _ => {
                info!(file = %path.display(), "found mailbox file, cataloging without extraction");
                self.stub(path, ext, "Mailbox file - requires extraction".to_string())
            }
        }
    }

    /// Archives become opaque stub records. For ZIPs the stub's content
    /// also lists entry names, metadata only; nested entries are never
    /// extracted or indexed.
    fn process_archive(&self, path: &Path, ext: &str) -> Result<DocumentRecord> {
        info!(file = %path.display(), "found archive, cataloging without extraction");
        let content = if ext == ".zip" {
            match list_zip_entries(path) {
                Ok(names) if !names.is_empty() => format!(
                    "Archive file containing multiple documents - requires extraction\nEntries:\n{}",
                    names.join("\n")
                ),
                Ok(_) => "Archive file containing multiple documents - requires extraction"
                    .to_string(),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "cannot list archive entries");
                    "Archive file containing multiple documents - requires extraction".to_string()
                }
            }
        } else {
            "Archive file containing multiple documents - requires extraction".to_string()
        };
        self.stub(path, ext, content)
    }

    fn stub(&self, path: &Path, ext: &str, content: String) -> Result<DocumentRecord> {
        let digest = CacheStore::content_hash(path)?;
        self.catalog.stub_record(path, ext, content, &digest)
    }
}

fn is_scannable_extension(ext: &str) -> bool {
    extract::SUPPORTED_EXTENSIONS.contains(&ext)
        || COMMUNICATION_EXTENSIONS.contains(&ext)
        || ARCHIVE_EXTENSIONS.contains(&ext)
        || WORD_PROCESSOR_EXTENSIONS.contains(&ext)
}

fn list_zip_entries(path: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index(i)?.name().to_string());
    }
    Ok(names)
}

/// Runs a full recursive scan, including remote email ingestion when
/// configured, prints a per-category summary, and optionally writes the
/// record collection to a JSON file.
pub async fn run_scan(config: &Config, export: Option<&Path>) -> Result<()> {
    let catalog = DocumentCatalog::new(config)?;
    let mut scanner = RecursiveScanner::new(&catalog, config)?;
    let mut documents = scanner.scan();

    if let Some(remote) = &config.connectors.remote_email {
        let remote_docs = remote_mail::fetch_remote_emails(remote).await;
        documents.extend(remote_docs);
    }

    let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
    for doc in &documents {
        *by_category.entry(doc.category.clone()).or_default() += 1;
    }

    println!("Scanned {} documents", documents.len());
    for (category, count) in &by_category {
        println!("  {:<24} {}", category, count);
    }

    if let Some(path) = export {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&documents)?)?;
        println!("Wrote {} records to {}", documents.len(), path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_in(root: &Path, extra: &str) -> Config {
        let body = format!(
            r#"[scan]
root = "{}"
{}

[cache]
dir = "{}"

[evidence]
dir = "{}"
"#,
            root.display(),
            extra,
            root.join(".ftr_cache").display(),
            root.join(".ftr_evidence").display(),
        );
        let cfg_path = root.join("ftr.toml");
        std::fs::write(&cfg_path, body).unwrap();
        crate::config::load_config(&cfg_path).unwrap()
    }

    fn scan_tree(config: &Config) -> Vec<DocumentRecord> {
        let catalog = DocumentCatalog::new(config).unwrap();
        let mut scanner = RecursiveScanner::new(&catalog, config).unwrap();
        scanner.scan()
    }

    #[test]
    fn scans_nested_tree_and_skips_hidden() {
        let tmp = tempfile::TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(docs.join("04_Wire_Transfers")).unwrap();
        std::fs::create_dir_all(docs.join(".git")).unwrap();
        std::fs::write(docs.join("note.txt"), "hello").unwrap();
        std::fs::write(
            docs.join("04_Wire_Transfers").join("june.csv"),
            "date,amount\n2021-06-01,2500\n",
        )
        .unwrap();
        std::fs::write(docs.join(".git").join("config.txt"), "ignored").unwrap();
        std::fs::write(docs.join(".skip.txt"), "ignored").unwrap();
        std::fs::write(docs.join("~tmp.txt"), "ignored").unwrap();

        let config = config_in(&docs, "");
        let records = scan_tree(&config);
        let mut names: Vec<_> = records.iter().map(|r| r.file_name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["june.csv", "note.txt"]);
    }

    #[test]
    fn exclude_globs_apply_to_recursive_scans() {
        let tmp = tempfile::TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(docs.join("drafts")).unwrap();
        std::fs::write(docs.join("note.txt"), "keep").unwrap();
        std::fs::write(docs.join("drafts").join("wip.txt"), "skip").unwrap();

        let config = config_in(&docs, r#"exclude_globs = ["drafts/**"]"#);
        let records = scan_tree(&config);
        let names: Vec<_> = records.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["note.txt"]);
    }

    #[test]
    fn depth_limit_bounds_recursion() {
        let tmp = tempfile::TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        let deep = docs.join("a").join("b").join("c");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(docs.join("top.txt"), "top").unwrap();
        std::fs::write(deep.join("deep.txt"), "deep").unwrap();

        let config = config_in(&docs, "max_depth = 2");
        let records = scan_tree(&config);
        let names: Vec<_> = records.iter().map(|r| r.file_name.as_str()).collect();
        assert!(names.contains(&"top.txt"));
        assert!(!names.contains(&"deep.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycle_terminates_and_visits_once() {
        let tmp = tempfile::TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        let sub = docs.join("sub");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("real.txt"), "real").unwrap();
        std::os::unix::fs::symlink(&docs, sub.join("loop")).unwrap();

        let config = config_in(&docs, "follow_symlinks = true");
        let records = scan_tree(&config);
        let count = records.iter().filter(|r| r.file_name == "real.txt").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn oversized_file_is_skipped() {
        let tmp = tempfile::TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("small.txt"), "ok").unwrap();
        std::fs::write(docs.join("huge.txt"), vec![b'x'; 2 * 1024 * 1024]).unwrap();

        let config = config_in(&docs, "max_file_mb = 1");
        let records = scan_tree(&config);
        let names: Vec<_> = records.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["small.txt"]);
    }

    #[test]
    fn archive_becomes_stub_with_entry_listing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();

        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            writer
                .start_file("inner/ledger.csv", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"date,amount\n").unwrap();
            writer.finish().unwrap();
        }
        std::fs::write(docs.join("evidence.zip"), &buf).unwrap();

        let config = config_in(&docs, "");
        let records = scan_tree(&config);
        assert_eq!(records.len(), 1);
        let stub = &records[0];
        assert!(stub.requires_extraction);
        assert!(stub.content.contains("requires extraction"));
        assert!(stub.content.contains("inner/ledger.csv"));
    }

    #[test]
    fn eml_is_parsed_inline() {
        let tmp = tempfile::TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(
            docs.join("wire.eml"),
            b"From: alice@example.com\r\nTo: bob@example.com\r\nSubject: Wire\r\n\
Content-Type: text/plain\r\n\r\nwire the funds\r\n",
        )
        .unwrap();

        let config = config_in(&docs, "");
        let records = scan_tree(&config);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, "communications");
        assert!(records[0].email_metadata.is_some());
    }
}
