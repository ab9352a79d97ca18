//! Document catalog: turns a raw filesystem path into a structured
//! [`DocumentRecord`].
//!
//! The catalog is cache-first: a hit returns the cached record verbatim
//! with no re-extraction and no re-stat. On a miss it extracts text,
//! stats the file, classifies it against the injected category table,
//! writes the assembled record through to the cache, and returns it.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::error;
use walkdir::WalkDir;

use crate::cache::CacheStore;
use crate::config::{CategoryRule, Config};
use crate::extract;
use crate::models::DocumentRecord;

pub struct DocumentCatalog {
    cache: CacheStore,
    root: PathBuf,
    /// (category, path prefix) pairs, longest prefix first.
    category_rules: Vec<(String, String)>,
    exclude_set: GlobSet,
}

/// Path segments that force the `communications` category regardless of
/// the configured prefix table.
const COMMUNICATION_HINTS: &[&str] = &["email", "mail", "communication", "correspond"];

impl DocumentCatalog {
    pub fn new(config: &Config) -> Result<Self> {
        let cache = CacheStore::open(&config.cache.dir)?;
        let category_rules = flatten_category_rules(&config.categories);

        // Never re-ingest the tool's own data directories. Patterns are
        // matched against root-relative paths, so cache/evidence dirs
        // outside the scan root need no entry.
        let mut excludes = Vec::new();
        for dir in [&config.cache.dir, &config.evidence.dir] {
            if let Ok(relative) = dir.strip_prefix(&config.scan.root) {
                excludes.push(format!("{}/**", relative.display()));
            }
        }
        excludes.extend(config.scan.exclude_globs.clone());
        let exclude_set = build_globset(&excludes)?;

        Ok(Self {
            cache,
            root: config.scan.root.clone(),
            category_rules,
            exclude_set,
        })
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_excluded(&self, relative: &str) -> bool {
        self.exclude_set.is_match(relative)
    }

    /// Processes one file, cache-first.
    pub fn process(&self, path: &Path) -> Result<DocumentRecord> {
        let digest = CacheStore::content_hash(path)?;
        if let Some(record) = self.cache.load(&digest) {
            return Ok(record);
        }

        let file_type = extension_of(path);
        let content = extract::extract_text(path, &file_type);
        let mut record = self.stub_record(path, &file_type, content, &digest)?;
        record.requires_extraction = false;
        self.cache.save(&record);
        Ok(record)
    }

    /// Assembles a record from filesystem facts without consulting the
    /// cache or the extractor. Used for container and mailbox stubs whose
    /// `content` is a note rather than extracted text.
    pub fn stub_record(
        &self,
        path: &Path,
        file_type: &str,
        content: String,
        digest: &str,
    ) -> Result<DocumentRecord> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat file: {}", path.display()))?;
        let modified: DateTime<Utc> = metadata
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
            .into();
        let relative = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();

        Ok(DocumentRecord {
            file_path: path.to_string_lossy().to_string(),
            relative_path: relative.clone(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            file_type: file_type.to_string(),
            file_size: metadata.len(),
            modified_time: modified.to_rfc3339_opts(SecondsFormat::Secs, true),
            content_length: content.len(),
            content,
            category: self.classify(&relative),
            content_hash: digest.to_string(),
            email_metadata: None,
            requires_extraction: true,
            source: None,
        })
    }

    /// Longest-prefix-first match of the relative path against the
    /// configured category table. Path segments carrying communication
    /// keywords short-circuit to `communications`; no match yields
    /// `"other"`.
    pub fn classify(&self, relative_path: &str) -> String {
        let path_lower = relative_path.to_lowercase();
        if COMMUNICATION_HINTS.iter().any(|t| path_lower.contains(t)) {
            return "communications".to_string();
        }
        for (category, prefix) in &self.category_rules {
            if path_lower.starts_with(prefix) {
                return category.clone();
            }
        }
        "other".to_string()
    }

    /// Flat scan of the configured root: supported extensions only,
    /// hidden path segments and excluded globs skipped. A single file's
    /// failure is logged and excluded; the scan never aborts.
    pub fn scan_root(&self) -> Vec<DocumentRecord> {
        let mut records = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            if has_hidden_segment(&relative) || self.exclude_set.is_match(&relative) {
                continue;
            }
            let file_type = extension_of(path);
            if !extract::SUPPORTED_EXTENSIONS.contains(&file_type.as_str()) {
                continue;
            }
            match self.process(path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    error!(file = %path.display(), error = %e, "failed to process file");
                }
            }
        }
        records
    }
}

/// Lowercase extension including the dot, or empty for extensionless
/// files.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn has_hidden_segment(relative: &str) -> bool {
    relative
        .split(['/', '\\'])
        .any(|part| part.starts_with('.'))
}

fn flatten_category_rules(categories: &BTreeMap<String, CategoryRule>) -> Vec<(String, String)> {
    let mut rules: Vec<(String, String)> = categories
        .iter()
        .flat_map(|(name, rule)| {
            rule.paths
                .iter()
                .map(|p| (name.clone(), p.to_lowercase()))
        })
        .collect();
    rules.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.1.cmp(&b.1)));
    rules
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid exclude glob: '{}'", pattern))?,
        );
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_in(root: &Path, categories_toml: &str) -> DocumentCatalog {
        let body = format!(
            r#"[scan]
root = "{}"

[cache]
dir = "{}"

[evidence]
dir = "{}"

{}"#,
            root.display(),
            root.join(".ftr_cache").display(),
            root.join(".ftr_evidence").display(),
            categories_toml
        );
        let cfg_path = root.join("ftr.toml");
        std::fs::write(&cfg_path, body).unwrap();
        let cfg = crate::config::load_config(&cfg_path).unwrap();
        DocumentCatalog::new(&cfg).unwrap()
    }

    #[test]
    fn classify_prefers_longest_prefix() {
        let tmp = tempfile::TempDir::new().unwrap();
        let catalog = catalog_in(
            tmp.path(),
            r#"[categories.bank_statements]
paths = ["01_Bank"]

[categories.bank_statements_archived]
paths = ["01_Bank/Archived"]
"#,
        );
        assert_eq!(
            catalog.classify("01_Bank/Archived/jan.pdf"),
            "bank_statements_archived"
        );
        assert_eq!(catalog.classify("01_Bank/jan.pdf"), "bank_statements");
        assert_eq!(catalog.classify("99_Misc/x.pdf"), "other");
    }

    #[test]
    fn classify_detects_communication_paths() {
        let tmp = tempfile::TempDir::new().unwrap();
        let catalog = catalog_in(tmp.path(), "");
        assert_eq!(catalog.classify("Email_Exports/thread.txt"), "communications");
        assert_eq!(
            catalog.classify("Correspondence/lawyer.pdf"),
            "communications"
        );
    }

    #[test]
    fn process_is_a_cache_hit_the_second_time() {
        let tmp = tempfile::TempDir::new().unwrap();
        let catalog = catalog_in(tmp.path(), "");
        let file = tmp.path().join("note.txt");
        std::fs::write(&file, "hello").unwrap();

        let first = catalog.process(&file).unwrap();
        assert_eq!(first.content, "hello");

        // Swap the cached entry's content to prove the second call never
        // re-extracts.
        let mut cached = catalog.cache().load(&first.content_hash).unwrap();
        cached.content = "from cache".to_string();
        catalog.cache().save(&cached);

        let second = catalog.process(&file).unwrap();
        assert_eq!(second.content, "from cache");
    }

    #[test]
    fn identical_files_collapse_to_one_cache_entry() {
        let tmp = tempfile::TempDir::new().unwrap();
        let catalog = catalog_in(tmp.path(), "");
        let a = tmp.path().join("a.txt");
        let nested = tmp.path().join("sub");
        std::fs::create_dir_all(&nested).unwrap();
        let b = nested.join("b.txt");
        std::fs::write(&a, "same bytes").unwrap();
        std::fs::write(&b, "same bytes").unwrap();

        let ra = catalog.process(&a).unwrap();
        let rb = catalog.process(&b).unwrap();
        assert_eq!(ra.content_hash, rb.content_hash);

        let entries = std::fs::read_dir(catalog.cache().dir())
            .unwrap()
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn scan_root_skips_hidden_and_unsupported() {
        let tmp = tempfile::TempDir::new().unwrap();
        let catalog = catalog_in(tmp.path(), "");
        std::fs::write(tmp.path().join("note.txt"), "hello").unwrap();
        std::fs::write(tmp.path().join(".skip.txt"), "hidden").unwrap();
        std::fs::write(tmp.path().join("blob.bin"), "binary").unwrap();

        let records = catalog.scan_root();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_name, "note.txt");
    }

    #[test]
    fn cache_directory_under_the_root_is_not_reingested() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache_dir = tmp.path().join("cache_data");
        let body = format!(
            r#"[scan]
root = "{}"

[cache]
dir = "{}"

[evidence]
dir = "{}"
"#,
            tmp.path().display(),
            cache_dir.display(),
            tmp.path().join("evidence_data").display(),
        );
        let cfg_path = tmp.path().join("ftr.toml");
        std::fs::write(&cfg_path, body).unwrap();
        let cfg = crate::config::load_config(&cfg_path).unwrap();
        let catalog = DocumentCatalog::new(&cfg).unwrap();

        std::fs::write(tmp.path().join("note.txt"), "hello").unwrap();
        std::fs::write(cache_dir.join("stray.txt"), "never a document").unwrap();

        assert!(catalog.is_excluded("cache_data/stray.txt"));
        let records = catalog.scan_root();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_name, "note.txt");
    }

    #[test]
    fn scan_root_survives_one_bad_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let catalog = catalog_in(tmp.path(), "");
        std::fs::write(tmp.path().join("good.txt"), "fine").unwrap();
        std::fs::write(tmp.path().join("bad.pdf"), b"not a pdf").unwrap();

        // The corrupt PDF degrades to empty content rather than aborting.
        let records = catalog.scan_root();
        assert_eq!(records.len(), 2);
        let bad = records.iter().find(|r| r.file_name == "bad.pdf").unwrap();
        assert_eq!(bad.content, "");
    }
}
