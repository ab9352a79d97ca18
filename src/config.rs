use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub scan: ScanConfig,
    pub cache: CacheConfig,
    pub evidence: EvidenceConfig,
    /// Category name → path-prefix rules. Classification policy is injected
    /// here rather than baked into the catalog.
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryRule>,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Root of the document tree under investigation.
    pub root: PathBuf,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Files larger than this are skipped with a warning.
    #[serde(default = "default_max_file_mb")]
    pub max_file_mb: u64,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Regexes matched against message headers and body to decide whether
    /// an email belongs to the investigation.
    #[serde(default = "default_relevance_patterns")]
    pub relevance_patterns: Vec<String>,
}

fn default_max_depth() -> usize {
    10
}
fn default_max_file_mb() -> u64 {
    100
}
fn default_relevance_patterns() -> Vec<String> {
    vec![r"[\w\.-]+@[\w\.-]+\.\w+".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvidenceConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CategoryRule {
    pub paths: Vec<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Where the JSON index snapshot is written and read.
    #[serde(default = "default_snapshot")]
    pub snapshot: PathBuf,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            snapshot: default_snapshot(),
        }
    }
}

fn default_max_tokens() -> usize {
    700
}
fn default_snapshot() -> PathBuf {
    PathBuf::from("index.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Endpoint override for OpenAI-compatible servers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Endpoint override for OpenAI-compatible servers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_analysis_timeout")]
    pub timeout_secs: u64,
    /// How many retrieved chunks are handed to the model per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            timeout_secs: default_analysis_timeout(),
            top_k: default_top_k(),
        }
    }
}

fn default_analysis_timeout() -> u64 {
    120
}
fn default_top_k() -> usize {
    6
}

impl AnalysisConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    pub remote_email: Option<RemoteEmailConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteEmailConfig {
    /// Mailbox-export endpoint (POST).
    pub endpoint: String,
    /// Address whose messages are requested.
    pub mailbox: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_token_env() -> String {
    "REMOTE_MAIL_TOKEN".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.scan.max_depth == 0 {
        anyhow::bail!("scan.max_depth must be > 0");
    }
    if config.scan.max_file_mb == 0 {
        anyhow::bail!("scan.max_file_mb must be > 0");
    }
    for pattern in &config.scan.relevance_patterns {
        regex::Regex::new(pattern)
            .with_context(|| format!("Invalid scan.relevance_patterns entry: '{}'", pattern))?;
    }

    if config.indexing.max_tokens == 0 {
        anyhow::bail!("indexing.max_tokens must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.analysis.is_enabled() && config.analysis.model.is_none() {
        anyhow::bail!(
            "analysis.model must be specified when provider is '{}'",
            config.analysis.provider
        );
    }
    match config.analysis.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown analysis provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if let Some(remote) = &config.connectors.remote_email {
        if remote.endpoint.is_empty() {
            anyhow::bail!("connectors.remote_email.endpoint must not be empty");
        }
    }

    Ok(config)
}

/// Starter configuration written by `ftr init-config`.
pub fn starter_toml() -> &'static str {
    r#"[scan]
root = "./documents"
max_depth = 10
follow_symlinks = false
max_file_mb = 100
exclude_globs = []

[cache]
dir = "./.cache"

[evidence]
dir = "./evidence"

[indexing]
max_tokens = 700
snapshot = "./index.json"

[categories.bank_statements]
paths = ["01_Bank_Statements", "02_Brokerage_Statements"]

[categories.wire_transfers]
paths = ["04_Wire_Transfers"]

[categories.property_docs]
paths = ["04_Property_Documentation", "05_Property_Purchases"]

[categories.corporate_governance]
paths = ["07_Corporate_Governance"]

[categories.litigation]
paths = ["08_Litigation_Expenses"]

[categories.tax_documents]
paths = ["09_Tax_Documents"]

[categories.supporting_docs]
paths = ["06_Supporting_Documents"]

[embedding]
provider = "disabled"

[analysis]
provider = "disabled"

# [connectors.remote_email]
# endpoint = "https://mail-export.example.com/api"
# mailbox = "custodian@example.com"
# token_env = "REMOTE_MAIL_TOKEN"
"#
}

pub fn write_starter_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    std::fs::write(path, starter_toml())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}
