//! # FundTrace CLI (`ftr`)
//!
//! The `ftr` binary drives the document-intake and evidence-handling
//! pipeline: scanning a case's document tree, indexing and searching
//! extracted text, authenticating evidentiary files, maintaining the
//! chain-of-custody log, and exporting authentication packages.
//!
//! ## Usage
//!
//! ```bash
//! ftr --config ./ftr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ftr init-config` | Write a starter configuration file |
//! | `ftr scan` | Recursively scan the document root and build the catalog |
//! | `ftr index` | Chunk extractable documents and write the index snapshot |
//! | `ftr search "<query>"` | Query the index |
//! | `ftr ask "<question>"` | Answer a question from indexed documents |
//! | `ftr authenticate <file>` | Create an RSA-signed authentication record |
//! | `ftr verify <record>` | Verify a record's signature |
//! | `ftr integrity <file> <record>` | Compare current hashes against a record |
//! | `ftr transfer <file>` | Record a custody transfer |
//! | `ftr custody` | Print the chain-of-custody log |
//! | `ftr export <dir> <files…>` | Export an authentication package |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fundtrace::{analysis, authenticate, config, custody, index, package, scanner};

/// FundTrace CLI — document intake and evidence handling for financial
/// forensics investigations.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Run `ftr init-config` to generate a starter file.
#[derive(Parser)]
#[command(
    name = "ftr",
    about = "FundTrace — document intake and evidence handling for financial forensics",
    version,
    long_about = "FundTrace scans a case's document tree, extracts and caches text per \
    format, classifies files into investigation categories, authenticates evidentiary \
    files with RSA-signed records and a chain-of-custody log, and indexes extracted \
    text for search and question answering."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./ftr.toml`. Scan root, cache and evidence
    /// directories, categories, and provider settings are read from
    /// this file.
    #[arg(long, global = true, default_value = "./ftr.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file.
    ///
    /// Creates the file named by `--config` with documented defaults.
    /// Refuses to overwrite an existing file unless `--force` is given.
    InitConfig {
        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },

    /// Recursively scan the document root.
    ///
    /// Walks the configured root with depth, size, and symlink-cycle
    /// guards, extracts text per format, classifies every file, and
    /// caches records by content hash. Inline `.eml` messages are
    /// parsed; archives and legacy formats are cataloged as container
    /// stubs. When a remote mailbox connector is configured its
    /// messages are ingested in the same pass.
    Scan {
        /// Write all records to this JSON file after the scan.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Chunk extractable documents and write the index snapshot.
    ///
    /// Runs a flat scan of the root's supported formats, splits each
    /// document's text on paragraph boundaries, embeds the chunks when
    /// an embedding provider is configured, and writes the snapshot
    /// named by `indexing.snapshot`.
    Index,

    /// Search the index.
    ///
    /// Keyword term-overlap scoring by default; cosine over embeddings
    /// when an embedding provider is configured.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Answer a question from indexed documents.
    ///
    /// Retrieves the top-matching chunks, hands them to the configured
    /// analysis provider as grounding, and prints the answer with
    /// source citations. Requires `analysis.provider` to be enabled.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Create an RSA-signed authentication record for a file.
    ///
    /// Computes md5/sha1/sha256/sha512 over the file, probes technical
    /// metadata, signs the record, persists it in the evidence
    /// directory, and appends a chain-of-custody entry.
    Authenticate {
        /// The file to authenticate.
        file: PathBuf,

        /// Person taking custody of the evidence.
        #[arg(long, default_value = "system")]
        custodian: String,

        /// How the file was collected (recorded verbatim).
        #[arg(long, default_value = "automated_collection")]
        method: String,
    },

    /// Verify a persisted authentication record's signature.
    Verify {
        /// Path to the `<id>_auth.json` record.
        record: PathBuf,
    },

    /// Compare a file's current hashes against a record.
    ///
    /// Recomputes all four digests and reports per-algorithm matches
    /// plus an overall verified/compromised status.
    Integrity {
        /// The file to re-hash.
        file: PathBuf,

        /// Path to the `<id>_auth.json` record.
        record: PathBuf,
    },

    /// Record a custody transfer in the chain-of-custody log.
    Transfer {
        /// File name as recorded at authentication time.
        file_name: String,

        /// Custodian releasing the evidence.
        #[arg(long)]
        from: String,

        /// Custodian receiving the evidence.
        #[arg(long)]
        to: String,

        /// Reason for the transfer.
        #[arg(long, default_value = "transfer")]
        reason: String,
    },

    /// Print the chain-of-custody log.
    Custody {
        /// Only show entries for this file name.
        #[arg(long)]
        file: Option<String>,
    },

    /// Export an authentication package for external submission.
    ///
    /// Collects each file's newest authentication record, a fresh
    /// integrity check, the relevant custody entries, and the public
    /// key into one portable directory.
    Export {
        /// Directory the package is written to.
        output_dir: PathBuf,

        /// File names (as authenticated) to include.
        #[arg(required = true)]
        files: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // init-config runs before config loading; everything else needs it.
    if let Commands::InitConfig { force } = &cli.command {
        config::write_starter_config(&cli.config, *force)?;
        println!("Wrote starter config to {}", cli.config.display());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::InitConfig { .. } => unreachable!(),
        Commands::Scan { export } => {
            scanner::run_scan(&cfg, export.as_deref()).await?;
        }
        Commands::Index => {
            index::run_index(&cfg).await?;
        }
        Commands::Search { query, limit } => {
            index::run_search(&cfg, &query, limit).await?;
        }
        Commands::Ask { question } => {
            analysis::run_ask(&cfg, &question).await?;
        }
        Commands::Authenticate {
            file,
            custodian,
            method,
        } => {
            authenticate::run_authenticate(&cfg, &file, &custodian, &method)?;
        }
        Commands::Verify { record } => {
            authenticate::run_verify(&cfg, &record)?;
        }
        Commands::Integrity { file, record } => {
            authenticate::run_integrity(&cfg, &file, &record)?;
        }
        Commands::Transfer {
            file_name,
            from,
            to,
            reason,
        } => {
            custody::run_transfer(&cfg, &file_name, &from, &to, &reason)?;
        }
        Commands::Custody { file } => {
            custody::run_custody(&cfg, file.as_deref())?;
        }
        Commands::Export { output_dir, files } => {
            package::run_export(&cfg, &output_dir, &files)?;
        }
    }

    Ok(())
}
