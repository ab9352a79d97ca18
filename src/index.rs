//! Vector index seam and the in-memory reference implementation.
//!
//! The vector store proper is an external collaborator; this module
//! carries its contract ([`VectorIndex`]) plus an in-memory index so the
//! pipeline is drivable end-to-end: keyword term-overlap scoring is
//! always available, cosine similarity is used when chunk vectors are
//! present, and the whole index round-trips through a JSON snapshot so
//! the `index` and `search` commands compose across process runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;
use tracing::info;

use crate::catalog::DocumentCatalog;
use crate::chunkpipe;
use crate::config::Config;
use crate::embedding::{self, cosine_similarity};
use crate::models::{DocumentChunk, IndexedDocument, SearchMatch};

const SNIPPET_CHARS: usize = 240;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Adds one document's chunks, replacing any prior chunks for the
    /// same content hash. `vectors`, when present, is parallel to
    /// `chunks`.
    async fn add_chunks(
        &self,
        document: &IndexedDocument,
        chunks: &[DocumentChunk],
        vectors: Option<&[Vec<f32>]>,
    ) -> Result<()>;

    /// Top-k matches for a query: cosine over `query_vec` when given,
    /// keyword term overlap otherwise.
    async fn search(
        &self,
        query: &str,
        query_vec: Option<&[f32]>,
        top_k: usize,
    ) -> Result<Vec<SearchMatch>>;
}

#[derive(Serialize, Deserialize, Clone)]
struct IndexEntry {
    chunk: DocumentChunk,
    document: IndexedDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vector: Option<Vec<f32>>,
}

/// Brute-force in-memory index behind an `RwLock`.
pub struct InMemoryIndex {
    entries: RwLock<Vec<IndexEntry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read index snapshot: {}", path.display()))?;
        let entries: Vec<IndexEntry> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Malformed index snapshot: {}", path.display()))?;
        Ok(Self {
            entries: RwLock::new(entries),
        })
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let entries = self.entries.read().unwrap();
        std::fs::write(path, serde_json::to_string(&*entries)?)
            .with_context(|| format!("Failed to write index snapshot: {}", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn snippet_of(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn add_chunks(
        &self,
        document: &IndexedDocument,
        chunks: &[DocumentChunk],
        vectors: Option<&[Vec<f32>]>,
    ) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|e| e.document.content_hash != document.content_hash);
        for (i, chunk) in chunks.iter().enumerate() {
            entries.push(IndexEntry {
                chunk: chunk.clone(),
                document: document.clone(),
                vector: vectors.and_then(|vs| vs.get(i).cloned()),
            });
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        query_vec: Option<&[f32]>,
        top_k: usize,
    ) -> Result<Vec<SearchMatch>> {
        let entries = self.entries.read().unwrap();
        let mut matches: Vec<SearchMatch> = if let Some(qv) = query_vec {
            entries
                .iter()
                .filter_map(|e| {
                    let vector = e.vector.as_deref()?;
                    Some(SearchMatch {
                        chunk_id: e.chunk.id.clone(),
                        score: cosine_similarity(qv, vector) as f64,
                        snippet: snippet_of(&e.chunk.text),
                        document: e.document.clone(),
                    })
                })
                .collect()
        } else {
            let query_lower = query.to_lowercase();
            let terms: Vec<&str> = query_lower.split_whitespace().collect();
            if terms.is_empty() {
                return Ok(Vec::new());
            }
            entries
                .iter()
                .filter_map(|e| {
                    let text_lower = e.chunk.text.to_lowercase();
                    let hits = terms.iter().filter(|t| text_lower.contains(*t)).count();
                    if hits == 0 {
                        return None;
                    }
                    Some(SearchMatch {
                        chunk_id: e.chunk.id.clone(),
                        score: hits as f64,
                        snippet: snippet_of(&e.chunk.text),
                        document: e.document.clone(),
                    })
                })
                .collect()
        };

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// CLI entry: scan the root's extractable documents, chunk them, embed
/// when configured, and write the index snapshot.
pub async fn run_index(config: &Config) -> Result<()> {
    // Constructing the provider first surfaces a missing model or API
    // key before any documents are processed.
    let provider = if config.embedding.is_enabled() {
        let provider = embedding::create_provider(&config.embedding)?;
        info!(
            model = provider.model_name(),
            dims = provider.dims(),
            "embedding enabled"
        );
        Some(provider)
    } else {
        None
    };

    let catalog = DocumentCatalog::new(config)?;
    let records = catalog.scan_root();
    let index = InMemoryIndex::new();

    let mut chunk_count = 0usize;
    let mut doc_count = 0usize;
    for record in &records {
        let chunks = chunkpipe::chunk_record(record, config.indexing.max_tokens);
        if chunks.is_empty() {
            continue;
        }
        let vectors = if let Some(provider) = &provider {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            Some(provider.embed_texts(&texts).await?)
        } else {
            None
        };
        let document = IndexedDocument::from_record(record);
        chunk_count += chunks.len();
        doc_count += 1;
        index
            .add_chunks(&document, &chunks, vectors.as_deref())
            .await?;
    }

    index.save_snapshot(&config.indexing.snapshot)?;
    info!(documents = doc_count, chunks = chunk_count, "index updated");
    println!(
        "Indexed {} documents ({} chunks) into {}",
        doc_count,
        chunk_count,
        config.indexing.snapshot.display()
    );
    Ok(())
}

/// CLI entry: query the snapshot and print ranked matches.
pub async fn run_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    let index = InMemoryIndex::load_snapshot(&config.indexing.snapshot)?;
    let query_vec = if config.embedding.is_enabled() {
        let provider = embedding::create_provider(&config.embedding)?;
        Some(provider.embed_query(query).await?)
    } else {
        None
    };
    let matches = index.search(query, query_vec.as_deref(), limit).await?;

    if matches.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for (rank, m) in matches.iter().enumerate() {
        println!(
            "{:>2}. [{:.3}] {} ({})",
            rank + 1,
            m.score,
            m.document.relative_path,
            m.document.category
        );
        println!("    {}", m.snippet.replace('\n', " "));
    }
    Ok(())
}
