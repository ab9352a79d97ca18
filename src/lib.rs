//! # FundTrace
//!
//! A document-intake and evidence-handling pipeline for financial
//! forensics investigations.
//!
//! FundTrace walks a case's document tree (bank statements, wire
//! records, contracts, mailbox exports), extracts text per format with
//! graceful fallbacks, caches results by content hash, and classifies
//! every file into investigation categories. Evidentiary files can be
//! authenticated with RSA-signed records, tracked through a
//! chain-of-custody log, and bundled into portable packages for
//! external submission. Extracted text feeds a chunked search index
//! with an optional embedding and analysis layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Scanner     │──▶│   Catalog     │──▶│  Cache (JSON  │
//! │ walk + guards │   │ extract+class │   │  per sha256)  │
//! └──────────────┘   └──────┬───────┘   └──────────────┘
//!                           │
//!            ┌──────────────┼──────────────┐
//!            ▼              ▼              ▼
//!      ┌──────────┐   ┌──────────┐   ┌──────────────┐
//!      │  Index    │   │ Evidence │   │   Package     │
//!      │ chunk+vec │   │ sign+log │   │ export bundle │
//!      └────┬─────┘   └──────────┘   └──────────────┘
//!           ▼
//!      ┌──────────┐
//!      │ Ask (RAG) │
//!      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ftr init-config                       # write starter ftr.toml
//! ftr scan --export records.json        # recursive intake scan
//! ftr index                             # chunk + index extractable text
//! ftr search "wire transfer"            # query the index
//! ftr authenticate ./docs/contract.pdf --custodian "A. Reyes"
//! ftr export ./package contract.pdf     # authentication package
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`cache`] | Content-addressed extraction cache |
//! | [`extract`] | Per-format text extraction with fallbacks |
//! | [`catalog`] | Record construction, classification, flat scans |
//! | [`scanner`] | Recursive scan with depth/size/cycle guards |
//! | [`mailfile`] | `.eml` parsing and relevance filtering |
//! | [`remote_mail`] | Remote mailbox-export ingestion |
//! | [`authenticate`] | RSA-signed evidence authentication |
//! | [`custody`] | Chain-of-custody log |
//! | [`package`] | Authentication-package export |
//! | [`chunkpipe`] | Paragraph-boundary text chunking |
//! | [`index`] | Vector index seam + in-memory index |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`analysis`] | Retrieval-augmented question answering |

pub mod analysis;
pub mod authenticate;
pub mod cache;
pub mod catalog;
pub mod chunkpipe;
pub mod config;
pub mod custody;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod mailfile;
pub mod models;
pub mod package;
pub mod remote_mail;
pub mod scanner;
