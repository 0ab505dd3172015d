//! # Doc Ledger
//!
//! Document lifecycle bookkeeping for a multimodal retrieval pipeline.
//!
//! Doc Ledger sits in front of an external extraction/embedding pipeline. It
//! decides which documents still need ingesting, moves them from a pending
//! directory to a processed directory once the pipeline succeeds, keeps an
//! idempotency cache so nothing is ingested twice, and reconciles three
//! independent stores into one document list. It also turns unreliable
//! model output into well-formed caption records.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  process   ┌──────────────┐  run   ┌────────────────┐
//! │ pending dir  │──────────▶│ Orchestrator │──────▶│ Pipeline (ext) │
//! └──────────────┘            └──────┬───────┘        └───────┬────────┘
//!        ▲  remove / reset           │ move + add             │ writes
//!        │                   ┌───────┴────────┐       ┌──────┴────────┐
//!        └───────────────────│ processed dir  │       │ KB doc table  │
//!                            │ ProcessedCache │       └──────┬────────┘
//!                            └───────┬────────┘              │
//!                                    └──────▶ Registry ◀─────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ledger pending                 # ingest everything waiting in pending/
//! ledger process ./report.pdf    # ingest one file
//! ledger list                    # what exists, and where
//! ledger remove report           # forget a document, move it back to pending
//! ledger status
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Lifecycle error taxonomy |
//! | [`models`] | Core data types |
//! | [`names`] | Document name canonicalisation |
//! | [`normalize`] | Caption output normalisation |
//! | [`caption`] | Captioning model contract |
//! | [`cache`] | Idempotency cache |
//! | [`kb`] | Knowledge base document table |
//! | [`registry`] | Cross-store document listing |
//! | [`pipeline`] | External pipeline contract |
//! | [`locks`] | Per-identifier locks |
//! | [`orchestrator`] | Processing, removal, and reset |
//! | [`progress`] | Batch progress reporting |
//! | [`status`] | Status overview |
//! | [`logging`] | Tracing setup |

pub mod cache;
pub mod caption;
pub mod config;
pub mod error;
pub mod kb;
pub mod locks;
pub mod logging;
pub mod models;
pub mod names;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod status;
