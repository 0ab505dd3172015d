//! Core data types shared by the registry, the orchestrator, and the CLI.
//!
//! None of these are persisted. They are snapshots or results, built fresh
//! for each query or operation.

use serde::Serialize;
use std::path::PathBuf;

use crate::error::LedgerError;

/// Placeholder reported when per-file metadata cannot be read.
pub const UNKNOWN: &str = "Unknown";

/// One document as seen across the three backing stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentDescriptor {
    /// Canonical basename (never a path).
    pub name: String,
    /// Some cache identifier ends in this name.
    pub in_cache: bool,
    /// A regular file with this name sits in the processed directory.
    pub in_processed_dir: bool,
    /// The knowledge base's document table references this name.
    pub in_knowledge_base: bool,
    /// Human-readable size from the processed directory, e.g. `"12.3 KB"`.
    pub size: Option<String>,
    /// Last modification time from the processed directory, `%Y-%m-%d %H:%M`.
    pub modified: Option<String>,
}

impl DocumentDescriptor {
    /// True when all three stores agree the document exists.
    pub fn is_consistent(&self) -> bool {
        self.in_cache && self.in_processed_dir && self.in_knowledge_base
    }
}

/// Result of running a single document through the orchestrator.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The pipeline ran and the document is now recorded as processed.
    Processed { path: PathBuf, moved_to: Option<PathBuf> },
    /// The identifier was already cached and reprocessing was not forced.
    Skipped { path: PathBuf },
    /// The document was not processed; it stays uncached.
    Failed(LedgerError),
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Processed { .. })
    }

    pub fn message(&self) -> String {
        match self {
            ProcessOutcome::Processed {
                path,
                moved_to: Some(dest),
            } => format!("processed {} (moved to {})", path.display(), dest.display()),
            ProcessOutcome::Processed { path, moved_to: None } => {
                format!("processed {}", path.display())
            }
            ProcessOutcome::Skipped { path } => {
                format!("already processed, skipped {}", path.display())
            }
            ProcessOutcome::Failed(err) => format!("failed: {}", err),
        }
    }
}

/// Counts from a batch run over the pending directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Processed { .. } => self.processed += 1,
            ProcessOutcome::Skipped { .. } => self.skipped += 1,
            ProcessOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.processed + self.skipped + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn message(&self) -> String {
        format!(
            "processed: {}, skipped: {}, failed: {}",
            self.processed, self.skipped, self.failed
        )
    }
}

/// Result of removing one resolved document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub name: String,
    /// Cache identifiers discarded for this name.
    pub cache_entries_removed: usize,
    /// Where the processed file was moved, if there was one.
    pub restored_to: Option<PathBuf>,
}

impl RemovalOutcome {
    pub fn message(&self) -> String {
        let mut msg = format!(
            "removed {} ({} cache entr{})",
            self.name,
            self.cache_entries_removed,
            if self.cache_entries_removed == 1 { "y" } else { "ies" }
        );
        if let Some(dest) = &self.restored_to {
            msg.push_str(&format!(", moved back to {}", dest.display()));
        }
        msg
    }
}

/// Per-step results of a full knowledge base reset.
///
/// Every step runs even when an earlier one fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub cache_entries_cleared: usize,
    pub cache_persisted: bool,
    pub knowledge_base_cleared: bool,
    pub files_restored: usize,
    pub restore_failures: Vec<String>,
}

impl ResetReport {
    pub fn is_success(&self) -> bool {
        self.cache_persisted && self.knowledge_base_cleared && self.restore_failures.is_empty()
    }

    pub fn message(&self) -> String {
        let mut msg = format!(
            "cleared {} cache entries, knowledge base {}, restored {} file(s) to pending",
            self.cache_entries_cleared,
            if self.knowledge_base_cleared {
                "cleared"
            } else {
                "NOT cleared"
            },
            self.files_restored
        );
        if !self.cache_persisted {
            msg.push_str("; cache file could not be written");
        }
        if !self.restore_failures.is_empty() {
            msg.push_str(&format!(
                "; failed to restore: {}",
                self.restore_failures.join(", ")
            ));
        }
        msg
    }
}

/// Snapshot of where state lives and how much of it there is.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub knowledge_base_exists: bool,
    pub cache_entries: usize,
    pub cache_degraded: bool,
    pub pending_files: usize,
    pub processed_files: usize,
    pub knowledge_base_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cache_file: PathBuf,
    pub pending_dir: PathBuf,
    pub processed_dir: PathBuf,
}
