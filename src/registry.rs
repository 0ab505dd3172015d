//! Document registry: one deduplicated view over three independent stores.
//!
//! There is no single source of truth. The idempotency cache is a hint, the
//! processed directory is a filesystem fact, and the knowledge base table is
//! the pipeline's own ledger. The registry reads each store into a
//! [`StoreSnapshot`] and merges them with [`reconcile`], a pure function, so
//! a listing is always derived from the stores as they are right now and
//! never persisted.
//!
//! ```text
//!  ProcessedCache ──┐
//!                   │  basenames
//!  processed dir  ──┼──────────────▶ reconcile() ──▶ name → DocumentDescriptor
//!                   │
//!  KB doc table   ──┘
//! ```

use chrono::{DateTime, Local};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cache::ProcessedCache;
use crate::error::LedgerError;
use crate::kb::KnowledgeBase;
use crate::models::{DocumentDescriptor, UNKNOWN};
use crate::names::listable_name;

/// Filesystem metadata for a file in the processed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub size: String,
    pub modified: String,
}

impl FileMeta {
    pub fn unknown() -> Self {
        Self {
            size: UNKNOWN.to_string(),
            modified: UNKNOWN.to_string(),
        }
    }

    fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let size = format!("{:.1} KB", meta.len() as f64 / 1024.0);
        let modified = meta
            .modified()
            .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|_| UNKNOWN.to_string());
        Self { size, modified }
    }
}

/// Names observed in each store at one point in time.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub cache: BTreeSet<String>,
    pub processed: BTreeMap<String, FileMeta>,
    pub knowledge_base: BTreeSet<String>,
}

impl StoreSnapshot {
    /// Build a snapshot from raw values, canonicalising every name.
    pub fn from_raw<'a>(
        cache_ids: impl IntoIterator<Item = &'a str>,
        processed: impl IntoIterator<Item = (String, FileMeta)>,
        kb_paths: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            cache: cache_ids.into_iter().filter_map(listable_name).collect(),
            processed: processed
                .into_iter()
                .filter_map(|(name, meta)| listable_name(&name).map(|n| (n, meta)))
                .collect(),
            knowledge_base: kb_paths.into_iter().filter_map(listable_name).collect(),
        }
    }

    /// Union of every name in the snapshot, sorted.
    pub fn names(&self) -> BTreeSet<String> {
        self.cache
            .iter()
            .chain(self.processed.keys())
            .chain(self.knowledge_base.iter())
            .cloned()
            .collect()
    }
}

/// Merge a snapshot into one descriptor per name.
///
/// Each provenance flag is computed against its own store; size and
/// modification time come only from the processed directory.
pub fn reconcile(snapshot: &StoreSnapshot) -> BTreeMap<String, DocumentDescriptor> {
    snapshot
        .names()
        .into_iter()
        .map(|name| {
            let meta = snapshot.processed.get(&name);
            let descriptor = DocumentDescriptor {
                in_cache: snapshot.cache.contains(&name),
                in_processed_dir: meta.is_some(),
                in_knowledge_base: snapshot.knowledge_base.contains(&name),
                size: meta.map(|m| m.size.clone()),
                modified: meta.map(|m| m.modified.clone()),
                name: name.clone(),
            };
            (name, descriptor)
        })
        .collect()
}

/// Read the processed directory: regular, non-hidden files at depth one.
///
/// A file whose metadata cannot be read is still listed, with
/// [`FileMeta::unknown`].
pub fn scan_processed_dir(dir: &Path) -> BTreeMap<String, FileMeta> {
    let mut files = BTreeMap::new();
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "processed directory does not exist");
        return files;
    }

    let walker = WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), "skipping unreadable entry in processed dir: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) => FileMeta::from_metadata(&m),
            Err(e) => {
                warn!(file = %name, "could not stat processed file: {}", e);
                FileMeta::unknown()
            }
        };
        files.insert(name, meta);
    }
    files
}

/// Answers "what documents exist, and where" without writing anything.
pub struct DocumentRegistry {
    cache: Arc<ProcessedCache>,
    knowledge_base: KnowledgeBase,
    processed_dir: PathBuf,
}

impl DocumentRegistry {
    pub fn new(
        cache: Arc<ProcessedCache>,
        knowledge_base: KnowledgeBase,
        processed_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache,
            knowledge_base,
            processed_dir: processed_dir.into(),
        }
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let cache_ids = self.cache.identifiers();
        let mut snapshot = StoreSnapshot::from_raw(
            cache_ids.iter().map(String::as_str),
            scan_processed_dir(&self.processed_dir),
            std::iter::empty(),
        );
        snapshot.knowledge_base = self.knowledge_base.document_names();
        snapshot
    }

    pub fn list_documents(&self) -> BTreeMap<String, DocumentDescriptor> {
        reconcile(&self.snapshot())
    }

    /// Sorted, unique document names across all stores.
    pub fn list_names(&self) -> Vec<String> {
        self.snapshot().names().into_iter().collect()
    }

    /// Names containing `query`, case-insensitively, in sorted order.
    pub fn find_matches(&self, query: &str) -> Vec<String> {
        let needle = query.to_lowercase();
        self.list_names()
            .into_iter()
            .filter(|name| name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Resolve a user-supplied identifier to exactly one document name.
    ///
    /// When several names match but one is exactly `query`, that one wins.
    pub fn resolve(&self, query: &str) -> Result<String, LedgerError> {
        let mut matches = self.find_matches(query);
        match matches.len() {
            0 => Err(LedgerError::DocumentNotFound(query.to_string())),
            1 => Ok(matches.remove(0)),
            _ => {
                if let Some(exact) = matches.iter().find(|m| m.as_str() == query) {
                    return Ok(exact.clone());
                }
                Err(LedgerError::AmbiguousDocument {
                    query: query.to_string(),
                    matches,
                })
            }
        }
    }
}
