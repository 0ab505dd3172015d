//! Idempotency cache of successfully processed document identifiers.
//!
//! The cache is an optimisation: it lets the orchestrator skip documents the
//! pipeline has already ingested. It is never allowed to block ingestion.
//! A missing or corrupt backing file loads as an empty set, and a failed
//! write leaves the in-memory set authoritative for the rest of the
//! session. Both are logged.
//!
//! Every mutation rewrites the whole set (no append log). Writes happen while
//! the set's lock is held, so concurrent writers cannot lose each other's
//! updates.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::names::canonical_name;

/// Durable storage for the identifier set.
pub trait CacheStore: Send + Sync {
    /// Read the persisted identifiers. `Ok(None)` means nothing is stored yet.
    fn load(&self) -> Result<Option<Vec<String>>>;

    /// Replace the persisted identifiers with `ids`.
    fn save(&self, ids: &[String]) -> Result<()>;

    /// Where the data lives, for log lines and status output.
    fn location(&self) -> String;
}

/// JSON array of strings in a single file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<String>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cache file: {}", self.path.display()))?;
        let ids: Vec<String> = serde_json::from_str(&content)
            .with_context(|| format!("Cache file is not a JSON string array: {}", self.path.display()))?;
        Ok(Some(ids))
    }

    fn save(&self, ids: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create cache directory: {}", parent.display())
                })?;
            }
        }
        let json = serde_json::to_string(ids)?;

        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write cache file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace cache file: {}", self.path.display()))?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Volatile store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Option<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store as if a previous session had saved `ids`.
    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            data: Mutex::new(Some(ids.into_iter().map(Into::into).collect())),
        }
    }

    pub fn snapshot(&self) -> Option<Vec<String>> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<String>>> {
        Ok(self.snapshot())
    }

    fn save(&self, ids: &[String]) -> Result<()> {
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = Some(ids.to_vec());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// The set of identifiers (absolute paths, in practice) known to be ingested.
pub struct ProcessedCache {
    store: Box<dyn CacheStore>,
    ids: Mutex<BTreeSet<String>>,
    degraded: AtomicBool,
}

impl ProcessedCache {
    /// Open a cache over `store`, loading whatever it holds.
    pub fn open(store: Box<dyn CacheStore>) -> Self {
        let cache = Self {
            store,
            ids: Mutex::new(BTreeSet::new()),
            degraded: AtomicBool::new(false),
        };
        cache.load();
        cache
    }

    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::open(Box::new(JsonFileStore::new(path)))
    }

    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryStore::new()))
    }

    fn set(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the in-memory set with the persisted one.
    ///
    /// Missing storage yields an empty set. Unreadable storage also yields an
    /// empty set and marks the cache degraded.
    pub fn load(&self) {
        let loaded = match self.store.load() {
            Ok(Some(ids)) => {
                debug!(entries = ids.len(), location = %self.store.location(), "loaded processed cache");
                ids.into_iter().collect()
            }
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                warn!(location = %self.store.location(), "could not load processed cache, starting empty: {:#}", e);
                self.degraded.store(true, Ordering::Relaxed);
                BTreeSet::new()
            }
        };
        *self.set() = loaded;
    }

    /// Persist the current set. Returns whether the write succeeded.
    pub fn save(&self) -> bool {
        let ids = self.set();
        self.persist(&ids)
    }

    fn persist(&self, ids: &BTreeSet<String>) -> bool {
        let snapshot: Vec<String> = ids.iter().cloned().collect();
        match self.store.save(&snapshot) {
            Ok(()) => {
                self.degraded.store(false, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!(location = %self.store.location(), "could not save processed cache, keeping it in memory: {:#}", e);
                self.degraded.store(true, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.set().contains(id)
    }

    /// Insert `id` and persist. Returns `false` if it was already present,
    /// in which case nothing is written.
    pub fn add(&self, id: impl Into<String>) -> bool {
        let mut ids = self.set();
        if !ids.insert(id.into()) {
            return false;
        }
        self.persist(&ids);
        true
    }

    /// Remove every identifier matching `predicate`, persist, and return the
    /// removed identifiers.
    pub fn remove_matching<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let mut ids = self.set();
        let removed: Vec<String> = ids.iter().filter(|id| predicate(id)).cloned().collect();
        for id in &removed {
            ids.remove(id);
        }
        if !removed.is_empty() {
            self.persist(&ids);
        }
        removed
    }

    /// Remove identifiers that refer to the document called `name`: exact
    /// matches plus any path whose final component is `name`.
    pub fn remove_name(&self, name: &str) -> Vec<String> {
        self.remove_matching(|id| id == name || canonical_name(id) == name)
    }

    /// Drop every identifier and persist the empty set.
    ///
    /// Returns how many entries were cleared and whether the write succeeded.
    pub fn clear(&self) -> (usize, bool) {
        let mut ids = self.set();
        let count = ids.len();
        ids.clear();
        let persisted = self.persist(&ids);
        (count, persisted)
    }

    /// Sorted copy of all identifiers.
    pub fn identifiers(&self) -> Vec<String> {
        self.set().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.set().len()
    }

    pub fn is_empty(&self) -> bool {
        self.set().is_empty()
    }

    /// True when the last load or save failed and the in-memory set is the
    /// only copy.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn location(&self) -> String {
        self.store.location()
    }
}
