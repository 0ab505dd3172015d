//! Processing orchestration: drives documents through the pipeline and keeps
//! the cache and the directory layout in step with what was ingested.
//!
//! ```text
//!  process_document(path)
//!     │  lock(identifier)
//!     ├─ cached and not forced? ──▶ Skipped
//!     ├─ Pipeline::process_document_complete ──✗──▶ Failed (left uncached, retried next run)
//!     ├─ in pending dir? rename → processed dir ──✗──▶ Failed (left uncached)
//!     └─ ProcessedCache::add ──▶ Processed
//! ```
//!
//! The file is relocated before the cache commit, so a failed rename never
//! leaves a document marked processed while it still sits in pending.

use anyhow::Result;
use globset::GlobSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::cache::ProcessedCache;
use crate::config::Config;
use crate::error::LedgerError;
use crate::kb::KnowledgeBase;
use crate::locks::KeyedLocks;
use crate::models::{BatchSummary, ProcessOutcome, RemovalOutcome, ResetReport, StatusReport};
use crate::pipeline::Pipeline;
use crate::progress::{BatchProgressEvent, BatchProgressReporter, NoProgress};
use crate::registry::DocumentRegistry;

/// Where documents and pipeline state live on disk.
#[derive(Debug, Clone)]
pub struct Layout {
    pub pending_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub output_dir: PathBuf,
    pub knowledge_base_dir: PathBuf,
}

impl Layout {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pending_dir: config.documents.pending_dir(),
            processed_dir: config.documents.processed_dir(),
            output_dir: config.storage.output_dir(),
            knowledge_base_dir: config.storage.knowledge_base_dir(),
        }
    }

    /// The default layout rooted at `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            pending_dir: root.join("documents").join("pending"),
            processed_dir: root.join("documents").join("processed"),
            output_dir: root.join("storage").join("processed_docs"),
            knowledge_base_dir: root.join("storage").join("lightrag_storage"),
        }
    }
}

pub struct Orchestrator {
    cache: Arc<ProcessedCache>,
    pipeline: Arc<dyn Pipeline>,
    registry: DocumentRegistry,
    layout: Layout,
    parse_method: String,
    exclude: GlobSet,
    locks: KeyedLocks,
}

impl Orchestrator {
    pub fn new(cache: Arc<ProcessedCache>, pipeline: Arc<dyn Pipeline>, layout: Layout) -> Self {
        let registry = DocumentRegistry::new(
            Arc::clone(&cache),
            KnowledgeBase::new(&layout.knowledge_base_dir),
            &layout.processed_dir,
        );
        Self {
            cache,
            pipeline,
            registry,
            layout,
            parse_method: "auto".to_string(),
            exclude: GlobSet::empty(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn from_config(config: &Config, pipeline: Arc<dyn Pipeline>) -> Result<Self> {
        let cache = Arc::new(ProcessedCache::json_file(config.storage.cache_file()));
        Ok(Self::new(cache, pipeline, Layout::from_config(config))
            .with_parse_method(config.parse_method())
            .with_exclude(config.documents.exclude_set()?))
    }

    pub fn with_parse_method(mut self, parse_method: impl Into<String>) -> Self {
        self.parse_method = parse_method.into();
        self
    }

    /// Pending files whose names match `exclude` are left out of batch runs.
    pub fn with_exclude(mut self, exclude: GlobSet) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn cache(&self) -> &Arc<ProcessedCache> {
        &self.cache
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Ingest one document.
    ///
    /// Skips documents whose identifier is already cached unless
    /// `force_reprocess` is set. A document in the pending directory is moved
    /// to the processed directory on success.
    pub async fn process_document(&self, path: &Path, force_reprocess: bool) -> ProcessOutcome {
        let id = identifier(path);
        let _guard = self.locks.acquire(&id).await;

        if !path.exists() {
            error!(path = %path.display(), "file not found");
            return ProcessOutcome::Failed(LedgerError::FileNotFound(path.to_path_buf()));
        }

        if !force_reprocess && self.cache.contains(&id) {
            info!(path = %path.display(), "already processed, skipping");
            return ProcessOutcome::Skipped {
                path: path.to_path_buf(),
            };
        }

        info!(path = %path.display(), parse_method = %self.parse_method, "processing document");
        if let Err(e) = self
            .pipeline
            .process_document_complete(path, &self.layout.output_dir, &self.parse_method)
            .await
        {
            error!(path = %path.display(), "pipeline failed: {:#}", e);
            return ProcessOutcome::Failed(LedgerError::Pipeline {
                path: path.to_path_buf(),
                reason: format!("{:#}", e),
            });
        }

        let moved_to = if self.is_pending(path) {
            let Some(name) = path.file_name() else {
                return ProcessOutcome::Failed(LedgerError::FileNotFound(path.to_path_buf()));
            };
            let dest = self.layout.processed_dir.join(name);
            if let Err(e) = relocate(path, &dest) {
                error!(path = %path.display(), "processed but could not be moved: {}", e);
                return ProcessOutcome::Failed(e);
            }
            Some(dest)
        } else {
            None
        };

        self.cache.add(id);
        info!(path = %path.display(), "processed");
        ProcessOutcome::Processed {
            path: path.to_path_buf(),
            moved_to,
        }
    }

    /// Process every file currently in the pending directory, one at a time.
    pub async fn process_pending(&self, force_reprocess: bool) -> BatchSummary {
        self.process_pending_with_progress(force_reprocess, &NoProgress)
            .await
    }

    pub async fn process_pending_with_progress(
        &self,
        force_reprocess: bool,
        progress: &dyn BatchProgressReporter,
    ) -> BatchSummary {
        // Snapshot once; files arriving mid-batch wait for the next run.
        let files = self.pending_files();
        let total = files.len() as u64;
        progress.report(BatchProgressEvent::Discovered { total });

        let mut summary = BatchSummary::default();
        for (i, path) in files.iter().enumerate() {
            progress.report(BatchProgressEvent::Processing {
                name: display_name(path),
                n: i as u64 + 1,
                total,
            });
            let outcome = self.process_document(path, force_reprocess).await;
            summary.record(&outcome);
        }

        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            "batch complete"
        );
        progress.report(BatchProgressEvent::Finished { summary });
        summary
    }

    /// Regular, non-hidden, non-excluded files in the pending directory,
    /// sorted by path.
    pub fn pending_files(&self) -> Vec<PathBuf> {
        let dir = &self.layout.pending_dir;
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "pending directory does not exist");
            return Vec::new();
        }
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("skipping unreadable pending entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                !name.starts_with('.') && !self.exclude.is_match(name.as_ref())
            })
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    /// Resolve `query` to one document and remove it.
    pub fn remove_document(&self, query: &str) -> Result<RemovalOutcome, LedgerError> {
        let name = self.registry.resolve(query).map_err(|e| {
            warn!(query, "cannot remove: {}", e);
            e
        })?;
        self.remove_resolved(&name)
    }

    /// Forget an already-resolved document name: discard its cache entries
    /// and move its processed file back to pending so it can be re-ingested.
    ///
    /// Fails without changing anything if a file with the same name is
    /// already waiting in pending.
    pub fn remove_resolved(&self, name: &str) -> Result<RemovalOutcome, LedgerError> {
        let processed_file = self.layout.processed_dir.join(name);
        let dest = self.layout.pending_dir.join(name);
        let restore = processed_file.is_file();
        if restore {
            ensure_vacant(&processed_file, &dest)?;
        }

        let removed = self.cache.remove_name(name);
        info!(name, entries = removed.len(), "removed cache entries");

        let restored_to = if restore {
            relocate(&processed_file, &dest)?;
            info!(name, "moved back to pending");
            Some(dest)
        } else {
            None
        };

        Ok(RemovalOutcome {
            name: name.to_string(),
            cache_entries_removed: removed.len(),
            restored_to,
        })
    }

    /// Forget everything: clear the cache, wipe the knowledge base, and move
    /// every processed file back to pending. Each step runs regardless of
    /// the others.
    pub fn remove_all_documents(&self) -> ResetReport {
        let mut report = ResetReport::default();

        let (cleared, persisted) = self.cache.clear();
        report.cache_entries_cleared = cleared;
        report.cache_persisted = persisted;
        info!(entries = cleared, "cleared processed cache");

        match self.registry.knowledge_base().clear() {
            Ok(()) => {
                report.knowledge_base_cleared = true;
                info!(dir = %self.layout.knowledge_base_dir.display(), "cleared knowledge base storage");
            }
            Err(e) => warn!("could not clear knowledge base storage: {:#}", e),
        }

        match std::fs::read_dir(&self.layout.processed_dir) {
            Ok(entries) => {
                for entry in entries.filter_map(|e| e.ok()) {
                    let path = entry.path();
                    if !path.is_file() {
                        continue;
                    }
                    let dest = self.layout.pending_dir.join(entry.file_name());
                    match ensure_vacant(&path, &dest).and_then(|()| relocate(&path, &dest)) {
                        Ok(()) => report.files_restored += 1,
                        Err(e) => {
                            warn!("{}", e);
                            report
                                .restore_failures
                                .push(entry.file_name().to_string_lossy().to_string());
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(dir = %self.layout.processed_dir.display(), "could not read processed dir: {}", e);
                report
                    .restore_failures
                    .push(self.layout.processed_dir.display().to_string());
            }
        }

        info!(files = report.files_restored, "moved processed files back to pending");
        report
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            knowledge_base_exists: self.registry.knowledge_base().exists(),
            cache_entries: self.cache.len(),
            cache_degraded: self.cache.is_degraded(),
            pending_files: self.pending_files().len(),
            processed_files: crate::registry::scan_processed_dir(&self.layout.processed_dir).len(),
            knowledge_base_dir: self.layout.knowledge_base_dir.clone(),
            output_dir: self.layout.output_dir.clone(),
            cache_file: PathBuf::from(self.cache.location()),
            pending_dir: self.layout.pending_dir.clone(),
            processed_dir: self.layout.processed_dir.clone(),
        }
    }

    fn is_pending(&self, path: &Path) -> bool {
        path.parent()
            .map(|parent| absolute(parent) == absolute(&self.layout.pending_dir))
            .unwrap_or(false)
    }
}

/// Cache identifier for a path: absolute, with `.` and `..` resolved
/// lexically.
pub fn identifier(path: &Path) -> String {
    absolute(path).to_string_lossy().to_string()
}

fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Refuse to restore over a file that is already waiting in pending.
fn ensure_vacant(from: &Path, to: &Path) -> Result<(), LedgerError> {
    if to.exists() {
        return Err(LedgerError::Relocation {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "destination already exists",
            ),
        });
    }
    Ok(())
}

/// Move a file, falling back to copy + delete when a rename is impossible
/// (e.g. across filesystems). Creates the destination directory if needed.
fn relocate(from: &Path, to: &Path) -> Result<(), LedgerError> {
    let relocation_error = |source| LedgerError::Relocation {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(relocation_error)?;
    }
    let rename_err = match std::fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    if std::fs::copy(from, to).is_err() {
        return Err(relocation_error(rename_err));
    }
    if let Err(e) = std::fs::remove_file(from) {
        let _ = std::fs::remove_file(to);
        return Err(relocation_error(e));
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_is_absolute_and_normalized() {
        let id = identifier(Path::new("./docs/../docs/pending/a.pdf"));
        let path = Path::new(&id);
        assert!(path.is_absolute());
        assert!(id.ends_with("docs/pending/a.pdf"));
        assert!(!id.contains("/./") && !id.contains(".."));
    }

    #[test]
    fn identifier_keeps_absolute_paths() {
        assert_eq!(identifier(Path::new("/x/y/report.pdf")), "/x/y/report.pdf");
    }

    #[test]
    fn relocate_creates_destination_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let from = tmp.path().join("a.pdf");
        std::fs::write(&from, "x").unwrap();
        let to = tmp.path().join("nested/dir/a.pdf");
        relocate(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read_to_string(&to).unwrap(), "x");
    }

    #[test]
    fn relocate_missing_source_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = relocate(&tmp.path().join("nope"), &tmp.path().join("dest")).unwrap_err();
        assert!(matches!(err, LedgerError::Relocation { .. }));
    }

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts calls; fails any file whose name contains `fail`.
    #[derive(Default)]
    struct StubPipeline {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Pipeline for StubPipeline {
        async fn process_document_complete(
            &self,
            file_path: &Path,
            _output_dir: &Path,
            _parse_method: &str,
        ) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if file_path.to_string_lossy().contains("fail") {
                anyhow::bail!("cannot parse {}", file_path.display());
            }
            Ok(())
        }
    }

    fn setup() -> (TempDir, Arc<StubPipeline>, Orchestrator) {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::under(tmp.path());
        std::fs::create_dir_all(&layout.pending_dir).unwrap();
        std::fs::create_dir_all(&layout.processed_dir).unwrap();
        let pipeline = Arc::new(StubPipeline::default());
        let orch = Orchestrator::new(
            Arc::new(ProcessedCache::in_memory()),
            pipeline.clone(),
            layout,
        );
        (tmp, pipeline, orch)
    }

    fn add_pending(orch: &Orchestrator, name: &str) -> PathBuf {
        let path = orch.layout().pending_dir.join(name);
        std::fs::write(&path, "content").unwrap();
        path
    }

    #[tokio::test]
    async fn pending_document_is_moved_and_cached() {
        let (_tmp, pipeline, orch) = setup();
        let path = add_pending(&orch, "a.pdf");

        let outcome = orch.process_document(&path, false).await;
        assert!(outcome.is_success(), "{}", outcome.message());
        assert!(!path.exists());
        assert!(orch.layout().processed_dir.join("a.pdf").is_file());
        assert!(orch.cache().contains(&identifier(&path)));
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn document_outside_pending_stays_put() {
        let (tmp, _pipeline, orch) = setup();
        let path = tmp.path().join("elsewhere.pdf");
        std::fs::write(&path, "x").unwrap();

        match orch.process_document(&path, false).await {
            ProcessOutcome::Processed { moved_to, .. } => assert!(moved_to.is_none()),
            other => panic!("unexpected outcome: {}", other.message()),
        }
        assert!(path.exists());
    }

    #[tokio::test]
    async fn second_run_skips_without_calling_pipeline() {
        let (tmp, pipeline, orch) = setup();
        let path = tmp.path().join("a.pdf");
        std::fs::write(&path, "x").unwrap();

        assert!(orch.process_document(&path, false).await.is_success());
        assert!(matches!(
            orch.process_document(&path, false).await,
            ProcessOutcome::Skipped { .. }
        ));
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);

        assert!(orch.process_document(&path, true).await.is_success());
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_file_fails_without_pipeline_call() {
        let (tmp, pipeline, orch) = setup();
        let outcome = orch
            .process_document(&tmp.path().join("ghost.pdf"), false)
            .await;
        assert!(matches!(
            outcome,
            ProcessOutcome::Failed(LedgerError::FileNotFound(_))
        ));
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pipeline_failure_leaves_file_pending_and_uncached() {
        let (_tmp, _pipeline, orch) = setup();
        let path = add_pending(&orch, "fail.pdf");

        let outcome = orch.process_document(&path, false).await;
        assert!(matches!(
            outcome,
            ProcessOutcome::Failed(LedgerError::Pipeline { .. })
        ));
        assert!(path.exists());
        assert!(orch.cache().is_empty());
    }

    #[tokio::test]
    async fn failed_relocation_is_not_cached() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::under(tmp.path());
        std::fs::create_dir_all(&layout.pending_dir).unwrap();
        // A regular file where the processed directory should be.
        std::fs::write(&layout.processed_dir, "not a dir").unwrap();
        let orch = Orchestrator::new(
            Arc::new(ProcessedCache::in_memory()),
            Arc::new(StubPipeline::default()),
            layout,
        );
        let path = add_pending(&orch, "a.pdf");

        let outcome = orch.process_document(&path, false).await;
        assert!(matches!(
            outcome,
            ProcessOutcome::Failed(LedgerError::Relocation { .. })
        ));
        assert!(path.exists());
        assert!(orch.cache().is_empty());
    }

    #[tokio::test]
    async fn concurrent_runs_for_one_path_call_pipeline_once() {
        let (tmp, pipeline, orch) = setup();
        let path = tmp.path().join("a.pdf");
        std::fs::write(&path, "x").unwrap();

        let (a, b) = tokio::join!(
            orch.process_document(&path, false),
            orch.process_document(&path, false)
        );
        assert!(a.is_success() != b.is_success());
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batch_counts_each_outcome() {
        let (_tmp, _pipeline, orch) = setup();
        let done = add_pending(&orch, "done.pdf");
        orch.cache().add(identifier(&done));
        add_pending(&orch, "new.pdf");
        add_pending(&orch, "fail.pdf");
        add_pending(&orch, ".hidden");

        let summary = orch.process_pending(false).await;
        assert_eq!(
            summary,
            BatchSummary {
                processed: 1,
                skipped: 1,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn batch_honours_exclude_globs() {
        let (_tmp, pipeline, orch) = setup();
        let mut builder = globset::GlobSetBuilder::new();
        builder.add(globset::Glob::new("*.tmp").unwrap());
        let orch = orch.with_exclude(builder.build().unwrap());
        add_pending(&orch, "a.pdf");
        add_pending(&orch, "scratch.tmp");

        let summary = orch.process_pending(false).await;
        assert_eq!(summary.total(), 1);
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batch_on_missing_pending_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let orch = Orchestrator::new(
            Arc::new(ProcessedCache::in_memory()),
            Arc::new(StubPipeline::default()),
            Layout::under(tmp.path()),
        );
        assert_eq!(orch.process_pending(false).await, BatchSummary::default());
    }

    #[tokio::test]
    async fn removal_restores_file_and_allows_reprocessing() {
        let (_tmp, pipeline, orch) = setup();
        let path = add_pending(&orch, "report.pdf");
        assert!(orch.process_document(&path, false).await.is_success());

        let removal = orch.remove_document("REPORT").unwrap();
        assert_eq!(removal.name, "report.pdf");
        assert_eq!(removal.cache_entries_removed, 1);
        assert_eq!(removal.restored_to.as_deref(), Some(path.as_path()));
        assert!(path.exists());
        assert!(orch.cache().is_empty());

        assert!(orch.process_document(&path, false).await.is_success());
        assert_eq!(pipeline.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn removal_errors_change_nothing() {
        let (_tmp, _pipeline, orch) = setup();
        for name in ["report-a.pdf", "report-b.pdf"] {
            let path = add_pending(&orch, name);
            assert!(orch.process_document(&path, false).await.is_success());
        }

        assert!(matches!(
            orch.remove_document("missing"),
            Err(LedgerError::DocumentNotFound(_))
        ));
        let err = orch.remove_document("report").unwrap_err();
        assert_eq!(err.candidates().map(|c| c.len()), Some(2));
        assert_eq!(orch.cache().len(), 2);
        assert_eq!(scan_processed(&orch), 2);
    }

    fn scan_processed(orch: &Orchestrator) -> usize {
        crate::registry::scan_processed_dir(&orch.layout().processed_dir).len()
    }

    #[tokio::test]
    async fn reset_clears_everything_and_restores_files() {
        let (_tmp, _pipeline, orch) = setup();
        for name in ["a.pdf", "b.pdf"] {
            let path = add_pending(&orch, name);
            assert!(orch.process_document(&path, false).await.is_success());
        }
        let kb_dir = orch.layout().knowledge_base_dir.clone();
        std::fs::create_dir_all(&kb_dir).unwrap();
        std::fs::write(kb_dir.join("graph.json"), "{}").unwrap();

        let report = orch.remove_all_documents();
        assert!(report.is_success(), "{}", report.message());
        assert_eq!(report.cache_entries_cleared, 2);
        assert_eq!(report.files_restored, 2);
        assert!(orch.cache().is_empty());
        assert!(kb_dir.is_dir());
        assert!(!kb_dir.join("graph.json").exists());
        assert_eq!(orch.pending_files().len(), 2);
        assert!(orch.registry().list_names().is_empty());
    }

    #[tokio::test]
    async fn removal_keeps_newer_pending_upload() {
        let (_tmp, _pipeline, orch) = setup();
        let path = add_pending(&orch, "report.pdf");
        assert!(orch.process_document(&path, false).await.is_success());
        std::fs::write(&path, "newer upload").unwrap();

        let err = orch.remove_document("report.pdf").unwrap_err();
        assert!(matches!(err, LedgerError::Relocation { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "newer upload");
        assert!(orch.layout().processed_dir.join("report.pdf").is_file());
        assert_eq!(orch.cache().len(), 1);
    }

    #[tokio::test]
    async fn reset_keeps_newer_pending_upload() {
        let (_tmp, _pipeline, orch) = setup();
        for name in ["report.pdf", "other.pdf"] {
            let path = add_pending(&orch, name);
            assert!(orch.process_document(&path, false).await.is_success());
        }
        let pending = orch.layout().pending_dir.join("report.pdf");
        std::fs::write(&pending, "newer upload").unwrap();

        let report = orch.remove_all_documents();
        assert!(!report.is_success());
        assert_eq!(report.files_restored, 1);
        assert_eq!(report.restore_failures, vec!["report.pdf".to_string()]);
        assert_eq!(std::fs::read_to_string(&pending).unwrap(), "newer upload");
        assert!(orch.layout().processed_dir.join("report.pdf").is_file());
        assert!(orch.layout().pending_dir.join("other.pdf").is_file());
    }

    #[tokio::test]
    async fn removal_spares_names_sharing_a_suffix() {
        let (_tmp, _pipeline, orch) = setup();
        for name in ["a.pdf", "data.pdf"] {
            let path = add_pending(&orch, name);
            assert!(orch.process_document(&path, false).await.is_success());
        }

        let removal = orch.remove_document("a.pdf").unwrap();
        assert_eq!(removal.cache_entries_removed, 1);
        let remaining = orch.cache().identifiers();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].ends_with("data.pdf"));
    }

    #[tokio::test]
    async fn reset_continues_past_failed_knowledge_base_clear() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::under(tmp.path());
        std::fs::create_dir_all(&layout.pending_dir).unwrap();
        std::fs::create_dir_all(&layout.processed_dir).unwrap();
        std::fs::create_dir_all(layout.knowledge_base_dir.parent().unwrap()).unwrap();
        // A regular file where the knowledge base directory should be.
        std::fs::write(&layout.knowledge_base_dir, "not a dir").unwrap();
        let orch = Orchestrator::new(
            Arc::new(ProcessedCache::in_memory()),
            Arc::new(StubPipeline::default()),
            layout,
        );
        let path = add_pending(&orch, "a.pdf");
        assert!(orch.process_document(&path, false).await.is_success());

        let report = orch.remove_all_documents();
        assert!(!report.knowledge_base_cleared);
        assert!(!report.is_success());
        assert!(report.message().contains("NOT cleared"));
        assert_eq!(report.cache_entries_cleared, 1);
        assert!(orch.cache().is_empty());
        assert_eq!(report.files_restored, 1);
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn status_counts_files() {
        let (_tmp, _pipeline, orch) = setup();
        let path = add_pending(&orch, "a.pdf");
        add_pending(&orch, "b.pdf");
        assert!(orch.process_document(&path, false).await.is_success());

        let status = orch.status();
        assert_eq!(status.pending_files, 1);
        assert_eq!(status.processed_files, 1);
        assert_eq!(status.cache_entries, 1);
        assert!(!status.cache_degraded);
        assert!(!status.knowledge_base_exists);
    }
}
