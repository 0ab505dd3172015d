//! Read-only view of the knowledge base's persisted document table.
//!
//! The table is owned by the extraction pipeline: a JSON object mapping an
//! internal document id to a record with (at least) a `file_path` field.
//! This module only reads it, except for [`KnowledgeBase::clear`], which
//! wipes the whole storage directory during a full reset.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::DOC_TABLE_FILE;
use crate::error::LedgerError;
use crate::names::listable_name;

pub struct KnowledgeBase {
    dir: PathBuf,
}

impl KnowledgeBase {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn doc_table_path(&self) -> PathBuf {
        self.dir.join(DOC_TABLE_FILE)
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Raw `file_path` values recorded in the document table.
    ///
    /// Records without a string `file_path` are skipped.
    pub fn file_paths(&self) -> Result<Vec<String>> {
        let path = self.doc_table_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read document table: {}", path.display()))?;
        let table: Value = serde_json::from_str(&content)
            .with_context(|| format!("Document table is not valid JSON: {}", path.display()))?;
        let Value::Object(records) = table else {
            anyhow::bail!("Document table is not a JSON object: {}", path.display());
        };

        Ok(records
            .values()
            .filter_map(|record| record.get("file_path"))
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    /// Canonical document names referenced by the table.
    ///
    /// A missing or malformed table is treated as empty.
    pub fn document_names(&self) -> BTreeSet<String> {
        match self.file_paths() {
            Ok(paths) => paths.iter().filter_map(|p| listable_name(p)).collect(),
            Err(e) => {
                warn!("ignoring unreadable knowledge base document table: {:#}", e);
                BTreeSet::new()
            }
        }
    }

    /// Delete all persisted knowledge base state and recreate an empty
    /// directory. Irreversible.
    pub fn clear(&self) -> Result<(), LedgerError> {
        let storage_error = |source| LedgerError::Storage {
            path: self.dir.clone(),
            source,
        };
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir).map_err(storage_error)?;
            debug!(dir = %self.dir.display(), "removed knowledge base storage");
        }
        std::fs::create_dir_all(&self.dir).map_err(storage_error)?;
        Ok(())
    }

    /// Total bytes stored under the knowledge base directory.
    pub fn size_on_disk(&self) -> u64 {
        walkdir::WalkDir::new(&self.dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn kb_with_table(body: &str) -> (TempDir, KnowledgeBase) {
        let tmp = TempDir::new().unwrap();
        let kb = KnowledgeBase::new(tmp.path().join("lightrag_storage"));
        std::fs::create_dir_all(kb.dir()).unwrap();
        std::fs::write(kb.doc_table_path(), body).unwrap();
        (tmp, kb)
    }

    #[test]
    fn extracts_basenames_from_file_paths() {
        let (_tmp, kb) = kb_with_table(
            r#"{
                "doc-1": {"content": "...", "file_path": "/x/y/report.PDF"},
                "doc-2": {"content": "...", "file_path": "C:\\x\\y\\notes.pdf"},
                "doc-3": {"content": "no path here"},
                "doc-4": "not a record"
            }"#,
        );
        let names: Vec<String> = kb.document_names().into_iter().collect();
        assert_eq!(names, vec!["notes.pdf", "report.PDF"]);
    }

    #[test]
    fn missing_table_is_empty() {
        let tmp = TempDir::new().unwrap();
        let kb = KnowledgeBase::new(tmp.path().join("nope"));
        assert!(kb.document_names().is_empty());
        assert!(!kb.exists());
    }

    #[test]
    fn malformed_table_is_empty() {
        let (_tmp, kb) = kb_with_table("[1, 2, 3");
        assert!(kb.file_paths().is_err());
        assert!(kb.document_names().is_empty());
    }

    #[test]
    fn non_object_table_is_empty() {
        let (_tmp, kb) = kb_with_table(r#"["a.pdf"]"#);
        assert!(kb.document_names().is_empty());
    }

    #[test]
    fn clear_reports_storage_errors() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let kb = KnowledgeBase::new(blocker.join("lightrag_storage"));
        assert!(matches!(kb.clear(), Err(LedgerError::Storage { .. })));
    }

    #[test]
    fn clear_wipes_and_recreates() {
        let (_tmp, kb) = kb_with_table(r#"{"d": {"file_path": "a.pdf"}}"#);
        std::fs::write(kb.dir().join("graph.graphml"), "<graph/>").unwrap();
        assert!(kb.size_on_disk() > 0);

        kb.clear().unwrap();
        assert!(kb.exists());
        assert_eq!(std::fs::read_dir(kb.dir()).unwrap().count(), 0);
        assert!(kb.document_names().is_empty());
    }
}
