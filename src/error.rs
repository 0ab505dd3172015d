//! Error taxonomy for document lifecycle operations.
//!
//! Plumbing (config, CLI, raw IO) uses `anyhow`. The variants here are the
//! failures a caller of the orchestrator needs to tell apart: a missing file
//! is not the same problem as a pipeline crash, and an ambiguous removal
//! target is a request for more input rather than a failure.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("document '{0}' not found")]
    DocumentNotFound(String),

    #[error("'{query}' matches {} documents: {}", .matches.len(), .matches.join(", "))]
    AmbiguousDocument { query: String, matches: Vec<String> },

    #[error("pipeline failed for {}: {reason}", .path.display())]
    Pipeline { path: PathBuf, reason: String },

    #[error("could not move {} to {}: {source}", .from.display(), .to.display())]
    Relocation {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LedgerError {
    /// Matching candidates when the error is a disambiguation request.
    pub fn candidates(&self) -> Option<&[String]> {
        match self {
            LedgerError::AmbiguousDocument { matches, .. } => Some(matches),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_message_lists_matches() {
        let err = LedgerError::AmbiguousDocument {
            query: "report".to_string(),
            matches: vec!["report-a.pdf".to_string(), "report-b.pdf".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "'report' matches 2 documents: report-a.pdf, report-b.pdf"
        );
        assert_eq!(err.candidates().map(|c| c.len()), Some(2));
    }

    #[test]
    fn not_found_has_no_candidates() {
        let err = LedgerError::DocumentNotFound("x".to_string());
        assert!(err.candidates().is_none());
    }
}
