//! Batch progress reporting.
//!
//! Reports progress during `ledger pending` so users can see which document
//! is being ingested and how many remain. Progress is emitted on **stderr**
//! so stdout remains parseable for scripts.

use std::io::Write;

use crate::models::BatchSummary;

/// A single progress event for a batch run.
#[derive(Clone, Debug)]
pub enum BatchProgressEvent {
    /// Pending directory scanned; `total` files will be attempted.
    Discovered { total: u64 },
    /// About to hand document `n` of `total` to the orchestrator.
    Processing { name: String, n: u64, total: u64 },
    /// Batch finished.
    Finished { summary: BatchSummary },
}

/// Reports batch progress. Implementations write to stderr (human or JSON).
pub trait BatchProgressReporter: Send + Sync {
    fn report(&self, event: BatchProgressEvent);
}

/// Human-friendly progress on stderr: "pending  processing  3 / 12  report.pdf".
pub struct StderrProgress;

impl BatchProgressReporter for StderrProgress {
    fn report(&self, event: BatchProgressEvent) {
        let line = match &event {
            BatchProgressEvent::Discovered { total } => {
                format!("pending  found {} file(s)\n", format_number(*total))
            }
            BatchProgressEvent::Processing { name, n, total } => format!(
                "pending  processing  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                name
            ),
            BatchProgressEvent::Finished { summary } => {
                format!("pending  done  {}\n", summary.message())
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BatchProgressReporter for JsonProgress {
    fn report(&self, event: BatchProgressEvent) {
        let obj = match &event {
            BatchProgressEvent::Discovered { total } => serde_json::json!({
                "event": "progress",
                "phase": "discovered",
                "total": total
            }),
            BatchProgressEvent::Processing { name, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "name": name,
                "n": n,
                "total": total
            }),
            BatchProgressEvent::Finished { summary } => serde_json::json!({
                "event": "progress",
                "phase": "finished",
                "processed": summary.processed,
                "skipped": summary.skipped,
                "failed": summary.failed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BatchProgressReporter for NoProgress {
    fn report(&self, _event: BatchProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn BatchProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
