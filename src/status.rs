//! System status overview.
//!
//! A quick summary of where state lives and how much of it there is: cache
//! entries, files waiting in pending, files already processed, and the size
//! of the knowledge base on disk. Used by `ledger status` to check that a
//! deployment is wired to the directories the operator expects.

use anyhow::Result;

use crate::models::StatusReport;
use crate::orchestrator::Orchestrator;

/// Run the status command: gather a [`StatusReport`] and print it.
pub fn run_status(orchestrator: &Orchestrator) -> Result<()> {
    let report = orchestrator.status();
    let documents = orchestrator.registry().list_documents();
    let inconsistent = documents.values().filter(|d| !d.is_consistent()).count();
    let kb_size = orchestrator.registry().knowledge_base().size_on_disk();

    print_report(&report);
    println!("  KB size:     {}", format_bytes(kb_size));
    println!();
    println!("  Documents:   {}", documents.len());
    if inconsistent > 0 {
        println!(
            "  Partial:     {} (not present in every store, see `ledger list`)",
            inconsistent
        );
    }
    println!();
    Ok(())
}

fn print_report(report: &StatusReport) {
    println!("Document Ledger Status");
    println!("======================");
    println!();
    println!(
        "  Knowledge base: {}",
        if report.knowledge_base_exists {
            "present"
        } else {
            "not initialised"
        }
    );
    println!(
        "  Cache:          {} entr{}{}",
        report.cache_entries,
        if report.cache_entries == 1 { "y" } else { "ies" },
        if report.cache_degraded {
            " (persistence degraded, changes are in memory only)"
        } else {
            ""
        }
    );
    println!("  Pending:        {} file(s)", report.pending_files);
    println!("  Processed:      {} file(s)", report.processed_files);
    println!();
    println!("  Storage:");
    println!("    knowledge base  {}", report.knowledge_base_dir.display());
    println!("    pipeline output {}", report.output_dir.display());
    println!("    cache file      {}", report.cache_file.display());
    println!("  Documents:");
    println!("    pending         {}", report.pending_dir.display());
    println!("    processed       {}", report.processed_dir.display());
    println!();
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
