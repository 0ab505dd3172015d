//! # Doc Ledger CLI (`ledger`)
//!
//! The `ledger` binary drives the document lifecycle: ingesting pending
//! files through the configured pipeline, listing what exists across the
//! cache, the processed directory and the knowledge base, and removing
//! documents so they can be ingested again.
//!
//! ## Usage
//!
//! ```bash
//! ledger --config ./config/ledger.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ledger process <path>` | Ingest one document |
//! | `ledger pending` | Ingest every file in the pending directory |
//! | `ledger list` | List documents and where each one was seen |
//! | `ledger remove <name>` | Forget a document and move it back to pending |
//! | `ledger reset --yes` | Forget everything and wipe the knowledge base |
//! | `ledger status` | Show storage locations and counts |
//! | `ledger normalize` | Normalise raw model output into a caption record |

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

use doc_ledger::config::{self, Config};
use doc_ledger::error::LedgerError;
use doc_ledger::models::{DocumentDescriptor, ProcessOutcome};
use doc_ledger::orchestrator::Orchestrator;
use doc_ledger::progress::ProgressMode;
use doc_ledger::{logging, normalize, pipeline, status};

/// Doc Ledger CLI: document lifecycle bookkeeping for a retrieval pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "ledger",
    about = "Doc Ledger: document lifecycle bookkeeping for a multimodal retrieval pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ledger.toml`. Storage locations, document
    /// directories, and the pipeline command are read from this file.
    #[arg(long, global = true, default_value = "./config/ledger.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest a single document.
    ///
    /// Skipped if the document was already ingested, unless `--force` is
    /// given. A file in the pending directory is moved to the processed
    /// directory once the pipeline succeeds.
    Process {
        /// Path of the document to ingest.
        path: PathBuf,

        /// Reprocess even if the document is already cached.
        #[arg(long)]
        force: bool,
    },

    /// Ingest every file currently in the pending directory.
    ///
    /// Hidden files and files matching `documents.exclude_globs` are left
    /// alone. Exits non-zero if any document failed.
    Pending {
        /// Reprocess documents that are already cached.
        #[arg(long)]
        force: bool,

        /// Progress on stderr. Defaults to `human` on a terminal, otherwise `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// List documents across the cache, the processed directory, and the
    /// knowledge base.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Remove a document so it can be ingested again.
    ///
    /// The identifier is matched case-insensitively against document names.
    /// Its cache entries are discarded and its processed file is moved back
    /// to the pending directory.
    Remove {
        /// Document name, or any part of it.
        identifier: String,

        /// Remove every document matching the identifier instead of
        /// requiring a unique match.
        #[arg(long)]
        all_matches: bool,
    },

    /// Forget every document: clear the cache, wipe the knowledge base, and
    /// move all processed files back to pending. Irreversible.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },

    /// Show storage locations, cache size, and file counts.
    Status,

    /// Normalise raw caption model output into a JSON record.
    ///
    /// Reads from `--input` or stdin and prints the record on stdout.
    Normalize {
        /// File containing the raw model output.
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Normalize { input } = &cli.command {
        let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
        logging::init(&cfg.logging.level);
        let raw = match input {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            None => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read stdin")?;
                buf
            }
        };
        println!("{}", normalize::normalize(&raw).json);
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.level);
    let orchestrator = Orchestrator::from_config(&cfg, pipeline::from_config(&cfg))?;

    match cli.command {
        Commands::Process { path, force } => {
            match orchestrator.process_document(&path, force).await {
                ProcessOutcome::Failed(err) => return Err(err.into()),
                outcome => println!("{}", outcome.message()),
            }
        }
        Commands::Pending { force, progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let reporter = mode.reporter();
            let summary = orchestrator
                .process_pending_with_progress(force, reporter.as_ref())
                .await;
            println!("{}", summary.message());
            if !summary.is_success() {
                bail!("{} document(s) failed", summary.failed);
            }
        }
        Commands::List { json } => {
            let documents = orchestrator.registry().list_documents();
            let documents: Vec<&DocumentDescriptor> = documents.values().collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&documents)?);
            } else {
                print_documents(&documents);
            }
        }
        Commands::Remove {
            identifier,
            all_matches,
        } => {
            if all_matches {
                let names = orchestrator.registry().find_matches(&identifier);
                if names.is_empty() {
                    return Err(LedgerError::DocumentNotFound(identifier).into());
                }
                let mut failed = Vec::new();
                for name in names {
                    match orchestrator.remove_resolved(&name) {
                        Ok(removal) => println!("{}", removal.message()),
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            failed.push(name);
                        }
                    }
                }
                if !failed.is_empty() {
                    bail!("could not remove: {}", failed.join(", "));
                }
            } else {
                let removal = orchestrator.remove_document(&identifier)?;
                println!("{}", removal.message());
            }
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("reset deletes the knowledge base and cannot be undone; pass --yes to confirm");
            }
            let report = orchestrator.remove_all_documents();
            println!("{}", report.message());
            if !report.is_success() {
                bail!("reset completed with errors");
            }
        }
        Commands::Status => {
            status::run_status(&orchestrator)?;
        }
        Commands::Normalize { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn print_documents(documents: &[&DocumentDescriptor]) {
    if documents.is_empty() {
        println!("No documents found.");
        return;
    }

    let flag = |present: bool| if present { "yes" } else { "-" };
    println!(
        "{:<40} {:>5} {:>9} {:>4} {:>10}  {}",
        "NAME", "CACHE", "PROCESSED", "KB", "SIZE", "MODIFIED"
    );
    println!("{}", "-".repeat(90));
    for doc in documents {
        println!(
            "{:<40} {:>5} {:>9} {:>4} {:>10}  {}",
            doc.name,
            flag(doc.in_cache),
            flag(doc.in_processed_dir),
            flag(doc.in_knowledge_base),
            doc.size.as_deref().unwrap_or("-"),
            doc.modified.as_deref().unwrap_or("-"),
        );
    }
    println!();
    println!("{} document(s)", documents.len());
}
