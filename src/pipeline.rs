//! The extraction/embedding pipeline, seen from the outside.
//!
//! Parsing files, captioning their images and tables, embedding chunks, and
//! updating the knowledge graph all happen behind [`Pipeline`]. The
//! orchestrator only needs to know whether a run succeeded.
//!
//! [`CommandPipeline`] runs an external program per document, with
//! `{file}`, `{output_dir}`, and `{parse_method}` substituted into its
//! arguments. A non-zero exit status is a failure.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

use crate::config::{Config, PipelineConfig};

#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Fully ingest one document. Returns once the knowledge base has been
    /// updated, or with an error if it could not be.
    async fn process_document_complete(
        &self,
        file_path: &Path,
        output_dir: &Path,
        parse_method: &str,
    ) -> Result<()>;
}

pub struct CommandPipeline {
    program: String,
    args: Vec<String>,
}

impl CommandPipeline {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    fn render_args(&self, file_path: &Path, output_dir: &Path, parse_method: &str) -> Vec<String> {
        let file = file_path.to_string_lossy();
        let output = output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{file}", &file)
                    .replace("{output_dir}", &output)
                    .replace("{parse_method}", parse_method)
            })
            .collect()
    }
}

#[async_trait]
impl Pipeline for CommandPipeline {
    async fn process_document_complete(
        &self,
        file_path: &Path,
        output_dir: &Path,
        parse_method: &str,
    ) -> Result<()> {
        let args = self.render_args(file_path, output_dir, parse_method);
        debug!(program = %self.program, ?args, "running pipeline command");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("Failed to run pipeline command '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pipeline command '{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

/// Used when the config has no `[pipeline]` table. Every run fails, so
/// read-only commands still work and processing reports why it cannot.
pub struct UnconfiguredPipeline;

#[async_trait]
impl Pipeline for UnconfiguredPipeline {
    async fn process_document_complete(
        &self,
        _file_path: &Path,
        _output_dir: &Path,
        _parse_method: &str,
    ) -> Result<()> {
        bail!("no [pipeline] command configured")
    }
}

/// The pipeline described by `config`.
pub fn from_config(config: &Config) -> Arc<dyn Pipeline> {
    match &config.pipeline {
        Some(pipeline) => Arc::new(CommandPipeline::from_config(pipeline)),
        None => Arc::new(UnconfiguredPipeline),
    }
}
