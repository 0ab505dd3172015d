use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File name of the knowledge base's document table inside its storage dir.
pub const DOC_TABLE_FILE: &str = "kv_store_full_docs.json";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub pipeline: Option<PipelineConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub knowledge_base_dir: Option<PathBuf>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub cache_file: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            knowledge_base_dir: None,
            output_dir: None,
            cache_file: None,
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./storage")
}

impl StorageConfig {
    pub fn knowledge_base_dir(&self) -> PathBuf {
        self.knowledge_base_dir
            .clone()
            .unwrap_or_else(|| self.root.join("lightrag_storage"))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.root.join("processed_docs"))
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_file
            .clone()
            .unwrap_or_else(|| self.root.join("cache").join("processed_files.json"))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub pending_dir: Option<PathBuf>,
    #[serde(default)]
    pub processed_dir: Option<PathBuf>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: default_documents_root(),
            pending_dir: None,
            processed_dir: None,
            exclude_globs: Vec::new(),
        }
    }
}

fn default_documents_root() -> PathBuf {
    PathBuf::from("./documents")
}

impl DocumentsConfig {
    pub fn pending_dir(&self) -> PathBuf {
        self.pending_dir
            .clone()
            .unwrap_or_else(|| self.root.join("pending"))
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.processed_dir
            .clone()
            .unwrap_or_else(|| self.root.join("processed"))
    }

    pub fn exclude_set(&self) -> Result<GlobSet> {
        build_globset(&self.exclude_globs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub command: String,
    #[serde(default = "default_pipeline_args")]
    pub args: Vec<String>,
    #[serde(default = "default_parse_method")]
    pub parse_method: String,
}

fn default_pipeline_args() -> Vec<String> {
    vec![
        "--file".to_string(),
        "{file}".to_string(),
        "--output".to_string(),
        "{output_dir}".to_string(),
        "--parse-method".to_string(),
        "{parse_method}".to_string(),
    ]
}

fn default_parse_method() -> String {
    "auto".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// All-defaults config for commands that run without a config file.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn parse_method(&self) -> &str {
        self.pipeline
            .as_ref()
            .map(|p| p.parse_method.as_str())
            .unwrap_or("auto")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.documents.pending_dir() == config.documents.processed_dir() {
        anyhow::bail!(
            "documents.pending_dir and documents.processed_dir must differ (both are {})",
            config.documents.pending_dir().display()
        );
    }

    config
        .documents
        .exclude_set()
        .with_context(|| "Invalid pattern in documents.exclude_globs")?;

    if let Some(pipeline) = &config.pipeline {
        if pipeline.command.trim().is_empty() {
            anyhow::bail!("pipeline.command must not be empty");
        }
        match pipeline.parse_method.as_str() {
            "auto" | "ocr" | "txt" => {}
            other => anyhow::bail!(
                "Unknown parse method: '{}'. Must be auto, ocr, or txt.",
                other
            ),
        }
    }

    if config.logging.level.trim().is_empty() {
        anyhow::bail!("logging.level must not be empty");
    }

    Ok(())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
