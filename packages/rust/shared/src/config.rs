//! Application configuration for graphqa.
//!
//! User config lives at `~/.graphqa/graphqa.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GraphQaError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "graphqa.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".graphqa";

const MIB: u64 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Config structs (matching graphqa.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Conversion defaults.
    #[serde(default)]
    pub conversion: ConversionDefaults,

    /// Job service settings.
    #[serde(default)]
    pub service: ServiceDefaults,

    /// Output dataset naming.
    #[serde(default)]
    pub dataset: DatasetConfig,
}

/// `[conversion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionDefaults {
    /// Soft upper bound for a single chunk file.
    #[serde(default = "default_target_chunk_size")]
    pub target_chunk_size_bytes: u64,

    /// Validate every line as JSON while splitting and drop malformed ones.
    #[serde(default = "default_true")]
    pub preserve_graph_integrity: bool,

    /// Persist progress at chunk boundaries so an interrupted run can resume.
    #[serde(default = "default_true")]
    pub enable_checkpointing: bool,

    /// Process memory ceiling.
    #[serde(default = "default_max_memory")]
    pub max_memory_usage_bytes: u64,

    /// Records converted between memory checks and output flushes.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Keep chunk files on disk after a successful conversion.
    #[serde(default)]
    pub keep_chunks: bool,
}

impl Default for ConversionDefaults {
    fn default() -> Self {
        Self {
            target_chunk_size_bytes: default_target_chunk_size(),
            preserve_graph_integrity: true,
            enable_checkpointing: true,
            max_memory_usage_bytes: default_max_memory(),
            batch_size: default_batch_size(),
            keep_chunks: false,
        }
    }
}

fn default_target_chunk_size() -> u64 {
    10 * MIB
}
fn default_max_memory() -> u64 {
    2048 * MIB
}
fn default_batch_size() -> usize {
    1000
}
fn default_true() -> bool {
    true
}

/// `[service]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefaults {
    /// Root for per-source work directories (chunks, manifest, checkpoint).
    /// Empty means `~/.graphqa/work`.
    #[serde(default)]
    pub work_dir: String,

    /// How long terminal jobs stay queryable before the purge sweep drops them.
    #[serde(default = "default_retention")]
    pub job_retention_secs: u64,

    /// Liveness ticker interval for running jobs.
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_ms: u64,
}

impl Default for ServiceDefaults {
    fn default() -> Self {
        Self {
            work_dir: String::new(),
            job_retention_secs: default_retention(),
            heartbeat_interval_ms: default_heartbeat(),
        }
    }
}

fn default_retention() -> u64 {
    3600
}
fn default_heartbeat() -> u64 {
    1000
}

impl ServiceDefaults {
    /// Resolve the work directory, falling back to `~/.graphqa/work`.
    pub fn resolve_work_dir(&self) -> Result<PathBuf> {
        if self.work_dir.is_empty() {
            Ok(config_dir()?.join("work"))
        } else {
            Ok(PathBuf::from(&self.work_dir))
        }
    }
}

/// `[dataset]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Name stamped on every produced dataset.
    #[serde(default = "default_dataset_name")]
    pub name: String,

    /// Dataset version string.
    #[serde(default = "default_dataset_version")]
    pub version: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: default_dataset_name(),
            version: default_dataset_version(),
            description: String::new(),
        }
    }
}

fn default_dataset_name() -> String {
    "graph-qa".into()
}
fn default_dataset_version() -> String {
    "1.0.0".into()
}

// ---------------------------------------------------------------------------
// Conversion config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime conversion configuration, snapshotted into every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionConfig {
    pub target_chunk_size_bytes: u64,
    pub preserve_graph_integrity: bool,
    pub enable_checkpointing: bool,
    pub max_memory_usage_bytes: u64,
    pub batch_size: usize,
    pub keep_chunks: bool,
    pub dataset_name: String,
    pub dataset_version: String,
    pub dataset_description: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ConversionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            target_chunk_size_bytes: config.conversion.target_chunk_size_bytes,
            preserve_graph_integrity: config.conversion.preserve_graph_integrity,
            enable_checkpointing: config.conversion.enable_checkpointing,
            max_memory_usage_bytes: config.conversion.max_memory_usage_bytes,
            batch_size: config.conversion.batch_size,
            keep_chunks: config.conversion.keep_chunks,
            dataset_name: config.dataset.name.clone(),
            dataset_version: config.dataset.version.clone(),
            dataset_description: config.dataset.description.clone(),
        }
    }
}

impl ConversionConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.target_chunk_size_bytes == 0 {
            return Err(GraphQaError::config("target_chunk_size_bytes must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(GraphQaError::config("batch_size must be > 0"));
        }
        if self.max_memory_usage_bytes == 0 {
            return Err(GraphQaError::config("max_memory_usage_bytes must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.graphqa/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GraphQaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.graphqa/graphqa.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GraphQaError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| GraphQaError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GraphQaError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GraphQaError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GraphQaError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
