use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Root under which every job gets its own `<job_id>/` working directory.
    pub work_directory: PathBuf,
    /// SQLite status database. Defaults to `~/.photoscan/data/photoscan.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub mesh: MeshSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Working directories of finished jobs older than this are removed.
    #[serde(default)]
    pub retention_days: Option<u32>,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

/// How the external reconstruction program is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// When set, every stage runs inside `docker run <image> <program> ...`.
    #[serde(default)]
    pub docker_image: Option<String>,
}

fn default_program() -> String {
    "colmap".to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            docker_image: None,
        }
    }
}

/// Fixed tuning flags passed to the reconstruction stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    #[serde(default = "default_max_image_size")]
    pub max_image_size: u32,
    #[serde(default = "default_max_num_features")]
    pub max_num_features: u32,
    #[serde(default = "default_matching_block_size")]
    pub matching_block_size: u32,
    #[serde(default = "default_true")]
    pub single_camera: bool,
}

fn default_stage_timeout_secs() -> u64 {
    1800
}

fn default_max_image_size() -> u32 {
    3200
}

fn default_max_num_features() -> u32 {
    8192
}

fn default_matching_block_size() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout_secs(),
            max_image_size: default_max_image_size(),
            max_num_features: default_max_num_features(),
            matching_block_size: default_matching_block_size(),
            single_camera: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshSettings {
    /// Largest absolute coordinate of a normalized hull mesh.
    #[serde(default = "default_normalize_bound")]
    pub normalize_bound: f64,
    /// Decimal places written for vertex coordinates.
    #[serde(default = "default_precision")]
    pub precision: usize,
}

fn default_normalize_bound() -> f64 {
    2.0
}

fn default_precision() -> usize {
    6
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            normalize_bound: default_normalize_bound(),
            precision: default_precision(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_filter() -> String {
    "photoscan=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Minimal configuration rooted at `work_directory`, everything else defaulted.
    pub fn with_work_directory(work_directory: impl Into<PathBuf>) -> Self {
        Self {
            version: "1.0".to_string(),
            work_directory: work_directory.into(),
            database_path: None,
            worker_count: default_worker_count(),
            tool: ToolConfig::default(),
            pipeline: PipelineSettings::default(),
            mesh: MeshSettings::default(),
            logging: LoggingConfig::default(),
            retention_days: None,
        }
    }
}
