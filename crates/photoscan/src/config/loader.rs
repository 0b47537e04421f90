use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub const SUPPORTED_VERSION: &str = "1.0";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let invalid = |message: String| Err(ConfigError::Validation { message });

    if config.version != SUPPORTED_VERSION {
        return invalid(format!("Unsupported config version: {}", config.version));
    }

    if config.work_directory.as_os_str().is_empty() {
        return invalid("work_directory must not be empty".to_string());
    }

    if config.worker_count == 0 {
        return invalid("worker_count must be at least 1".to_string());
    }

    if config.tool.program.trim().is_empty() {
        return invalid("tool.program must not be empty".to_string());
    }
    if let Some(image) = &config.tool.docker_image {
        if image.trim().is_empty() {
            return invalid("tool.docker_image must not be empty when set".to_string());
        }
    }

    let pipeline = &config.pipeline;
    if pipeline.stage_timeout_secs == 0 {
        return invalid("pipeline.stage_timeout_secs must be greater than 0".to_string());
    }
    for (name, value) in [
        ("max_image_size", pipeline.max_image_size),
        ("max_num_features", pipeline.max_num_features),
        ("matching_block_size", pipeline.matching_block_size),
    ] {
        if value == 0 {
            return invalid(format!("pipeline.{} must be greater than 0", name));
        }
    }

    let bound = config.mesh.normalize_bound;
    if !bound.is_finite() || bound <= 0.0 {
        return invalid(format!(
            "mesh.normalize_bound must be a positive number, got {}",
            bound
        ));
    }
    if config.mesh.precision > 15 {
        return invalid("mesh.precision must be at most 15".to_string());
    }

    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.logging.filter) {
        return invalid(format!("logging.filter is not a valid directive: {}", e));
    }

    if config.retention_days == Some(0) {
        return invalid("retention_days must be at least 1 when set".to_string());
    }

    Ok(())
}
