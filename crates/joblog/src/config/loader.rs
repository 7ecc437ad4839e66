use std::path::Path;

use crate::config::schema::JoblogConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

/// Environment variable that overrides `data_directory`.
pub const DATA_DIR_ENV: &str = "JOBLOG_DATA_DIR";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<JoblogConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<JoblogConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let mut config: JoblogConfig = serde_json::from_value(json_value)?;
    apply_env_overrides(&mut config);

    validate_config(&config)?;

    Ok(config)
}

/// Defaults plus environment overrides, for running without a config file.
pub fn default_config() -> Result<JoblogConfig, ConfigError> {
    let mut config = JoblogConfig::default();
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut JoblogConfig) {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            log::debug!("{} overrides data directory: {}", DATA_DIR_ENV, dir);
            config.data_directory = dir;
        }
    }
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &JoblogConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.data_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "data_directory must not be empty".to_string(),
        });
    }

    if config.learning_threshold == 0 {
        return Err(ConfigError::Validation {
            message: "learning_threshold must be at least 1".to_string(),
        });
    }

    let ratio = config.discovery.min_document_ratio;
    if !(ratio > 0.0 && ratio <= 1.0) {
        return Err(ConfigError::Validation {
            message: format!("discovery.min_document_ratio {} is outside (0, 1]", ratio),
        });
    }
    if config.discovery.min_token_len == 0 || config.discovery.max_candidates == 0 {
        return Err(ConfigError::Validation {
            message: "discovery.min_token_len and discovery.max_candidates must be at least 1"
                .to_string(),
        });
    }

    for (name, value) in [
        ("suggestions.min_confidence", config.suggestions.min_confidence),
        ("classifier.min_confidence", config.classifier.min_confidence),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation {
                message: format!("{} {} is outside [0, 1]", name, value),
            });
        }
    }

    if config.suggestions.queue_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "suggestions.queue_capacity must be at least 1".to_string(),
        });
    }

    match (&config.classifier.lexicon_path, &config.classifier.sha256) {
        (Some(_), None) => {
            return Err(ConfigError::Validation {
                message: "classifier.lexicon_path requires classifier.sha256".to_string(),
            })
        }
        (None, Some(_)) => {
            return Err(ConfigError::Validation {
                message: "classifier.sha256 given without classifier.lexicon_path".to_string(),
            })
        }
        _ => {}
    }

    Ok(())
}
