use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::registry::NO_MATCH;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// `~/.docrouter/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".docrouter").join("config.json"))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
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

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let endpoint = config.ai.endpoint.trim();
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(ConfigError::Validation {
            message: format!("ai.endpoint must be an http(s) URL, got '{}'", endpoint),
        });
    }

    if let Some(url_base) = &config.stage.url_base {
        if reqwest::Url::parse(url_base).is_err() {
            return Err(ConfigError::Validation {
                message: format!("stage.url_base is not a valid URL: '{}'", url_base),
            });
        }
    }

    let mut names = HashSet::new();
    for seed in &config.document_types {
        let name = seed.name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidDocumentType {
                name: seed.name.clone(),
                reason: "Name is empty".to_string(),
            });
        }
        if name.eq_ignore_ascii_case(NO_MATCH) {
            return Err(ConfigError::InvalidDocumentType {
                name: seed.name.clone(),
                reason: format!("{} is reserved for unclassified documents", NO_MATCH),
            });
        }
        if !names.insert(name.to_uppercase()) {
            return Err(ConfigError::InvalidDocumentType {
                name: seed.name.clone(),
                reason: "Duplicate document type".to_string(),
            });
        }
    }

    Ok(())
}
