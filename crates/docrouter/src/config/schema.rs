use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::registry::PromptInput;
use crate::secrets;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// SQLite file; defaults to `~/.docrouter/data/docrouter.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    pub stage: StageConfig,
    /// Parallel batch workers. 0 means one per CPU.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    pub ai: AiConfig,
    /// Registry seed applied by `setup`.
    #[serde(default)]
    pub document_types: Vec<DocumentTypeSeed>,
}

fn default_worker_count() -> usize {
    1
}

impl Config {
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(secrets::expand_home(path))),
            None => crate::db::default_database_path(),
        }
    }

    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count == 0 {
            num_cpus::get()
        } else {
            self.worker_count
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub directory: String,
    /// Public URL prefix staged files are served under.
    #[serde(default)]
    pub url_base: Option<String>,
}

impl StageConfig {
    pub fn directory_path(&self) -> PathBuf {
        PathBuf::from(secrets::expand_home(&self.directory))
    }
}

/// Document-AI service connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
    /// Model name sent with completion calls; the service default when unset.
    #[serde(default)]
    pub validation_model: Option<String>,
    #[serde(default)]
    pub validation_temperature: f32,
}

pub const DEFAULT_API_KEY_ENV_VAR: &str = "DOCROUTER_AI_API_KEY";

fn default_api_key_env_var() -> Option<String> {
    Some(DEFAULT_API_KEY_ENV_VAR.to_string())
}

fn default_ai_timeout() -> u64 {
    120
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            timeout_secs: default_ai_timeout(),
            validation_model: None,
            validation_temperature: 0.0,
        }
    }
}

/// One registry entry seeded from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTypeSeed {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// When present, replaces the type's field prompts on `setup`.
    #[serde(default)]
    pub fields: Option<Vec<PromptInput>>,
}
