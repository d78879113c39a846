use crate::config::Config;

/// Tunables the pipeline reads on every file.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Sampling temperature for the validation completion.
    pub validation_temperature: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validation_temperature: 0.0,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            validation_temperature: config.ai.validation_temperature,
        }
    }
}
