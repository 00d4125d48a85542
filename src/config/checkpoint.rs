use super::traits::ConfigSection;
use crate::error::EvoError;
use crate::persist::Format;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub enabled: bool,
    pub every_n_generations: usize,
    pub directory: PathBuf,
    /// Oldest files beyond this count are deleted (0 keeps all)
    pub max_checkpoints: usize,
    pub format: Format,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            every_n_generations: 10,
            directory: PathBuf::from("./checkpoints"),
            max_checkpoints: 5,
            format: Format::Json,
        }
    }
}

impl ConfigSection for CheckpointConfig {
    fn section_name() -> &'static str {
        "checkpoint"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.enabled && self.every_n_generations == 0 {
            return Err(EvoError::Configuration(
                "checkpoint.every_n_generations must be at least 1 when checkpoints are enabled".to_string(),
            ));
        }
        if self.enabled && self.directory.as_os_str().is_empty() {
            return Err(EvoError::Configuration("checkpoint.directory is empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub enabled: bool,
    pub every_n_generations: usize,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            every_n_generations: 10,
        }
    }
}

impl ConfigSection for ReportingConfig {
    fn section_name() -> &'static str {
        "reporting"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.enabled && self.every_n_generations == 0 {
            return Err(EvoError::Configuration(
                "reporting.every_n_generations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
