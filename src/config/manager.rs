use super::{
    checkpoint::{CheckpointConfig, ReportingConfig},
    evolution::EvolutionConfig,
    learning::{ContextConfig, NegativeLearningConfig, TemporalConfig},
    scheduler::SchedulerConfig,
    source::ConfigSource,
    strategy::{ExplorationConfig, SynthesisConfig},
    traits::ConfigSection,
};
use crate::error::EvoError;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub evolution: EvolutionConfig,
    pub context: ContextConfig,
    pub temporal: TemporalConfig,
    pub negative: NegativeLearningConfig,
    pub exploration: ExplorationConfig,
    pub synthesis: SynthesisConfig,
    pub scheduler: SchedulerConfig,
    pub checkpoint: CheckpointConfig,
    pub reporting: ReportingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), EvoError> {
        self.evolution.validate()?;
        self.context.validate()?;
        self.temporal.validate()?;
        self.negative.validate()?;
        self.exploration.validate()?;
        self.synthesis.validate()?;
        self.scheduler.validate()?;
        self.checkpoint.validate()?;
        self.reporting.validate()?;
        Ok(())
    }

    /// Reads every section from `source`, defaulting the absent ones.
    pub fn from_source(source: &ConfigSource) -> Result<Self, EvoError> {
        Ok(Self {
            evolution: source.section()?,
            context: source.section()?,
            temporal: source.section()?,
            negative: source.section()?,
            exploration: source.section()?,
            synthesis: source.section()?,
            scheduler: source.section()?,
            checkpoint: source.section()?,
            reporting: source.section()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

fn poisoned<T>(_: T) -> EvoError {
    EvoError::Configuration("configuration lock poisoned".to_string())
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AppConfig) -> Result<Self, EvoError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, AppConfig>, EvoError> {
        self.config.read().map_err(poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, AppConfig>, EvoError> {
        self.config.write().map_err(poisoned)
    }

    /// Loads TOML or JSON (by extension) with `ADAPTEVO_*` environment
    /// overrides. The current config is untouched if anything fails.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvoError> {
        let path = path.as_ref();
        let source = ConfigSource::from_file(path)?;
        let config = AppConfig::from_source(&source)?;
        config.validate()?;

        *self.write()? = config;
        info!("configuration loaded from {}", path.display());
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvoError> {
        let path = path.as_ref();
        let config = self.read()?;
        let toml_str = toml::to_string_pretty(&*config)
            .map_err(|e| EvoError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str).map_err(|e| EvoError::FileWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    pub fn get(&self) -> Result<AppConfig, EvoError> {
        Ok(self.read()?.clone())
    }

    /// Applies `f` to a copy and commits it only if the result validates.
    pub fn update<F>(&self, f: F) -> Result<(), EvoError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.write()?;
        let mut candidate = config.clone();
        f(&mut candidate);
        candidate.validate()?;
        *config = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::Format;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adaptevo.toml");

        let manager = ConfigManager::new();
        manager
            .update(|c| {
                c.evolution.population_size = 64;
                c.checkpoint.format = Format::Binary;
                c.scheduler.stagnation_threshold = 7;
            })
            .unwrap();
        manager.save_to_file(&path).unwrap();

        let loaded = ConfigManager::new();
        loaded.load_from_file(&path).unwrap();
        let config = loaded.get().unwrap();
        assert_eq!(config.evolution.population_size, 64);
        assert_eq!(config.checkpoint.format, Format::Binary);
        assert_eq!(config.scheduler.stagnation_threshold, 7);
    }

    #[test]
    fn test_invalid_update_is_not_committed() {
        let manager = ConfigManager::new();
        let result = manager.update(|c| c.evolution.crossover_rate = 3.0);
        assert!(result.is_err());
        assert_eq!(manager.get().unwrap().evolution.crossover_rate, 0.8);
    }

    #[test]
    fn test_partial_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"evolution": {"generations": 12}}"#).unwrap();

        let manager = ConfigManager::new();
        manager.load_from_file(&path).unwrap();
        let config = manager.get().unwrap();
        assert_eq!(config.evolution.generations, 12);
        assert_eq!(config.negative, NegativeLearningConfig::default());
    }
}
