use super::traits::{check_positive, check_unit, ConfigSection};
use crate::error::EvoError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Generations of best fitness kept for variance and trend
    pub history_window: usize,
    pub stagnation_threshold: usize,
    /// Generations recovery mode lasts once triggered
    pub recovery_duration: usize,
    /// Smallest gain in best fitness that counts as improvement
    pub improvement_epsilon: f64,
    pub min_diversity: f64,
    pub min_mutation_rate: f64,
    pub decay_alpha: f64,
    pub stagnation_boost: f64,
    pub diversity_boost: f64,
    pub high_variance_kill: f64,
    pub medium_variance_kill: f64,
    pub low_variance_kill: f64,
    pub high_variance_threshold: f64,
    pub low_variance_threshold: f64,
    pub expansion_factor: f64,
    pub diversity_smoothing: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            history_window: 50,
            stagnation_threshold: 20,
            recovery_duration: 10,
            improvement_epsilon: 1e-6,
            min_diversity: 0.1,
            min_mutation_rate: 0.001,
            decay_alpha: 0.01,
            stagnation_boost: 3.0,
            diversity_boost: 1.5,
            high_variance_kill: 0.15,
            medium_variance_kill: 0.25,
            low_variance_kill: 0.40,
            high_variance_threshold: 0.15,
            low_variance_threshold: 0.05,
            expansion_factor: 1.5,
            diversity_smoothing: 0.1,
        }
    }
}

impl ConfigSection for SchedulerConfig {
    fn section_name() -> &'static str {
        "scheduler"
    }

    fn validate(&self) -> Result<(), EvoError> {
        let section = Self::section_name();
        if self.history_window < 2 {
            return Err(EvoError::Configuration(
                "scheduler.history_window must be at least 2".to_string(),
            ));
        }
        if self.stagnation_threshold == 0 {
            return Err(EvoError::Configuration(
                "scheduler.stagnation_threshold must be at least 1".to_string(),
            ));
        }
        if !(self.improvement_epsilon >= 0.0) {
            return Err(EvoError::Configuration(
                "scheduler.improvement_epsilon must be non-negative".to_string(),
            ));
        }
        check_unit(section, "min_diversity", self.min_diversity)?;
        check_unit(section, "min_mutation_rate", self.min_mutation_rate)?;
        if !(self.decay_alpha >= 0.0) {
            return Err(EvoError::Configuration(
                "scheduler.decay_alpha must be non-negative".to_string(),
            ));
        }
        check_positive(section, "stagnation_boost", self.stagnation_boost)?;
        check_positive(section, "diversity_boost", self.diversity_boost)?;
        check_unit(section, "high_variance_kill", self.high_variance_kill)?;
        check_unit(section, "medium_variance_kill", self.medium_variance_kill)?;
        check_unit(section, "low_variance_kill", self.low_variance_kill)?;
        if self.low_variance_threshold > self.high_variance_threshold {
            return Err(EvoError::Configuration(
                "scheduler.low_variance_threshold must not exceed high_variance_threshold".to_string(),
            ));
        }
        check_positive(section, "expansion_factor", self.expansion_factor)?;
        check_unit(section, "diversity_smoothing", self.diversity_smoothing)
    }
}
