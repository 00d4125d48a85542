use super::traits::{check_positive, check_unit, ConfigSection};
use crate::error::EvoError;
use crate::strategy::exploration::ExplorationStrategy;
use crate::strategy::synthesis::SynthesisStrategy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    pub strategy: ExplorationStrategy,
    pub base_rate: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub decay_rate: f64,
    pub temperature: f64,
    pub cooling_rate: f64,
    pub ucb_c: f64,
    /// Stagnant updates tolerated before ADAPTIVE starts boosting
    pub stagnation_threshold: usize,
    /// Consecutive improvements before ADAPTIVE starts backing off
    pub improvement_streak: usize,
    pub boost_factor: f64,
    pub backoff_factor: f64,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            strategy: ExplorationStrategy::Adaptive,
            base_rate: 0.3,
            min_rate: 0.01,
            max_rate: 1.0,
            decay_rate: 0.98,
            temperature: 100.0,
            cooling_rate: 0.95,
            ucb_c: std::f64::consts::SQRT_2,
            stagnation_threshold: 25,
            improvement_streak: 3,
            boost_factor: 1.1,
            backoff_factor: 0.9,
        }
    }
}

impl ConfigSection for ExplorationConfig {
    fn section_name() -> &'static str {
        "exploration"
    }

    fn validate(&self) -> Result<(), EvoError> {
        let section = Self::section_name();
        check_unit(section, "base_rate", self.base_rate)?;
        check_unit(section, "min_rate", self.min_rate)?;
        check_unit(section, "max_rate", self.max_rate)?;
        if self.min_rate > self.max_rate {
            return Err(EvoError::Configuration(
                "exploration.min_rate must not exceed max_rate".to_string(),
            ));
        }
        check_unit(section, "decay_rate", self.decay_rate)?;
        check_unit(section, "cooling_rate", self.cooling_rate)?;
        check_positive(section, "temperature", self.temperature)?;
        if !(self.ucb_c >= 0.0) {
            return Err(EvoError::Configuration("exploration.ucb_c must be non-negative".to_string()));
        }
        if !(self.boost_factor >= 1.0) {
            return Err(EvoError::Configuration(
                "exploration.boost_factor must be at least 1".to_string(),
            ));
        }
        check_positive(section, "backoff_factor", self.backoff_factor)?;
        check_unit(section, "backoff_factor", self.backoff_factor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub strategy: SynthesisStrategy,
    pub exploration: f64,
    pub trend_strength: f64,
    /// Contexts less similar than this are not used as transfer sources
    pub min_similarity: f64,
    /// Parameter distance at which similarity falls to 1/e
    pub max_distance: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            strategy: SynthesisStrategy::Weighted,
            exploration: 0.0,
            trend_strength: 0.5,
            min_similarity: 0.3,
            max_distance: 1.0,
        }
    }
}

impl ConfigSection for SynthesisConfig {
    fn section_name() -> &'static str {
        "synthesis"
    }

    fn validate(&self) -> Result<(), EvoError> {
        let section = Self::section_name();
        check_unit(section, "exploration", self.exploration)?;
        check_unit(section, "min_similarity", self.min_similarity)?;
        check_positive(section, "max_distance", self.max_distance)?;
        if !self.trend_strength.is_finite() {
            return Err(EvoError::Configuration(
                "synthesis.trend_strength must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
