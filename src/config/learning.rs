use super::traits::{check_positive, check_unit, ConfigSection};
use crate::error::EvoError;
use crate::learning::temporal::BucketType;
use serde::{Deserialize, Serialize};

/// Fitness levels at or below which a result counts as a failure of the
/// given severity. Must be strictly decreasing from mild to fatal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    pub mild: f64,
    pub moderate: f64,
    pub severe: f64,
    pub fatal: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            mild: -0.10,
            moderate: -0.25,
            severe: -0.50,
            fatal: -0.90,
        }
    }
}

impl SeverityThresholds {
    pub fn validate(&self) -> Result<(), EvoError> {
        let ordered = self.mild > self.moderate && self.moderate > self.severe && self.severe > self.fatal;
        if !ordered {
            return Err(EvoError::Configuration(format!(
                "severity thresholds must decrease mild > moderate > severe > fatal, got {:?}",
                self
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegativeLearningConfig {
    pub enabled: bool,
    pub capacity: usize,
    /// Zero keeps recording failures without penalizing lookalikes
    pub base_penalty: f64,
    pub repeat_multiplier: f64,
    /// Upper bound on any record's penalty score
    pub penalty_cap: f64,
    /// Fraction of penalty kept per generation
    pub decay_rate: f64,
    pub similarity_threshold: f64,
    /// Records decaying below this are deactivated
    pub penalty_floor: f64,
    /// Generations between automatic prunes (0 disables)
    pub cleanup_interval: usize,
    /// Generations a record may go unseen before cleanup drops it (0 keeps forever)
    pub max_age: usize,
    pub forbidden_threshold: f64,
    pub thresholds: SeverityThresholds,
}

impl Default for NegativeLearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1000,
            base_penalty: 0.5,
            repeat_multiplier: 1.5,
            penalty_cap: 1.0,
            decay_rate: 0.95,
            similarity_threshold: 0.8,
            penalty_floor: 0.01,
            cleanup_interval: 100,
            max_age: 1000,
            forbidden_threshold: 0.5,
            thresholds: SeverityThresholds::default(),
        }
    }
}

impl ConfigSection for NegativeLearningConfig {
    fn section_name() -> &'static str {
        "negative"
    }

    fn validate(&self) -> Result<(), EvoError> {
        let section = Self::section_name();
        if self.capacity == 0 {
            return Err(EvoError::Configuration("negative.capacity must be at least 1".to_string()));
        }
        if !(self.base_penalty >= 0.0) || !self.base_penalty.is_finite() {
            return Err(EvoError::Configuration(format!(
                "negative.base_penalty must be non-negative, got {}",
                self.base_penalty
            )));
        }
        check_positive(section, "penalty_cap", self.penalty_cap)?;
        if !(self.repeat_multiplier >= 1.0) || !self.repeat_multiplier.is_finite() {
            return Err(EvoError::Configuration(
                "negative.repeat_multiplier must be at least 1".to_string(),
            ));
        }
        check_positive(section, "decay_rate", self.decay_rate)?;
        check_unit(section, "decay_rate", self.decay_rate)?;
        check_unit(section, "similarity_threshold", self.similarity_threshold)?;
        if !(self.penalty_floor >= 0.0) {
            return Err(EvoError::Configuration(
                "negative.penalty_floor must be non-negative".to_string(),
            ));
        }
        if !(self.forbidden_threshold >= 0.0) {
            return Err(EvoError::Configuration(
                "negative.forbidden_threshold must be non-negative".to_string(),
            ));
        }
        self.thresholds.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Experiences required before a context counts as having data
    pub min_samples: usize,
    /// Experiences at which confidence saturates
    pub max_samples: usize,
    pub negative: NegativeLearningConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            min_samples: 3,
            max_samples: 100,
            negative: NegativeLearningConfig {
                capacity: 100,
                ..NegativeLearningConfig::default()
            },
        }
    }
}

impl ConfigSection for ContextConfig {
    fn section_name() -> &'static str {
        "context"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.max_samples == 0 {
            return Err(EvoError::Configuration("context.max_samples must be at least 1".to_string()));
        }
        self.negative.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    pub bucket_type: BucketType,
    pub retention_count: usize,
    /// Age, in buckets, at which a bucket's organic weight halves
    pub organic_half_life: f64,
    pub trend_dead_zone: f64,
    pub min_trend_buckets: usize,
    /// Samples at which a bucket's confidence saturates
    pub max_samples: usize,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            bucket_type: BucketType::Day,
            retention_count: 36,
            organic_half_life: 3.0,
            trend_dead_zone: 0.01,
            min_trend_buckets: 3,
            max_samples: 100,
        }
    }
}

impl ConfigSection for TemporalConfig {
    fn section_name() -> &'static str {
        "temporal"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.retention_count == 0 {
            return Err(EvoError::Configuration(
                "temporal.retention_count must be at least 1".to_string(),
            ));
        }
        check_positive(Self::section_name(), "organic_half_life", self.organic_half_life)?;
        if !(self.trend_dead_zone >= 0.0) {
            return Err(EvoError::Configuration(
                "temporal.trend_dead_zone must be non-negative".to_string(),
            ));
        }
        if self.min_trend_buckets < 2 {
            return Err(EvoError::Configuration(
                "temporal.min_trend_buckets must be at least 2".to_string(),
            ));
        }
        if self.max_samples == 0 {
            return Err(EvoError::Configuration("temporal.max_samples must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(NegativeLearningConfig::default().validate().is_ok());
        assert!(ContextConfig::default().validate().is_ok());
        assert!(TemporalConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let config = NegativeLearningConfig {
            thresholds: SeverityThresholds {
                mild: -0.5,
                moderate: -0.25,
                ..SeverityThresholds::default()
            },
            ..NegativeLearningConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_penalty_bounds() {
        let silent = NegativeLearningConfig {
            base_penalty: 0.0,
            ..NegativeLearningConfig::default()
        };
        assert!(silent.validate().is_ok());

        let negative = NegativeLearningConfig {
            base_penalty: -0.1,
            ..NegativeLearningConfig::default()
        };
        assert!(negative.validate().is_err());

        let uncapped = NegativeLearningConfig {
            penalty_cap: f64::INFINITY,
            ..NegativeLearningConfig::default()
        };
        assert!(uncapped.validate().is_err());
    }

    #[test]
    fn test_decay_rate_bounds() {
        let config = NegativeLearningConfig {
            decay_rate: 0.0,
            ..NegativeLearningConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
