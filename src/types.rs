use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wall-clock instant used by every timestamped structure.
pub type Timestamp = DateTime<Utc>;

/// Smallest weight an observation can carry.
pub const MIN_WEIGHT: f64 = 1e-4;

/// Maps a fitness value onto a learning weight.
///
/// Context and temporal learning both use this so that a parameter vector
/// learned with fitness `f` counts the same in either subsystem. The mapping
/// is `max(f, MIN_WEIGHT)`: monotonic, and failures (non-positive fitness)
/// still register with a negligible weight rather than being dropped.
pub fn fitness_weight(fitness: f64) -> f64 {
    if fitness.is_nan() {
        return MIN_WEIGHT;
    }
    fitness.max(MIN_WEIGHT)
}

/// Failure severity, ordered from harmless to fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    None,
    Mild,
    Moderate,
    Severe,
    Fatal,
}

impl Severity {
    /// Multiplier applied to the base penalty of a failure with this severity.
    pub fn weight(self) -> f64 {
        match self {
            Severity::None => 0.0,
            Severity::Mild => 0.25,
            Severity::Moderate => 0.5,
            Severity::Severe => 0.75,
            Severity::Fatal => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
            Severity::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fitness_weight_is_monotonic() {
        assert_eq!(fitness_weight(-5.0), MIN_WEIGHT);
        assert_eq!(fitness_weight(0.0), MIN_WEIGHT);
        assert!(fitness_weight(0.5) < fitness_weight(0.9));
        assert_eq!(fitness_weight(f64::NAN), MIN_WEIGHT);
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Fatal > Severity::Severe);
        assert!(Severity::Mild > Severity::None);
        assert_eq!(Severity::Fatal.weight(), 1.0);
    }
}
