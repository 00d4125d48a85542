use crate::config::strategy::ExplorationConfig;
use crate::config::traits::ConfigSection;
use crate::error::{EvoError, Result};
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Temperature never cools below this.
pub const MIN_TEMPERATURE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplorationStrategy {
    Fixed,
    Decay,
    Adaptive,
    Ucb1,
    Boltzmann,
}

impl ExplorationStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ExplorationStrategy::Fixed => "fixed",
            ExplorationStrategy::Decay => "decay",
            ExplorationStrategy::Adaptive => "adaptive",
            ExplorationStrategy::Ucb1 => "ucb1",
            ExplorationStrategy::Boltzmann => "boltzmann",
        }
    }
}

impl fmt::Display for ExplorationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExplorationStrategy {
    type Err = EvoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(ExplorationStrategy::Fixed),
            "decay" => Ok(ExplorationStrategy::Decay),
            "adaptive" => Ok(ExplorationStrategy::Adaptive),
            "ucb1" => Ok(ExplorationStrategy::Ucb1),
            "boltzmann" => Ok(ExplorationStrategy::Boltzmann),
            other => Err(EvoError::invalid(format!("unknown exploration strategy '{}'", other))),
        }
    }
}

/// Exploration-rate controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exploration {
    config: ExplorationConfig,
    current_rate: f64,
    temperature: f64,
    best_fitness: f64,
    stagnant_updates: usize,
    improving_updates: usize,
    improvements: usize,
    total_updates: usize,
    last_generation: usize,
}

impl Exploration {
    pub fn new(config: ExplorationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            current_rate: config.base_rate,
            temperature: config.temperature,
            config,
            best_fitness: f64::NEG_INFINITY,
            stagnant_updates: 0,
            improving_updates: 0,
            improvements: 0,
            total_updates: 0,
            last_generation: 0,
        })
    }

    pub fn strategy(&self) -> ExplorationStrategy {
        self.config.strategy
    }

    pub fn current_rate(&self) -> f64 {
        self.current_rate
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn stagnant_updates(&self) -> usize {
        self.stagnant_updates
    }

    /// Feeds one generation's best fitness and recomputes the rate.
    pub fn update(&mut self, generation: usize, best_fitness: f64) -> f64 {
        self.total_updates += 1;
        self.last_generation = generation;

        let improved = best_fitness > self.best_fitness;
        if improved {
            self.best_fitness = best_fitness;
            self.improvements += 1;
            self.improving_updates += 1;
            self.stagnant_updates = 0;
        } else {
            self.improving_updates = 0;
            self.stagnant_updates += 1;
        }

        let cfg = &self.config;
        let rate = match cfg.strategy {
            ExplorationStrategy::Fixed => cfg.base_rate,
            ExplorationStrategy::Decay => self.current_rate * cfg.decay_rate,
            ExplorationStrategy::Adaptive => {
                if self.stagnant_updates > cfg.stagnation_threshold {
                    self.current_rate * cfg.boost_factor
                } else if self.improving_updates >= cfg.improvement_streak {
                    self.current_rate * cfg.backoff_factor
                } else {
                    self.current_rate
                }
            }
            ExplorationStrategy::Ucb1 => cfg.ucb_c / (self.total_updates as f64).sqrt(),
            ExplorationStrategy::Boltzmann => self.temperature / cfg.temperature,
        };
        if self.config.strategy == ExplorationStrategy::Boltzmann {
            self.cool_temperature();
        }

        self.current_rate = match self.config.strategy {
            ExplorationStrategy::Fixed => rate,
            _ => rate.clamp(self.config.min_rate, self.config.max_rate),
        };
        self.current_rate
    }

    /// Bernoulli draw with probability `current_rate`.
    pub fn should_explore<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        if self.current_rate <= 0.0 {
            return false;
        }
        if self.current_rate >= 1.0 {
            return true;
        }
        rng.gen_bool(self.current_rate)
    }

    pub fn is_stagnant(&self, threshold: usize) -> bool {
        self.stagnant_updates >= threshold
    }

    /// Multiplies the rate by `factor`, within the configured bounds.
    pub fn boost(&mut self, factor: f64) {
        if !(factor > 0.0) {
            return;
        }
        self.current_rate = (self.current_rate * factor).clamp(self.config.min_rate, self.config.max_rate);
        debug!("exploration boosted to {:.4}", self.current_rate);
    }

    pub fn cool_temperature(&mut self) {
        self.temperature = (self.temperature * self.config.cooling_rate).max(MIN_TEMPERATURE);
    }

    /// Fraction of updates that improved on the best fitness so far.
    pub fn improvement_rate(&self) -> f64 {
        if self.total_updates == 0 {
            return 0.0;
        }
        self.improvements as f64 / self.total_updates as f64
    }

    pub fn reset(&mut self) {
        self.current_rate = self.config.base_rate;
        self.temperature = self.config.temperature;
        self.best_fitness = f64::NEG_INFINITY;
        self.stagnant_updates = 0;
        self.improving_updates = 0;
        self.improvements = 0;
        self.total_updates = 0;
        self.last_generation = 0;
    }
}

/// Softmax draw over `values` at `temperature`. Returns `None` for an empty
/// slice.
pub fn boltzmann_select<R: Rng + ?Sized>(values: &[f64], temperature: f64, rng: &mut R) -> Option<usize> {
    if values.is_empty() {
        return None;
    }
    let temperature = temperature.max(MIN_TEMPERATURE);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = values.iter().map(|v| ((v - max) / temperature).exp()).collect();
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return Some(rng.gen_range(0..values.len()));
    }

    let mut spin = rng.gen::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        spin -= w;
        if spin <= 0.0 {
            return Some(i);
        }
    }
    Some(values.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn with_strategy(strategy: ExplorationStrategy) -> Exploration {
        Exploration::new(ExplorationConfig {
            strategy,
            base_rate: 0.5,
            ..ExplorationConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_fixed_is_constant() {
        let mut exp = with_strategy(ExplorationStrategy::Fixed);
        for g in 0..10 {
            assert_eq!(exp.update(g, g as f64), 0.5);
        }
    }

    #[test]
    fn test_decay_is_floored() {
        let mut exp = with_strategy(ExplorationStrategy::Decay);
        assert!((exp.update(0, 1.0) - 0.49).abs() < 1e-12);
        for g in 1..1000 {
            exp.update(g, 1.0);
        }
        assert_eq!(exp.current_rate(), 0.01);
    }

    #[test]
    fn test_adaptive_boosts_when_stagnant() {
        let mut exp = with_strategy(ExplorationStrategy::Adaptive);
        exp.update(0, 1.0);
        for g in 1..=25 {
            exp.update(g, 1.0);
        }
        assert_eq!(exp.current_rate(), 0.5);
        exp.update(26, 1.0);
        assert!(exp.current_rate() > 0.5);
        assert!(exp.is_stagnant(26));
    }

    #[test]
    fn test_adaptive_backs_off_on_improvement() {
        let mut exp = with_strategy(ExplorationStrategy::Adaptive);
        exp.update(0, 1.0);
        exp.update(1, 2.0);
        assert_eq!(exp.current_rate(), 0.5);
        exp.update(2, 3.0);
        assert!(exp.current_rate() < 0.5);
        assert_eq!(exp.improvement_rate(), 1.0);
    }

    #[test]
    fn test_boltzmann_cools() {
        let mut exp = with_strategy(ExplorationStrategy::Boltzmann);
        assert_eq!(exp.update(0, 0.0), 1.0);
        let second = exp.update(1, 0.0);
        assert!((second - 0.95).abs() < 1e-12);
        assert!(exp.temperature() < 100.0);
    }

    #[test]
    fn test_ucb_rate_shrinks() {
        let mut exp = with_strategy(ExplorationStrategy::Ucb1);
        exp.update(0, 0.0);
        let early = exp.current_rate();
        for g in 1..100 {
            exp.update(g, 0.0);
        }
        assert!(exp.current_rate() < early);
    }

    #[test]
    fn test_should_explore_extremes() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut exp = with_strategy(ExplorationStrategy::Fixed);
        exp.boost(10.0);
        assert!(exp.should_explore(&mut rng));

        let never = Exploration::new(ExplorationConfig {
            strategy: ExplorationStrategy::Fixed,
            base_rate: 0.0,
            min_rate: 0.0,
            ..ExplorationConfig::default()
        })
        .unwrap();
        assert!(!never.should_explore(&mut rng));
    }

    #[test]
    fn test_boltzmann_select() {
        let mut rng = StdRng::seed_from_u64(12);
        assert_eq!(boltzmann_select(&[], 1.0, &mut rng), None);

        // near-zero temperature is greedy
        for _ in 0..20 {
            assert_eq!(boltzmann_select(&[0.1, 5.0, 0.3], 0.0, &mut rng), Some(1));
        }

        let mut counts = [0; 2];
        for _ in 0..2000 {
            counts[boltzmann_select(&[0.0, 0.0], 1.0, &mut rng).unwrap()] += 1;
        }
        assert!(counts[0] > 800 && counts[1] > 800);
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!("UCB1".parse::<ExplorationStrategy>().unwrap(), ExplorationStrategy::Ucb1);
        assert_eq!(ExplorationStrategy::Boltzmann.to_string(), "boltzmann");
    }
}
