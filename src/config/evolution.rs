use super::traits::{check_unit, ConfigSection};
use crate::error::EvoError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub generations: usize,
    pub crossover_rate: f64,
    pub tournament_size: usize,
    /// Best individuals copied unchanged into the next generation
    pub elitism_count: usize,
    /// Initial mutation rate; the scheduler adapts it from here
    pub mutation_rate: f64,
    pub seed: Option<u64>,
    pub parallel: bool,
    /// Batches smaller than this are evaluated on the calling thread
    pub min_parallel_batch: usize,
    /// Stop as soon as the best fitness reaches this value
    pub target_fitness: Option<f64>,
    pub stop_on_convergence: bool,
    /// Let the scheduler grow and shrink the population
    pub adaptive_population: bool,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            generations: 100,
            crossover_rate: 0.8,
            tournament_size: 3,
            elitism_count: 2,
            mutation_rate: 0.05,
            seed: None,
            parallel: true,
            min_parallel_batch: 16,
            target_fitness: None,
            stop_on_convergence: false,
            adaptive_population: false,
        }
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.population_size < 2 {
            return Err(EvoError::Configuration(
                "Population size must be at least 2".to_string()
            ));
        }
        if self.generations == 0 {
            return Err(EvoError::Configuration(
                "Generations must be at least 1".to_string()
            ));
        }
        if self.tournament_size == 0 || self.tournament_size > self.population_size {
            return Err(EvoError::Configuration(format!(
                "Tournament size must be between 1 and the population size ({}), got {}",
                self.population_size, self.tournament_size
            )));
        }
        if self.elitism_count >= self.population_size {
            return Err(EvoError::Configuration(
                "Elitism count must be smaller than the population size".to_string()
            ));
        }
        check_unit(Self::section_name(), "crossover_rate", self.crossover_rate)?;
        check_unit(Self::section_name(), "mutation_rate", self.mutation_rate)?;
        if let Some(target) = self.target_fitness {
            if !target.is_finite() {
                return Err(EvoError::Configuration(
                    "Target fitness must be finite".to_string()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        EvolutionConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_oversized_tournament() {
        let cfg = EvolutionConfig {
            population_size: 4,
            tournament_size: 5,
            ..EvolutionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_all_elite() {
        let cfg = EvolutionConfig {
            population_size: 4,
            tournament_size: 2,
            elitism_count: 4,
            ..EvolutionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
