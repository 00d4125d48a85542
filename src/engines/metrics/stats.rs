use crate::engines::generation::domain::Domain;
use crate::engines::generation::population::{Individual, Population};
use crate::error::{EvoError, Result};
use rand::Rng;
use std::fmt;
use std::mem;
use std::time::{Duration, Instant};

/// Pairs sampled by `population_diversity`.
pub const DIVERSITY_SAMPLES: usize = 100;

const CONVERGED_VARIANCE: f64 = 0.01;
const CONVERGED_STREAK: usize = 50;
const STAGNANT_STREAK: usize = 20;
const DIVERSE_VARIANCE: f64 = 1.0;

/// Per-generation snapshot handed to progress callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionStats {
    pub generation: usize,
    pub best_fitness: f64,
    pub avg_fitness: f64,
    pub worst_fitness: f64,
    pub best_fitness_ever: f64,
    pub worst_fitness_ever: f64,
    pub fitness_variance: f64,
    pub fitness_stddev: f64,
    /// Last gain in best-ever fitness divided by the generation it happened in
    pub improvement_rate: f64,
    /// Generations since best-ever fitness last improved
    pub convergence_streak: usize,
    pub converged: bool,
    pub stagnant: bool,
    pub diverse: bool,
    pub diversity: f64,
    pub generation_time: Duration,
    pub total_time: Duration,
    pub evaluations: u64,
    pub mutations: u64,
    pub crossovers: u64,
    /// Rough bytes held by the population
    pub memory_bytes: usize,
}

impl Default for EvolutionStats {
    fn default() -> Self {
        Self {
            generation: 0,
            best_fitness: 0.0,
            avg_fitness: 0.0,
            worst_fitness: 0.0,
            best_fitness_ever: f64::NEG_INFINITY,
            worst_fitness_ever: f64::INFINITY,
            fitness_variance: 0.0,
            fitness_stddev: 0.0,
            improvement_rate: 0.0,
            convergence_streak: 0,
            converged: false,
            stagnant: false,
            diverse: false,
            diversity: 0.0,
            generation_time: Duration::ZERO,
            total_time: Duration::ZERO,
            evaluations: 0,
            mutations: 0,
            crossovers: 0,
            memory_bytes: 0,
        }
    }
}

impl fmt::Display for EvolutionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gen {} best={:.6} avg={:.6} worst={:.6} ever={:.6} sd={:.4} div={:.3} streak={}{}{} evals={} ({:.1?})",
            self.generation,
            self.best_fitness,
            self.avg_fitness,
            self.worst_fitness,
            self.best_fitness_ever,
            self.fitness_stddev,
            self.diversity,
            self.convergence_streak,
            if self.stagnant { " stagnant" } else { "" },
            if self.converged { " converged" } else { "" },
            self.evaluations,
            self.generation_time,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessDistribution {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
}

/// Min, max, mean and population standard deviation over evaluated,
/// non-NaN individuals.
pub fn fitness_distribution(population: &Population) -> Result<FitnessDistribution> {
    let values: Vec<f64> = population
        .iter()
        .filter_map(|ind| ind.fitness)
        .filter(|f| !f.is_nan())
        .collect();
    if values.is_empty() {
        return Err(EvoError::PopulationEmpty);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    Ok(FitnessDistribution {
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean,
        stddev: variance.sqrt(),
    })
}

/// Mean pairwise genome distance under `domain`, from at most
/// `DIVERSITY_SAMPLES` random pairs. 0 for fewer than two individuals.
pub fn population_diversity<R: Rng + ?Sized>(population: &Population, domain: &dyn Domain, rng: &mut R) -> f64 {
    let n = population.len();
    if n < 2 {
        return 0.0;
    }
    let individuals = population.individuals();
    let mut total = 0.0;
    let samples = n.min(DIVERSITY_SAMPLES);
    for i in 0..samples {
        // any index but i
        let mut j = rng.gen_range(0..n - 1);
        if j >= i {
            j += 1;
        }
        total += domain.diversity(&individuals[i].genome, &individuals[j].genome);
    }
    total / samples as f64
}

fn estimate_memory(population: &Population) -> usize {
    population
        .iter()
        .map(|ind| mem::size_of::<Individual>() + ind.genome.capacity())
        .sum()
}

/// Accumulates per-run statistics across generations.
#[derive(Debug)]
pub struct StatsTracker {
    current: EvolutionStats,
    started: Instant,
    generation_started: Instant,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsTracker {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            current: EvolutionStats::default(),
            started: now,
            generation_started: now,
        }
    }

    pub fn stats(&self) -> &EvolutionStats {
        &self.current
    }

    /// Marks the start of a generation for timing.
    pub fn start_generation(&mut self) {
        self.generation_started = Instant::now();
    }

    pub fn record_operations(&mut self, evaluations: u64, mutations: u64, crossovers: u64) {
        self.current.evaluations += evaluations;
        self.current.mutations += mutations;
        self.current.crossovers += crossovers;
    }

    /// Folds in a population whose stats are current.
    pub fn update(&mut self, population: &Population, diversity: f64) -> Result<&EvolutionStats> {
        let pop_stats = *population.stats()?;
        let distribution = fitness_distribution(population)?;
        let s = &mut self.current;

        s.generation = population.generation();
        s.best_fitness = pop_stats.best_fitness;
        s.avg_fitness = pop_stats.avg_fitness;
        s.worst_fitness = pop_stats.worst_fitness;

        if pop_stats.best_fitness > s.best_fitness_ever {
            if s.best_fitness_ever.is_finite() && s.generation > 0 {
                s.improvement_rate = (pop_stats.best_fitness - s.best_fitness_ever) / s.generation as f64;
            }
            s.best_fitness_ever = pop_stats.best_fitness;
            s.convergence_streak = 0;
        } else {
            s.convergence_streak += 1;
        }
        s.worst_fitness_ever = s.worst_fitness_ever.min(pop_stats.worst_fitness);

        s.fitness_stddev = distribution.stddev;
        s.fitness_variance = distribution.stddev * distribution.stddev;
        s.converged = s.fitness_variance < CONVERGED_VARIANCE && s.convergence_streak > CONVERGED_STREAK;
        s.stagnant = s.convergence_streak > STAGNANT_STREAK;
        s.diverse = s.fitness_variance > DIVERSE_VARIANCE;
        s.diversity = diversity;

        s.generation_time = self.generation_started.elapsed();
        s.total_time = self.started.elapsed();
        s.memory_bytes = estimate_memory(population);
        Ok(&self.current)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
