pub mod reporter;
pub mod stats;

pub use reporter::{LogProgressCallback, ProgressReporter};
pub use stats::{fitness_distribution, population_diversity, EvolutionStats, FitnessDistribution, StatsTracker};
