//! Adaptive evolutionary optimisation.
//!
//! A domain plugs genome operations and a fitness function into
//! [`EvolutionEngine`]; the engine adapts its own mutation and selection
//! settings as the run progresses. The learning layer remembers which
//! parameters worked in which context and period, and which genomes failed.

pub mod config;
pub mod engines;
pub mod error;
pub mod learning;
pub mod meta;
pub mod persist;
pub mod strategy;
pub mod types;

pub use config::{AppConfig, ConfigManager};
pub use engines::generation::{
    ByteDomain, Domain, EvolutionEngine, EvolutionResult, Genome, Individual, Population, ProgressCallback,
};
pub use engines::metrics::EvolutionStats;
pub use error::{EvoError, Result};
pub use learning::{ContextSystem, NegativeLearning, TemporalSystem, WeightedArray, WeightedStats};
pub use meta::{AdaptiveScheduler, MetaParams, MetaPopulation};
pub use persist::{Checkpoint, CheckpointManager, Format};
pub use strategy::{Bandit, Exploration, SimilarityMatrix, SynthesisRequest};
pub use types::{Severity, Timestamp};
