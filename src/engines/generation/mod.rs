pub mod domain;
pub mod evolution_engine;
pub mod genome;
pub mod operators;
pub mod population;
pub mod progress;

pub use domain::{ByteDomain, Domain, DomainRegistry};
pub use evolution_engine::{EvolutionEngine, EvolutionResult, ProgressCallback, StopReason};
pub use genome::{Genome, GenomeView};
pub use population::{Individual, Population, PopulationStats};
pub use progress::{ConsoleProgressCallback, IpcProgressCallback, ProgressMessage};
