pub mod bandit;
pub mod exploration;
pub mod similarity;
pub mod synthesis;

pub use bandit::{ArmStats, Bandit};
pub use exploration::{boltzmann_select, Exploration, ExplorationStrategy};
pub use similarity::{param_distance, param_similarity, SimilarityMatrix};
pub use synthesis::{transfer_sources, ParamSource, SynthesisRequest, SynthesisResult, SynthesisStrategy};
