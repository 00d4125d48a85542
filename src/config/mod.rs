pub mod traits;
pub mod checkpoint;
pub mod evolution;
pub mod learning;
pub mod manager;
pub mod scheduler;
pub mod source;
pub mod strategy;

pub use checkpoint::{CheckpointConfig, ReportingConfig};
pub use evolution::EvolutionConfig;
pub use learning::{ContextConfig, NegativeLearningConfig, SeverityThresholds, TemporalConfig};
pub use manager::{AppConfig, ConfigManager};
pub use scheduler::SchedulerConfig;
pub use source::ConfigSource;
pub use strategy::{ExplorationConfig, SynthesisConfig};
pub use traits::ConfigSection;
