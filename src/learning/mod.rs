pub mod context;
pub mod negative;
pub mod temporal;
pub mod weighted;

pub use context::{ContextStats, ContextSystem, Dimension};
pub use negative::{classify_failure, FailureOutcome, FailureRecord, NegativeLearning, NegativeStats};
pub use temporal::{trend_direction, BucketType, OrganicMean, TemporalBucket, TemporalSystem};
pub use weighted::{WeightedArray, WeightedStats};
