pub mod batch;

pub use batch::{evaluate_population, BatchEvaluator, ParallelEvaluator, SequentialEvaluator};
