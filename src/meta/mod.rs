pub mod adapt;
pub mod params;
pub mod population;
pub mod scheduler;

pub use adapt::{adapt, suggest_mutation_rate, suggest_selection_pressure, OutcomeLearner};
pub use params::{FieldKind, FieldSpec, MetaParams, FIELDS};
pub use population::{meta_evaluate, MetaIndividual, MetaPopulation};
pub use scheduler::{AdaptiveScheduler, DiversityAction, Phase};
