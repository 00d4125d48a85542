use crate::config::learning::NegativeLearningConfig;
use crate::error::{EvoError, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Real,
    Ratio,
    Size,
    Flag,
}

/// Name, kind and the range `mutate`/`random` keep each field inside.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub min: f64,
    pub max: f64,
}

const fn spec(name: &'static str, kind: FieldKind, min: f64, max: f64) -> FieldSpec {
    FieldSpec { name, kind, min, max }
}

pub const FIELDS: &[FieldSpec] = &[
    spec("optimization_mutation_rate", FieldKind::Ratio, 0.01, 0.50),
    spec("variance_mutation_rate", FieldKind::Ratio, 0.05, 0.50),
    spec("experimentation_rate", FieldKind::Ratio, 0.01, 0.30),
    spec("elite_protection_ratio", FieldKind::Ratio, 0.05, 0.30),
    spec("culling_ratio", FieldKind::Ratio, 0.10, 0.50),
    spec("fitness_threshold_for_breeding", FieldKind::Real, 0.0, 1.0),
    spec("target_population_size", FieldKind::Size, 50.0, 10_000.0),
    spec("min_population_size", FieldKind::Size, 10.0, 10_000.0),
    spec("max_population_size", FieldKind::Size, 50.0, 20_000.0),
    spec("learning_rate", FieldKind::Ratio, 0.01, 1.0),
    spec("exploration_factor", FieldKind::Ratio, 0.0, 1.0),
    spec("confidence_threshold", FieldKind::Ratio, 0.0, 1.0),
    spec("profitable_optimization_ratio", FieldKind::Ratio, 0.5, 1.0),
    spec("profitable_random_ratio", FieldKind::Ratio, 0.0, 0.2),
    spec("losing_optimization_ratio", FieldKind::Ratio, 0.2, 0.8),
    spec("losing_random_ratio", FieldKind::Ratio, 0.1, 0.5),
    spec("meta_mutation_rate", FieldKind::Ratio, 0.01, 0.20),
    spec("meta_learning_rate", FieldKind::Ratio, 0.01, 0.50),
    spec("meta_convergence_threshold", FieldKind::Real, 0.001, 0.1),
    spec("negative_learning_enabled", FieldKind::Flag, 0.0, 1.0),
    spec("negative_penalty_weight", FieldKind::Ratio, 0.0, 1.0),
    spec("negative_decay_rate", FieldKind::Ratio, 0.0, 0.2),
    spec("negative_capacity", FieldKind::Size, 100.0, 5_000.0),
    spec("negative_similarity_threshold", FieldKind::Ratio, 0.5, 0.95),
    spec("negative_forbidden_threshold", FieldKind::Ratio, 0.3, 0.8),
];

/// Hyperparameters of the evolutionary search itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaParams {
    pub optimization_mutation_rate: f64,
    pub variance_mutation_rate: f64,
    pub experimentation_rate: f64,

    pub elite_protection_ratio: f64,
    pub culling_ratio: f64,
    pub fitness_threshold_for_breeding: f64,

    pub target_population_size: usize,
    pub min_population_size: usize,
    pub max_population_size: usize,

    pub learning_rate: f64,
    pub exploration_factor: f64,
    pub confidence_threshold: f64,

    pub profitable_optimization_ratio: f64,
    pub profitable_random_ratio: f64,
    pub losing_optimization_ratio: f64,
    pub losing_random_ratio: f64,

    pub meta_mutation_rate: f64,
    pub meta_learning_rate: f64,
    pub meta_convergence_threshold: f64,

    pub negative_learning_enabled: bool,
    pub negative_penalty_weight: f64,
    /// Fraction of a penalty lost per generation
    pub negative_decay_rate: f64,
    pub negative_capacity: usize,
    pub negative_similarity_threshold: f64,
    pub negative_forbidden_threshold: f64,
}

impl Default for MetaParams {
    fn default() -> Self {
        Self {
            optimization_mutation_rate: 0.05,
            variance_mutation_rate: 0.15,
            experimentation_rate: 0.05,
            elite_protection_ratio: 0.10,
            culling_ratio: 0.25,
            fitness_threshold_for_breeding: 0.0,
            target_population_size: 500,
            min_population_size: 50,
            max_population_size: 2000,
            learning_rate: 0.1,
            exploration_factor: 0.3,
            confidence_threshold: 0.7,
            profitable_optimization_ratio: 0.80,
            profitable_random_ratio: 0.05,
            losing_optimization_ratio: 0.50,
            losing_random_ratio: 0.25,
            meta_mutation_rate: 0.05,
            meta_learning_rate: 0.1,
            meta_convergence_threshold: 0.01,
            negative_learning_enabled: true,
            negative_penalty_weight: 0.5,
            negative_decay_rate: 0.05,
            negative_capacity: 1000,
            negative_similarity_threshold: 0.8,
            negative_forbidden_threshold: 0.5,
        }
    }
}

fn field_spec(name: &str) -> Result<&'static FieldSpec> {
    FIELDS
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| EvoError::UnknownParameter(name.to_string()))
}

impl MetaParams {
    pub fn field_names() -> impl Iterator<Item = &'static str> {
        FIELDS.iter().map(|f| f.name)
    }

    /// Field value by name. Sizes come back as whole numbers and the flag as 0 or 1.
    pub fn get(&self, name: &str) -> Result<f64> {
        let value = match name {
            "optimization_mutation_rate" => self.optimization_mutation_rate,
            "variance_mutation_rate" => self.variance_mutation_rate,
            "experimentation_rate" => self.experimentation_rate,
            "elite_protection_ratio" => self.elite_protection_ratio,
            "culling_ratio" => self.culling_ratio,
            "fitness_threshold_for_breeding" => self.fitness_threshold_for_breeding,
            "target_population_size" => self.target_population_size as f64,
            "min_population_size" => self.min_population_size as f64,
            "max_population_size" => self.max_population_size as f64,
            "learning_rate" => self.learning_rate,
            "exploration_factor" => self.exploration_factor,
            "confidence_threshold" => self.confidence_threshold,
            "profitable_optimization_ratio" => self.profitable_optimization_ratio,
            "profitable_random_ratio" => self.profitable_random_ratio,
            "losing_optimization_ratio" => self.losing_optimization_ratio,
            "losing_random_ratio" => self.losing_random_ratio,
            "meta_mutation_rate" => self.meta_mutation_rate,
            "meta_learning_rate" => self.meta_learning_rate,
            "meta_convergence_threshold" => self.meta_convergence_threshold,
            "negative_learning_enabled" => {
                if self.negative_learning_enabled {
                    1.0
                } else {
                    0.0
                }
            }
            "negative_penalty_weight" => self.negative_penalty_weight,
            "negative_decay_rate" => self.negative_decay_rate,
            "negative_capacity" => self.negative_capacity as f64,
            "negative_similarity_threshold" => self.negative_similarity_threshold,
            "negative_forbidden_threshold" => self.negative_forbidden_threshold,
            other => return Err(EvoError::UnknownParameter(other.to_string())),
        };
        Ok(value)
    }

    /// Sets a field by name. Sizes are rounded, the flag is set for any
    /// non-zero value. No range check happens here; see `validate`.
    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        let spec = field_spec(name)?;
        if !value.is_finite() {
            return Err(EvoError::invalid(format!("{} = {} is not finite", name, value)));
        }
        if spec.kind == FieldKind::Size && value < 0.0 {
            return Err(EvoError::invalid(format!("{} = {} must be non-negative", name, value)));
        }
        self.assign(spec, value);
        Ok(())
    }

    /// Writes a finite value into the field `spec` names.
    fn assign(&mut self, spec: &FieldSpec, value: f64) {
        let size = value.max(0.0).round() as usize;
        match spec.name {
            "optimization_mutation_rate" => self.optimization_mutation_rate = value,
            "variance_mutation_rate" => self.variance_mutation_rate = value,
            "experimentation_rate" => self.experimentation_rate = value,
            "elite_protection_ratio" => self.elite_protection_ratio = value,
            "culling_ratio" => self.culling_ratio = value,
            "fitness_threshold_for_breeding" => self.fitness_threshold_for_breeding = value,
            "target_population_size" => self.target_population_size = size,
            "min_population_size" => self.min_population_size = size,
            "max_population_size" => self.max_population_size = size,
            "learning_rate" => self.learning_rate = value,
            "exploration_factor" => self.exploration_factor = value,
            "confidence_threshold" => self.confidence_threshold = value,
            "profitable_optimization_ratio" => self.profitable_optimization_ratio = value,
            "profitable_random_ratio" => self.profitable_random_ratio = value,
            "losing_optimization_ratio" => self.losing_optimization_ratio = value,
            "losing_random_ratio" => self.losing_random_ratio = value,
            "meta_mutation_rate" => self.meta_mutation_rate = value,
            "meta_learning_rate" => self.meta_learning_rate = value,
            "meta_convergence_threshold" => self.meta_convergence_threshold = value,
            "negative_learning_enabled" => self.negative_learning_enabled = value != 0.0,
            "negative_penalty_weight" => self.negative_penalty_weight = value,
            "negative_decay_rate" => self.negative_decay_rate = value,
            "negative_capacity" => self.negative_capacity = size,
            "negative_similarity_threshold" => self.negative_similarity_threshold = value,
            "negative_forbidden_threshold" => self.negative_forbidden_threshold = value,
            _ => {}
        }
    }

    pub fn validate(&self) -> Result<()> {
        for spec in FIELDS {
            let value = self.get(spec.name)?;
            if !value.is_finite() || value < 0.0 {
                return Err(EvoError::invalid(format!(
                    "{} = {} must be a non-negative number",
                    spec.name, value
                )));
            }
            if spec.kind == FieldKind::Ratio && value > 1.0 {
                return Err(EvoError::invalid(format!("{} = {} outside [0, 1]", spec.name, value)));
            }
        }
        if self.min_population_size == 0 {
            return Err(EvoError::invalid("min_population_size must be at least 1"));
        }
        if self.min_population_size > self.max_population_size {
            return Err(EvoError::invalid(format!(
                "min_population_size {} exceeds max_population_size {}",
                self.min_population_size, self.max_population_size
            )));
        }
        Ok(())
    }

    /// Gaussian step on every numeric field, scaled to the field's range
    /// and clamped back into it. The flag is never mutated.
    pub fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let scale = self.meta_mutation_rate.max(0.01);
        for spec in FIELDS.iter().filter(|f| f.kind != FieldKind::Flag) {
            let sigma = (spec.max - spec.min) * scale;
            let Ok(normal) = Normal::new(0.0, sigma) else {
                continue;
            };
            let Ok(current) = self.get(spec.name) else {
                continue;
            };
            let next = (current + normal.sample(rng)).clamp(spec.min, spec.max);
            self.assign(spec, next);
        }
        self.fix_population_bounds();
    }

    /// Each numeric field drawn uniformly from its range.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut params = Self::default();
        for spec in FIELDS.iter().filter(|f| f.kind != FieldKind::Flag) {
            params.assign(spec, rng.gen_range(spec.min..=spec.max));
        }
        params.fix_population_bounds();
        params
    }

    fn fix_population_bounds(&mut self) {
        self.min_population_size = self.min_population_size.max(1);
        if self.max_population_size < self.min_population_size {
            self.max_population_size = self.min_population_size;
        }
        self.target_population_size = self
            .target_population_size
            .clamp(self.min_population_size, self.max_population_size);
    }

    /// Values in `FIELDS` order.
    pub fn to_values(&self) -> Vec<f64> {
        FIELDS
            .iter()
            .map(|f| self.get(f.name).unwrap_or(0.0))
            .collect()
    }

    pub fn from_values(values: &[f64]) -> Result<Self> {
        if values.len() != FIELDS.len() {
            return Err(EvoError::SizeMismatch {
                expected: FIELDS.len(),
                actual: values.len(),
            });
        }
        let mut params = Self::default();
        for (spec, &value) in FIELDS.iter().zip(values) {
            params.set(spec.name, value)?;
        }
        Ok(params)
    }

    /// Overlays the negative-learning fields on `base`.
    pub fn negative_config(&self, base: &NegativeLearningConfig) -> NegativeLearningConfig {
        NegativeLearningConfig {
            enabled: self.negative_learning_enabled,
            capacity: self.negative_capacity.max(1),
            base_penalty: self.negative_penalty_weight,
            decay_rate: (1.0 - self.negative_decay_rate).clamp(0.0, 1.0),
            similarity_threshold: self.negative_similarity_threshold,
            forbidden_threshold: self.negative_forbidden_threshold,
            ..base.clone()
        }
    }

    /// Breeding ratios for the current outcome: `(optimization, random)`.
    pub fn breeding_ratios(&self, profitable: bool) -> (f64, f64) {
        if profitable {
            (self.profitable_optimization_ratio, self.profitable_random_ratio)
        } else {
            (self.losing_optimization_ratio, self.losing_random_ratio)
        }
    }
}
