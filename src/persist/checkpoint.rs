use super::codec::RecordKind;
use super::{decode, encode, read_file, write_file, Format, PopulationSnapshot};
use crate::engines::generation::domain::Domain;
use crate::engines::generation::population::Population;
use crate::error::{EvoError, Result};
use crate::meta::{MetaParams, MetaPopulation};
use crate::types::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Version string written into every checkpoint.
pub const CHECKPOINT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything needed to resume a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: String,
    pub timestamp: Timestamp,
    pub domain: String,
    pub generation: usize,
    pub best_fitness: Option<f64>,
    pub avg_fitness: Option<f64>,
    pub population: PopulationSnapshot,
    pub meta_params: Option<MetaParams>,
    pub meta_population: Option<MetaPopulation>,
    /// Opaque caller data, stored as-is.
    #[serde(default)]
    pub user_data: Vec<u8>,
}

impl Checkpoint {
    /// Snapshots `population`. Best and average fitness come from its stats
    /// when they are current; use `with_fitness` otherwise.
    pub fn new(population: &Population, domain: &dyn Domain) -> Self {
        let stats = population.stats().ok();
        Self {
            version: CHECKPOINT_VERSION.to_string(),
            timestamp: Utc::now(),
            domain: domain.name().to_string(),
            generation: population.generation(),
            best_fitness: stats.map(|s| s.best_fitness),
            avg_fitness: stats.map(|s| s.avg_fitness),
            population: PopulationSnapshot::capture(population, domain),
            meta_params: None,
            meta_population: None,
            user_data: Vec::new(),
        }
    }

    pub fn with_fitness(mut self, best: f64, avg: f64) -> Self {
        self.best_fitness = Some(best);
        self.avg_fitness = Some(avg);
        self
    }

    pub fn with_meta_params(mut self, params: &MetaParams) -> Self {
        self.meta_params = Some(params.clone());
        self
    }

    pub fn with_meta_population(mut self, meta: &MetaPopulation) -> Self {
        self.meta_population = Some(meta.clone());
        self
    }

    pub fn with_user_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.user_data = data.into();
        self
    }

    /// Rebuilds the population for `domain`.
    pub fn restore(&self, domain: &dyn Domain) -> Result<Population> {
        if self.domain != domain.name() {
            return Err(EvoError::invalid(format!(
                "checkpoint belongs to domain '{}', not '{}'",
                self.domain,
                domain.name()
            )));
        }
        self.population.restore(domain)
    }

    pub fn encode(&self, format: Format) -> Result<Vec<u8>> {
        encode(self, RecordKind::Checkpoint, format)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes, RecordKind::Checkpoint)
    }

    pub fn save(&self, path: &Path, format: Format) -> Result<()> {
        write_file(path, &self.encode(format)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::decode(&read_file(path)?)
    }
}
