use crate::engines::generation::genome::Genome;
use crate::error::{EvoError, Result};
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A genome and its fitness. `None` until evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub genome: Genome,
    pub fitness: Option<f64>,
}

impl Individual {
    pub fn new(genome: Genome) -> Self {
        Self { genome, fitness: None }
    }

    pub fn with_fitness(genome: Genome, fitness: f64) -> Self {
        Self {
            genome,
            fitness: Some(fitness),
        }
    }

    /// Fitness for ordering; unevaluated and NaN individuals rank last.
    fn rank_key(&self) -> f64 {
        match self.fitness {
            Some(f) if !f.is_nan() => f,
            _ => f64::NEG_INFINITY,
        }
    }
}

/// Aggregates computed by `Population::update_stats`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationStats {
    pub best_fitness: f64,
    pub avg_fitness: f64,
    pub worst_fitness: f64,
    pub best_index: usize,
    pub evaluated: usize,
}

/// Ordered, capacity-bounded set of individuals.
///
/// Any mutation invalidates the aggregates; `stats()` refuses to answer until
/// `update_stats()` has been called again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    individuals: Vec<Individual>,
    capacity: usize,
    generation: usize,
    #[serde(skip)]
    stats: Option<PopulationStats>,
}

impl Population {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(EvoError::invalid("population capacity must be positive"));
        }
        Ok(Self {
            individuals: Vec::with_capacity(capacity),
            capacity,
            generation: 0,
            stats: None,
        })
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.individuals.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn set_generation(&mut self, generation: usize) {
        self.generation = generation;
    }

    pub fn increment_generation(&mut self) {
        self.generation += 1;
    }

    /// Stores a clone of `genome`.
    pub fn add(&mut self, genome: &Genome, fitness: Option<f64>) -> Result<usize> {
        self.push(Individual {
            genome: genome.clone(),
            fitness,
        })
    }

    pub fn push(&mut self, individual: Individual) -> Result<usize> {
        if self.is_full() {
            return Err(EvoError::PopulationFull(self.capacity));
        }
        self.individuals.push(individual);
        self.stats = None;
        Ok(self.individuals.len() - 1)
    }

    /// Removes the individual at `index`, shifting later ones down.
    pub fn remove(&mut self, index: usize) -> Result<Individual> {
        if index >= self.individuals.len() {
            return Err(EvoError::OutOfBounds {
                offset: index,
                end: index + 1,
                len: self.individuals.len(),
            });
        }
        self.stats = None;
        Ok(self.individuals.remove(index))
    }

    pub fn clear(&mut self) {
        self.individuals.clear();
        self.stats = None;
    }

    pub fn get(&self, index: usize) -> Option<&Individual> {
        self.individuals.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Individual> {
        self.stats = None;
        self.individuals.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Individual> {
        self.individuals.iter()
    }

    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    pub fn set_fitness(&mut self, index: usize, fitness: f64) -> Result<()> {
        let len = self.individuals.len();
        let individual = self.individuals.get_mut(index).ok_or(EvoError::OutOfBounds {
            offset: index,
            end: index + 1,
            len,
        })?;
        individual.fitness = Some(fitness);
        self.stats = None;
        Ok(())
    }

    /// Stable sort, best fitness first, unevaluated last.
    pub fn sort(&mut self) {
        self.individuals
            .sort_by(|a, b| b.rank_key().partial_cmp(&a.rank_key()).unwrap_or(Ordering::Equal));
        self.stats = None;
    }

    /// Keeps the `n` best individuals (sorted, best first).
    pub fn truncate(&mut self, n: usize) {
        self.sort();
        self.individuals.truncate(n);
    }

    /// Changes the capacity, dropping the worst individuals if it shrinks.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(EvoError::invalid("population capacity must be positive"));
        }
        if capacity < self.individuals.len() {
            self.truncate(capacity);
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Recomputes best/avg/worst in one pass over evaluated individuals.
    pub fn update_stats(&mut self) -> Result<&PopulationStats> {
        let mut best = f64::NEG_INFINITY;
        let mut worst = f64::INFINITY;
        let mut best_index = 0;
        let mut sum = 0.0;
        let mut evaluated = 0;

        for (i, ind) in self.individuals.iter().enumerate() {
            let Some(f) = ind.fitness.filter(|f| !f.is_nan()) else {
                continue;
            };
            if f > best {
                best = f;
                best_index = i;
            }
            worst = worst.min(f);
            sum += f;
            evaluated += 1;
        }

        if evaluated == 0 {
            return Err(EvoError::PopulationEmpty);
        }

        Ok(self.stats.insert(PopulationStats {
            best_fitness: best,
            avg_fitness: sum / evaluated as f64,
            worst_fitness: worst,
            best_index,
            evaluated,
        }))
    }

    pub fn stats(&self) -> Result<&PopulationStats> {
        self.stats.as_ref().ok_or(EvoError::StaleStats)
    }

    pub fn best(&self) -> Result<&Individual> {
        let stats = self.stats()?;
        self.individuals.get(stats.best_index).ok_or(EvoError::StaleStats)
    }

    /// Picks `k` distinct individuals at random and returns the index of the
    /// fittest; ties go to the lowest index. `k` is clamped to the size.
    pub fn tournament_select<R: Rng + ?Sized>(&self, k: usize, rng: &mut R) -> Result<usize> {
        if self.individuals.is_empty() {
            return Err(EvoError::PopulationEmpty);
        }
        if k == 0 {
            return Err(EvoError::invalid("tournament size must be positive"));
        }
        let k = k.min(self.individuals.len());

        let mut contenders = index::sample(rng, self.individuals.len(), k).into_vec();
        contenders.sort_unstable();

        let mut best = contenders[0];
        for &i in &contenders[1..] {
            if self.individuals[i].rank_key() > self.individuals[best].rank_key() {
                best = i;
            }
        }
        Ok(best)
    }

    /// Scores every individual with `fitness` and returns how many were scored.
    pub fn evaluate<F>(&mut self, fitness: F) -> usize
    where
        F: Fn(&Genome) -> f64,
    {
        for ind in &mut self.individuals {
            ind.fitness = Some(fitness(&ind.genome));
        }
        self.stats = None;
        self.individuals.len()
    }

    /// Writes externally computed fitnesses back in order.
    pub fn apply_fitness(&mut self, fitness: &[f64]) -> Result<()> {
        if fitness.len() != self.individuals.len() {
            return Err(EvoError::SizeMismatch {
                expected: self.individuals.len(),
                actual: fitness.len(),
            });
        }
        for (ind, &f) in self.individuals.iter_mut().zip(fitness) {
            ind.fitness = Some(f);
        }
        self.stats = None;
        Ok(())
    }

    pub fn genomes(&self) -> Vec<&Genome> {
        self.individuals.iter().map(|ind| &ind.genome).collect()
    }
}
