use super::params::MetaParams;
use crate::error::{EvoError, Result};
use log::{debug, trace};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// A hyperparameter set and how well it has done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaIndividual {
    pub params: MetaParams,
    pub meta_fitness: f64,
    pub generation: usize,
    history: VecDeque<f64>,
    history_capacity: usize,
}

impl MetaIndividual {
    pub fn new(params: MetaParams, history_capacity: usize) -> Self {
        Self {
            params,
            meta_fitness: 0.0,
            generation: 0,
            history: VecDeque::with_capacity(history_capacity),
            history_capacity,
        }
    }

    /// Sets the current meta-fitness and appends it to the history ring.
    pub fn record_fitness(&mut self, fitness: f64) {
        self.meta_fitness = fitness;
        if self.history_capacity == 0 {
            return;
        }
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(fitness);
    }

    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn average_fitness(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }

    /// Least-squares slope of the fitness history against its index.
    pub fn improvement_trend(&self) -> f64 {
        let n = self.history.len();
        if n < 2 {
            return 0.0;
        }
        let nf = n as f64;
        let (mut sx, mut sy, mut sxy, mut sxx) = (0.0, 0.0, 0.0, 0.0);
        for (i, y) in self.history.iter().enumerate() {
            let x = i as f64;
            sx += x;
            sy += y;
            sxy += x * y;
            sxx += x * x;
        }
        let denom = nf * sxx - sx * sx;
        if denom.abs() < 1e-12 {
            return 0.0;
        }
        (nf * sxy - sx * sy) / denom
    }
}

fn by_fitness_desc(a: &MetaIndividual, b: &MetaIndividual) -> Ordering {
    b.meta_fitness.partial_cmp(&a.meta_fitness).unwrap_or(Ordering::Equal)
}

/// Population of hyperparameter sets evolved by meta-fitness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaPopulation {
    individuals: Vec<MetaIndividual>,
    generation: usize,
    best_params: MetaParams,
    best_meta_fitness: Option<f64>,
    /// Best-ever meta-fitness after each `evolve`.
    best_history: Vec<f64>,
}

impl MetaPopulation {
    /// Individual 0 carries the defaults; the rest are mutated copies.
    pub fn new<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Result<Self> {
        Self::from_seed_params(size, MetaParams::default(), rng)
    }

    pub fn from_seed_params<R: Rng + ?Sized>(size: usize, seed: MetaParams, rng: &mut R) -> Result<Self> {
        if size == 0 {
            return Err(EvoError::invalid("meta-population needs at least one individual"));
        }
        seed.validate()?;
        let individuals = (0..size)
            .map(|i| {
                let mut params = seed.clone();
                if i > 0 {
                    params.mutate(rng);
                }
                MetaIndividual::new(params, DEFAULT_HISTORY_CAPACITY)
            })
            .collect();
        debug!("meta-population initialised with {} individuals", size);
        Ok(Self {
            individuals,
            generation: 0,
            best_params: seed,
            best_meta_fitness: None,
            best_history: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn individuals(&self) -> &[MetaIndividual] {
        &self.individuals
    }

    pub fn get(&self, index: usize) -> Option<&MetaIndividual> {
        self.individuals.get(index)
    }

    pub fn record_fitness(&mut self, index: usize, fitness: f64) -> Result<()> {
        let len = self.individuals.len();
        let individual = self.individuals.get_mut(index).ok_or(EvoError::OutOfBounds {
            offset: index,
            end: index + 1,
            len,
        })?;
        individual.record_fitness(fitness);
        Ok(())
    }

    /// Individual with the highest current meta-fitness (first on ties).
    pub fn best(&self) -> Option<&MetaIndividual> {
        let mut best: Option<&MetaIndividual> = None;
        for ind in &self.individuals {
            if best.map_or(true, |b| ind.meta_fitness > b.meta_fitness) {
                best = Some(ind);
            }
        }
        best
    }

    /// Best params ever seen, or the seed params before the first `evolve`.
    pub fn best_params(&self) -> &MetaParams {
        &self.best_params
    }

    pub fn best_meta_fitness(&self) -> Option<f64> {
        self.best_meta_fitness
    }

    /// Stable sort by meta-fitness, best first.
    pub fn sort(&mut self) {
        self.individuals.sort_by(by_fitness_desc);
    }

    /// One meta-generation. `profitable` overrides the judgment otherwise
    /// made by comparing the best meta-fitness to its breeding threshold.
    ///
    /// The leader's params set the breeding policy, so they must validate.
    pub fn evolve<R: Rng + ?Sized>(&mut self, rng: &mut R, profitable: Option<bool>) -> Result<()> {
        self.sort();
        let n = self.individuals.len();
        let leader = self.individuals.first().cloned().ok_or(EvoError::PopulationEmpty)?;
        leader.params.validate()?;

        if self.best_meta_fitness.map_or(true, |b| leader.meta_fitness > b) {
            self.best_meta_fitness = Some(leader.meta_fitness);
            self.best_params = leader.params.clone();
        }
        self.best_history.push(self.best_meta_fitness.unwrap_or(leader.meta_fitness));

        let policy = &leader.params;
        let elite = ((n as f64 * policy.elite_protection_ratio).floor() as usize).clamp(1, n);
        let cull = ((n as f64 * policy.culling_ratio).floor() as usize).min(n - elite);
        let profitable =
            profitable.unwrap_or(leader.meta_fitness > policy.fitness_threshold_for_breeding);
        let (opt_ratio, random_ratio) = policy.breeding_ratios(profitable);

        let next_generation = self.generation + 1;
        for i in (n - cull)..n {
            let parent = rng.gen_range(0..elite);
            let mut params = self.individuals[parent].params.clone();
            params.mutate(rng);
            let mut child = MetaIndividual::new(params, DEFAULT_HISTORY_CAPACITY);
            child.generation = next_generation;
            self.individuals[i] = child;
        }

        for individual in &mut self.individuals[elite..(n - cull)] {
            let u: f64 = rng.gen();
            if u < random_ratio {
                individual.params = MetaParams::random(rng);
            } else if u < random_ratio + opt_ratio {
                individual.params.mutate(rng);
            } else {
                continue;
            }
            individual.generation = next_generation;
            individual.meta_fitness = 0.0;
        }

        self.generation = next_generation;
        trace!(
            "meta-population generation {}: elite {}, culled {}, profitable {}",
            self.generation,
            elite,
            cull,
            profitable
        );
        Ok(())
    }

    /// True once the best-ever meta-fitness has gained less than `threshold`
    /// over each of the last `generations` meta-generations.
    pub fn converged(&self, threshold: f64, generations: usize) -> bool {
        if generations == 0 || self.best_history.len() <= generations {
            return false;
        }
        let tail = &self.best_history[self.best_history.len() - generations - 1..];
        tail.windows(2).all(|w| w[1] - w[0] < threshold)
    }
}

/// Scores a run: best fitness 50%, average 20%, diversity 20% (with a bonus
/// inside 0.3..0.5) and a speed term for fewer generations.
pub fn meta_evaluate(best_fitness: f64, avg_fitness: f64, diversity: f64, generations: usize) -> f64 {
    let mut score = best_fitness * 0.5 + avg_fitness * 0.2;
    let diversity_bonus = if diversity > 0.3 && diversity < 0.5 {
        diversity * 1.2
    } else {
        diversity
    };
    score += diversity_bonus * 100.0 * 0.2;
    if generations > 0 {
        score += (1000.0 / generations as f64) * 0.1;
    }
    score
}
