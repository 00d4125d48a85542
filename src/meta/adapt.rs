use super::params::MetaParams;
use serde::{Deserialize, Serialize};

struct Summary {
    mean: f64,
    stddev: f64,
    trend: f64,
}

fn summarize(values: &[f64]) -> Summary {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let stddev = (values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt();
    let trend = if values.len() >= 2 {
        let (mut sx, mut sy, mut sxy, mut sxx) = (0.0, 0.0, 0.0, 0.0);
        for (i, y) in values.iter().enumerate() {
            let x = i as f64;
            sx += x;
            sy += y;
            sxy += x * y;
            sxx += x * x;
        }
        let denom = n * sxx - sx * sx;
        if denom.abs() < 1e-12 {
            0.0
        } else {
            (n * sxy - sx * sy) / denom
        }
    } else {
        0.0
    };
    Summary { mean, stddev, trend }
}

/// Nudges `params` from recent best-fitness history. An improving run is
/// pushed towards exploitation, a stalled or declining one towards
/// exploration. Step sizes scale with `meta_learning_rate`.
pub fn adapt(params: &mut MetaParams, recent_fitness: &[f64], improvement: bool) {
    if recent_fitness.is_empty() {
        return;
    }
    let stats = summarize(recent_fitness);
    let lr = params.meta_learning_rate;

    if improvement && stats.trend > 0.0 {
        params.exploration_factor = (params.exploration_factor * (1.0 - lr * 0.1)).max(0.1);
        params.optimization_mutation_rate = (params.optimization_mutation_rate * (1.0 - lr * 0.2)).max(0.01);
        params.elite_protection_ratio = (params.elite_protection_ratio * (1.0 + lr * 0.1)).min(0.3);
    } else if !improvement || stats.trend < 0.0 {
        params.exploration_factor = (params.exploration_factor * (1.0 + lr * 0.2)).min(0.8);
        params.optimization_mutation_rate = (params.optimization_mutation_rate * (1.0 + lr * 0.3)).min(0.3);
        params.experimentation_rate = (params.experimentation_rate * (1.0 + lr * 0.2)).min(0.2);
        params.elite_protection_ratio = (params.elite_protection_ratio * (1.0 - lr * 0.1)).max(0.05);
        params.culling_ratio = (params.culling_ratio * (1.0 + lr * 0.1)).min(0.5);
    }

    let spread = stats.mean.abs();
    if stats.stddev < spread * 0.01 {
        params.variance_mutation_rate = (params.variance_mutation_rate * (1.0 + lr * 0.3)).min(0.5);
    } else if stats.stddev > spread * 0.3 {
        params.variance_mutation_rate = (params.variance_mutation_rate * (1.0 - lr * 0.2)).max(0.05);
    }
}

/// Mutation settings for a population diversity in [0, 1]: the less diverse,
/// the harder it mutates.
pub fn suggest_mutation_rate(diversity: f64, params: &mut MetaParams) {
    let (optimization, variance, experimentation) = if diversity > 0.5 {
        (0.02, 0.10, 0.02)
    } else if diversity > 0.3 {
        (0.05, 0.15, 0.05)
    } else if diversity > 0.1 {
        (0.10, 0.25, 0.10)
    } else {
        (0.20, 0.40, 0.20)
    };
    params.optimization_mutation_rate = optimization;
    params.variance_mutation_rate = variance;
    params.experimentation_rate = experimentation;
}

/// Selection settings for a fitness spread: a tight spread gets more pressure.
pub fn suggest_selection_pressure(fitness_stddev: f64, params: &mut MetaParams) {
    let (elite, cull, threshold) = if fitness_stddev < 0.05 {
        (0.15, 0.35, 0.1)
    } else if fitness_stddev < 0.15 {
        (0.10, 0.25, 0.0)
    } else {
        (0.05, 0.15, 0.0)
    };
    params.elite_protection_ratio = elite;
    params.culling_ratio = cull;
    params.fitness_threshold_for_breeding = threshold;
}

pub const OUTCOME_BUCKETS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct OutcomeBucket {
    value: f64,
    count: usize,
    avg_fitness: f64,
}

/// Remembers which mutation rates and exploration factors led to good
/// outcomes, bucketed and smoothed with an exponential moving average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeLearner {
    mutation: Vec<OutcomeBucket>,
    exploration: Vec<OutcomeBucket>,
}

impl Default for OutcomeLearner {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_buckets(value_at: impl Fn(usize) -> f64) -> Vec<OutcomeBucket> {
    (0..OUTCOME_BUCKETS)
        .map(|i| OutcomeBucket {
            value: value_at(i),
            count: 0,
            avg_fitness: 0.0,
        })
        .collect()
}

fn record_in(buckets: &mut [OutcomeBucket], value: f64, fitness: f64, learning_rate: f64) {
    let mut nearest = 0;
    let mut nearest_diff = f64::INFINITY;
    for (i, b) in buckets.iter().enumerate() {
        let diff = (b.value - value).abs();
        if diff < nearest_diff {
            nearest = i;
            nearest_diff = diff;
        }
    }
    let bucket = &mut buckets[nearest];
    bucket.count += 1;
    bucket.avg_fitness = if bucket.count == 1 {
        fitness
    } else {
        learning_rate * fitness + (1.0 - learning_rate) * bucket.avg_fitness
    };
}

fn best_in(buckets: &[OutcomeBucket], min_samples: usize) -> Option<f64> {
    let mut best: Option<&OutcomeBucket> = None;
    for b in buckets.iter().filter(|b| b.count >= min_samples.max(1)) {
        if best.map_or(true, |cur| b.avg_fitness > cur.avg_fitness) {
            best = Some(b);
        }
    }
    best.map(|b| b.value)
}

impl OutcomeLearner {
    /// Mutation buckets sit at 0.01, 0.03, ... 0.39; exploration at 0.0, 0.05, ... 0.95.
    pub fn new() -> Self {
        Self {
            mutation: empty_buckets(|i| 0.01 + i as f64 * 0.02),
            exploration: empty_buckets(|i| i as f64 / OUTCOME_BUCKETS as f64),
        }
    }

    pub fn record(&mut self, mutation_rate: f64, exploration: f64, fitness: f64, learning_rate: f64) {
        if !fitness.is_finite() {
            return;
        }
        let lr = learning_rate.clamp(0.0, 1.0);
        record_in(&mut self.mutation, mutation_rate, fitness, lr);
        record_in(&mut self.exploration, exploration, fitness, lr);
    }

    /// Best `(mutation_rate, exploration)` among buckets with at least
    /// `min_samples` outcomes.
    pub fn learned_params(&self, min_samples: usize) -> Option<(f64, f64)> {
        Some((best_in(&self.mutation, min_samples)?, best_in(&self.exploration, min_samples)?))
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
