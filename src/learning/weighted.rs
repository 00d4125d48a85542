//! Incremental weighted statistics.
//!
//! `WeightedStats` keeps a running weighted mean and second moment using the
//! West (weighted Welford) update, so nothing but the accumulators is stored.

use crate::types::MIN_WEIGHT;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Minimum number of samples before `has_data` reports true by default.
pub const DEFAULT_MIN_SAMPLES: usize = 3;

/// Sample count at which confidence saturates by default.
pub const DEFAULT_MAX_SAMPLES: usize = 100;

/// Below this standard deviation a Normal draw collapses to the mean.
const MIN_SAMPLE_STD: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedStats {
    mean: f64,
    m2: f64,
    sum_weights: f64,
    count: usize,
    min_value: f64,
    max_value: f64,
}

impl Default for WeightedStats {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightedStats {
    pub fn new() -> Self {
        Self {
            mean: 0.0,
            m2: 0.0,
            sum_weights: 0.0,
            count: 0,
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
        }
    }

    /// Adds one observation. Returns false, leaving the state untouched, when
    /// the weight is negative or either input is not finite.
    pub fn update(&mut self, value: f64, weight: f64) -> bool {
        if !(weight >= 0.0) || !weight.is_finite() || !value.is_finite() {
            return false;
        }
        let weight = weight.max(MIN_WEIGHT);

        self.count += 1;
        let new_sum = self.sum_weights + weight;
        let delta = value - self.mean;
        let r = delta * weight / new_sum;
        self.mean += r;
        self.m2 += self.sum_weights * delta * r;
        self.sum_weights = new_sum;

        self.min_value = self.min_value.min(value);
        self.max_value = self.max_value.max(value);
        true
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 || self.sum_weights <= 0.0 {
            return 0.0;
        }
        (self.m2 / self.sum_weights).max(0.0)
    }

    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sum_weights(&self) -> f64 {
        self.sum_weights
    }

    /// Smallest observed value, `None` before the first update.
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min_value)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max_value)
    }

    /// Draws from Normal(mean, std).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let std = self.std();
        if std < MIN_SAMPLE_STD {
            return self.mean;
        }
        match Normal::new(self.mean, std) {
            Ok(normal) => normal.sample(rng),
            Err(_) => self.mean,
        }
    }

    /// `min(count, max_samples) / max_samples`, zero when `max_samples` is 0.
    pub fn confidence(&self, max_samples: usize) -> f64 {
        if max_samples == 0 {
            return 0.0;
        }
        self.count.min(max_samples) as f64 / max_samples as f64
    }

    pub fn has_data(&self, min_samples: usize) -> bool {
        self.count >= min_samples.max(1)
    }

    /// Folds `other` into `self` with the parallel variance formula.
    pub fn merge(&mut self, other: &WeightedStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let total = self.sum_weights + other.sum_weights;
        let delta = other.mean - self.mean;
        self.mean += delta * other.sum_weights / total;
        self.m2 += other.m2 + delta * delta * self.sum_weights * other.sum_weights / total;
        self.sum_weights = total;
        self.count += other.count;
        self.min_value = self.min_value.min(other.min_value);
        self.max_value = self.max_value.max(other.max_value);
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Draws a value around `center`.
///
/// The offset is `exploration * spread * z` with `z ~ N(0, 1)`, where the
/// spread is the learned standard deviation floored at 10% of `|center|`
/// (and at 0.01), so exploration still moves away from a zero-variance mean.
/// At `exploration = 0` the result is exactly `center`.
pub fn explore_around<R: Rng + ?Sized>(center: f64, std: f64, exploration: f64, rng: &mut R) -> f64 {
    let exploration = exploration.clamp(0.0, 1.0);
    if exploration == 0.0 {
        return center;
    }
    let spread = std.max(0.1 * center.abs()).max(0.01);
    let z: f64 = rng.sample(rand_distr::StandardNormal);
    center + exploration * spread * z
}

/// Fixed-length vector of `WeightedStats`, one per tracked parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedArray {
    stats: Vec<WeightedStats>,
}

impl WeightedArray {
    pub fn new(len: usize) -> Self {
        Self {
            stats: vec![WeightedStats::new(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WeightedStats> {
        self.stats.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WeightedStats> {
        self.stats.iter()
    }

    /// Updates every parameter with the same weight. Fails without touching
    /// any accumulator if the lengths differ or an input is rejected.
    pub fn update(&mut self, values: &[f64], weight: f64) -> bool {
        if values.len() != self.stats.len()
            || !(weight >= 0.0)
            || values.iter().any(|v| !v.is_finite())
        {
            return false;
        }
        for (stat, &value) in self.stats.iter_mut().zip(values) {
            stat.update(value, weight);
        }
        true
    }

    /// Per-parameter weights scaled by a global multiplier.
    pub fn update_weighted(&mut self, values: &[f64], weights: &[f64], global_weight: f64) -> bool {
        if values.len() != self.stats.len() || weights.len() != self.stats.len() {
            return false;
        }
        let combined: Vec<f64> = weights.iter().map(|w| w * global_weight).collect();
        if combined.iter().any(|w| !(*w >= 0.0)) || values.iter().any(|v| !v.is_finite()) {
            return false;
        }
        for ((stat, &value), &weight) in self.stats.iter_mut().zip(values).zip(&combined) {
            stat.update(value, weight);
        }
        true
    }

    pub fn means(&self) -> Vec<f64> {
        self.stats.iter().map(WeightedStats::mean).collect()
    }

    pub fn stds(&self) -> Vec<f64> {
        self.stats.iter().map(WeightedStats::std).collect()
    }

    pub fn variances(&self) -> Vec<f64> {
        self.stats.iter().map(WeightedStats::variance).collect()
    }

    /// Number of observations; all parameters are updated together so the
    /// first entry is representative.
    pub fn count(&self) -> usize {
        self.stats.first().map(WeightedStats::count).unwrap_or(0)
    }

    pub fn has_data(&self, min_samples: usize) -> bool {
        !self.stats.is_empty() && self.stats.iter().all(|s| s.has_data(min_samples))
    }

    /// Mean confidence across parameters.
    pub fn confidence(&self, max_samples: usize) -> f64 {
        if self.stats.is_empty() {
            return 0.0;
        }
        self.stats.iter().map(|s| s.confidence(max_samples)).sum::<f64>() / self.stats.len() as f64
    }

    /// Normal draw per parameter. With fewer than `DEFAULT_MIN_SAMPLES`
    /// observations the draw is uniform in `[0, 1)`; otherwise it is blended
    /// as `(1 - e) * normal + e * uniform`.
    pub fn sample<R: Rng + ?Sized>(&self, exploration: f64, rng: &mut R) -> Vec<f64> {
        let exploration = exploration.clamp(0.0, 1.0);
        self.stats
            .iter()
            .map(|s| {
                if s.count() < DEFAULT_MIN_SAMPLES {
                    return rng.gen::<f64>();
                }
                let learned = s.sample(rng);
                if exploration > 0.0 {
                    (1.0 - exploration) * learned + exploration * rng.gen::<f64>()
                } else {
                    learned
                }
            })
            .collect()
    }

    pub fn merge(&mut self, other: &WeightedArray) -> bool {
        if other.len() != self.len() {
            return false;
        }
        for (a, b) in self.stats.iter_mut().zip(&other.stats) {
            a.merge(b);
        }
        true
    }

    pub fn reset(&mut self) {
        self.stats.iter_mut().for_each(WeightedStats::reset);
    }
}
