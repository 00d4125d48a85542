//! Time-bucketed learning.
//!
//! Observations for a context land in calendar-aligned buckets (one per
//! minute, hour, day, ...). Keeping buckets separate lets us weight recent
//! behaviour more heavily, fit a trend across buckets and notice when the
//! recent buckets drift away from the long-run picture.

use crate::config::learning::TemporalConfig;
use crate::config::traits::ConfigSection;
use crate::error::{EvoError, Result};
use crate::learning::weighted::{explore_around, WeightedArray};
use crate::types::{fitness_weight, Timestamp};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketType {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl BucketType {
    /// Nominal length in seconds; months count as 30 days and years as 365.
    pub fn nominal_seconds(self) -> i64 {
        match self {
            BucketType::Minute => 60,
            BucketType::Hour => 3_600,
            BucketType::Day => 86_400,
            BucketType::Week => 7 * 86_400,
            BucketType::Month => 30 * 86_400,
            BucketType::Year => 365 * 86_400,
        }
    }

    /// The `[start, end)` interval containing `ts`, aligned to UTC calendar
    /// boundaries. Weeks start on Monday.
    pub fn bounds(self, ts: Timestamp) -> Result<(Timestamp, Timestamp)> {
        let out_of_range = || EvoError::invalid(format!("timestamp {} out of range", ts));
        match self {
            BucketType::Minute | BucketType::Hour | BucketType::Day => {
                let width = self.nominal_seconds();
                let start = ts.timestamp() - ts.timestamp().rem_euclid(width);
                let start = DateTime::<Utc>::from_timestamp(start, 0).ok_or_else(out_of_range)?;
                let end = DateTime::<Utc>::from_timestamp(start.timestamp() + width, 0).ok_or_else(out_of_range)?;
                Ok((start, end))
            }
            BucketType::Week => {
                let date = ts.date_naive();
                let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
                let start = midnight(monday).ok_or_else(out_of_range)?;
                Ok((start, start + Duration::days(7)))
            }
            BucketType::Month => {
                let first = NaiveDate::from_ymd_opt(ts.year(), ts.month(), 1).ok_or_else(out_of_range)?;
                let (year, month) = if ts.month() == 12 {
                    (ts.year() + 1, 1)
                } else {
                    (ts.year(), ts.month() + 1)
                };
                let next = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(out_of_range)?;
                Ok((
                    midnight(first).ok_or_else(out_of_range)?,
                    midnight(next).ok_or_else(out_of_range)?,
                ))
            }
            BucketType::Year => {
                let first = NaiveDate::from_ymd_opt(ts.year(), 1, 1).ok_or_else(out_of_range)?;
                let next = NaiveDate::from_ymd_opt(ts.year() + 1, 1, 1).ok_or_else(out_of_range)?;
                Ok((
                    midnight(first).ok_or_else(out_of_range)?,
                    midnight(next).ok_or_else(out_of_range)?,
                ))
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BucketType::Minute => "minute",
            BucketType::Hour => "hour",
            BucketType::Day => "day",
            BucketType::Week => "week",
            BucketType::Month => "month",
            BucketType::Year => "year",
        }
    }
}

impl fmt::Display for BucketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketType {
    type Err = EvoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "minute" => Ok(BucketType::Minute),
            "hour" => Ok(BucketType::Hour),
            "day" => Ok(BucketType::Day),
            "week" => Ok(BucketType::Week),
            "month" => Ok(BucketType::Month),
            "year" => Ok(BucketType::Year),
            other => Err(EvoError::invalid(format!("unknown bucket type '{}'", other))),
        }
    }
}

fn midnight(date: NaiveDate) -> Option<Timestamp> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

/// Direction of a slope with a dead zone around zero: -1, 0 or 1.
pub fn trend_direction(slope: f64, dead_zone: f64) -> i8 {
    if slope > dead_zone {
        1
    } else if slope < -dead_zone {
        -1
    } else {
        0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalBucket {
    pub start: Timestamp,
    pub end: Timestamp,
    pub params: WeightedArray,
    pub sample_count: usize,
    pub best_fitness: f64,
    pub worst_fitness: f64,
    pub avg_fitness: f64,
    pub complete: bool,
}

impl TemporalBucket {
    fn new(start: Timestamp, end: Timestamp, param_count: usize) -> Self {
        Self {
            start,
            end,
            params: WeightedArray::new(param_count),
            sample_count: 0,
            best_fitness: f64::NEG_INFINITY,
            worst_fitness: f64::INFINITY,
            avg_fitness: 0.0,
            complete: false,
        }
    }

    pub fn means(&self) -> Vec<f64> {
        self.params.means()
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Recency-weighted mean and how much to trust it.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganicMean {
    pub params: Vec<f64>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TemporalList {
    buckets: Vec<TemporalBucket>, // sorted by start
    latest: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalSystem {
    config: TemporalConfig,
    param_count: usize,
    index: HashMap<String, usize>,
    keys: Vec<String>,
    lists: Vec<TemporalList>,
}

impl TemporalSystem {
    pub fn new(param_count: usize, config: TemporalConfig) -> Result<Self> {
        if param_count == 0 {
            return Err(EvoError::invalid("param_count must be positive"));
        }
        config.validate()?;
        Ok(Self {
            config,
            param_count,
            index: HashMap::new(),
            keys: Vec::new(),
            lists: Vec::new(),
        })
    }

    pub fn bucket_type(&self) -> BucketType {
        self.config.bucket_type
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn config(&self) -> &TemporalConfig {
        &self.config
    }

    /// Adds one observation to the bucket covering `timestamp`.
    ///
    /// Returns `false` when the observation is older than every retained
    /// bucket and the history is already full; nothing is stored then.
    pub fn learn(&mut self, key: &str, params: &[f64], fitness: f64, timestamp: Timestamp) -> Result<bool> {
        if key.is_empty() {
            return Err(EvoError::invalid("context key is empty"));
        }
        if params.len() != self.param_count {
            return Err(EvoError::SizeMismatch {
                expected: self.param_count,
                actual: params.len(),
            });
        }
        if !fitness.is_finite() || params.iter().any(|p| !p.is_finite()) {
            return Err(EvoError::invalid("fitness and parameters must be finite"));
        }

        let (start, end) = self.config.bucket_type.bounds(timestamp)?;
        let retention = self.config.retention_count;
        let param_count = self.param_count;
        let list = self.entry(key);

        let position = match list.buckets.binary_search_by(|b| b.start.cmp(&start)) {
            Ok(i) => i,
            Err(i) => {
                if i == 0 && list.buckets.len() >= retention {
                    debug!("observation at {} predates the retention window for '{}'", timestamp, key);
                    return Ok(false);
                }
                list.buckets.insert(i, TemporalBucket::new(start, end, param_count));
                if list.buckets.len() > retention {
                    let excess = list.buckets.len() - retention;
                    list.buckets.drain(..excess);
                    i - excess
                } else {
                    i
                }
            }
        };

        let bucket = &mut list.buckets[position];
        bucket.params.update(params, fitness_weight(fitness));
        bucket.sample_count += 1;
        bucket.avg_fitness += (fitness - bucket.avg_fitness) / bucket.sample_count as f64;
        bucket.best_fitness = bucket.best_fitness.max(fitness);
        bucket.worst_fitness = bucket.worst_fitness.min(fitness);

        let latest = list.latest.map_or(timestamp, |l| l.max(timestamp));
        list.latest = Some(latest);
        for bucket in list.buckets.iter_mut() {
            bucket.complete = bucket.end <= latest;
        }
        Ok(true)
    }

    /// Recency-weighted mean across all buckets of `key`.
    ///
    /// A bucket `a` bucket-lengths older than the newest one gets weight
    /// `2^(-a / organic_half_life)`, multiplied by its sample confidence.
    /// The returned confidence is the recency-weighted mean of bucket
    /// confidences.
    pub fn get_organic_mean(&self, key: &str) -> Option<OrganicMean> {
        let buckets = self.non_empty_buckets(key)?;
        let newest = buckets.last()?.start;
        let lambda = std::f64::consts::LN_2 / self.config.organic_half_life;
        let width = self.config.bucket_type.nominal_seconds() as f64;

        let mut sums = vec![0.0; self.param_count];
        let mut weight_total = 0.0;
        let mut recency_total = 0.0;
        for bucket in &buckets {
            let age = (newest - bucket.start).num_seconds().max(0) as f64 / width;
            let recency = (-lambda * age).exp();
            let weight = recency * bucket.params.confidence(self.config.max_samples);
            for (sum, mean) in sums.iter_mut().zip(bucket.means()) {
                *sum += weight * mean;
            }
            weight_total += weight;
            recency_total += recency;
        }
        if weight_total <= 0.0 {
            return None;
        }
        Some(OrganicMean {
            params: sums.into_iter().map(|s| s / weight_total).collect(),
            confidence: (weight_total / recency_total).clamp(0.0, 1.0),
        })
    }

    /// Mean across buckets weighted by each bucket's sample count.
    pub fn get_weighted_mean(&self, key: &str) -> Option<Vec<f64>> {
        let buckets = self.non_empty_buckets(key)?;
        let total: usize = buckets.iter().map(|b| b.sample_count).sum();
        let mut sums = vec![0.0; self.param_count];
        for bucket in &buckets {
            for (sum, mean) in sums.iter_mut().zip(bucket.means()) {
                *sum += mean * bucket.sample_count as f64;
            }
        }
        Some(sums.into_iter().map(|s| s / total as f64).collect())
    }

    /// Per-parameter least-squares slope of bucket mean against bucket index.
    pub fn get_trend(&self, key: &str) -> Option<Vec<f64>> {
        let buckets = self.non_empty_buckets(key)?;
        let n = buckets.len();
        if n < self.config.min_trend_buckets {
            return None;
        }

        let x_mean = (n - 1) as f64 / 2.0;
        let ss_x: f64 = (0..n).map(|i| (i as f64 - x_mean).powi(2)).sum();
        let means: Vec<Vec<f64>> = buckets.iter().map(|b| b.means()).collect();

        let slopes = (0..self.param_count)
            .map(|p| {
                let y_mean = means.iter().map(|m| m[p]).sum::<f64>() / n as f64;
                let ss_xy: f64 = means
                    .iter()
                    .enumerate()
                    .map(|(i, m)| (i as f64 - x_mean) * (m[p] - y_mean))
                    .sum();
                ss_xy / ss_x
            })
            .collect();
        Some(slopes)
    }

    pub fn trend_direction(&self, slope: f64) -> i8 {
        trend_direction(slope, self.config.trend_dead_zone)
    }

    /// Absolute per-parameter gap between the mean of the newest `n` buckets
    /// and the mean of all buckets. `None` until there are more than `n`.
    pub fn compare_recent(&self, key: &str, n: usize) -> Option<Vec<f64>> {
        let buckets = self.non_empty_buckets(key)?;
        if n == 0 || buckets.len() <= n {
            return None;
        }
        let means: Vec<Vec<f64>> = buckets.iter().map(|b| b.means()).collect();
        let average = |rows: &[Vec<f64>], p: usize| rows.iter().map(|m| m[p]).sum::<f64>() / rows.len() as f64;
        let recent = &means[means.len() - n..];

        Some(
            (0..self.param_count)
                .map(|p| (average(recent, p) - average(&means, p)).abs())
                .collect(),
        )
    }

    pub fn detect_regime_change(&self, key: &str, n: usize, threshold: f64) -> bool {
        let changed = self
            .compare_recent(key, n)
            .map(|drift| drift.iter().any(|&d| d > threshold))
            .unwrap_or(false);
        if changed {
            info!("regime change detected for '{}'", key);
        }
        changed
    }

    /// Samples around the organic mean; uniform in `[0, 1)` without data.
    pub fn sample_organic<R: Rng + ?Sized>(&self, key: &str, exploration: f64, rng: &mut R) -> Vec<f64> {
        match self.get_organic_mean(key) {
            Some(organic) => self.sample_around(key, &organic.params, exploration, rng),
            None => (0..self.param_count).map(|_| rng.gen::<f64>()).collect(),
        }
    }

    /// Samples around the organic mean pushed `trend_strength` buckets along
    /// the fitted trend. Falls back to `sample_organic` without a trend.
    pub fn sample_trend<R: Rng + ?Sized>(
        &self,
        key: &str,
        trend_strength: f64,
        exploration: f64,
        rng: &mut R,
    ) -> Vec<f64> {
        let (Some(organic), Some(trend)) = (self.get_organic_mean(key), self.get_trend(key)) else {
            return self.sample_organic(key, exploration, rng);
        };
        let center: Vec<f64> = organic
            .params
            .iter()
            .zip(&trend)
            .map(|(m, slope)| m + slope * trend_strength)
            .collect();
        self.sample_around(key, &center, exploration, rng)
    }

    /// Drops buckets that ended more than `max_age` before `now`.
    pub fn prune_old(&mut self, now: Timestamp, max_age: Duration) -> usize {
        let cutoff = now - max_age;
        let mut removed = 0;
        for list in &mut self.lists {
            let before = list.buckets.len();
            list.buckets.retain(|b| b.end >= cutoff);
            removed += before - list.buckets.len();
        }
        removed
    }

    pub fn reset_context(&mut self, key: &str) -> Result<()> {
        let slot = *self
            .index
            .get(key)
            .ok_or_else(|| EvoError::UnknownContext(key.to_string()))?;
        self.lists[slot] = TemporalList::default();
        Ok(())
    }

    pub fn reset_all(&mut self) {
        self.lists.iter_mut().for_each(|l| *l = TemporalList::default());
    }

    pub fn buckets(&self, key: &str) -> Option<&[TemporalBucket]> {
        self.index.get(key).map(|&slot| self.lists[slot].buckets.as_slice())
    }

    pub fn bucket_count(&self, key: &str) -> usize {
        self.buckets(key).map(<[TemporalBucket]>::len).unwrap_or(0)
    }

    pub fn bucket_at(&self, key: &str, ts: Timestamp) -> Option<&TemporalBucket> {
        self.buckets(key)?.iter().find(|b| b.contains(ts))
    }

    pub fn context_count(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    fn non_empty_buckets(&self, key: &str) -> Option<Vec<&TemporalBucket>> {
        let buckets: Vec<&TemporalBucket> = self.buckets(key)?.iter().filter(|b| b.sample_count > 0).collect();
        (!buckets.is_empty()).then_some(buckets)
    }

    fn sample_around<R: Rng + ?Sized>(&self, key: &str, center: &[f64], exploration: f64, rng: &mut R) -> Vec<f64> {
        let mut pooled = WeightedArray::new(self.param_count);
        if let Some(buckets) = self.buckets(key) {
            for bucket in buckets {
                pooled.merge(&bucket.params);
            }
        }
        center
            .iter()
            .zip(pooled.stds())
            .map(|(&c, std)| explore_around(c, std, exploration, rng))
            .collect()
    }

    fn entry(&mut self, key: &str) -> &mut TemporalList {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                self.lists.push(TemporalList::default());
                self.keys.push(key.to_string());
                let slot = self.lists.len() - 1;
                self.index.insert(key.to_string(), slot);
                slot
            }
        };
        &mut self.lists[slot]
    }
}
