//! Per-context parameter learning.
//!
//! A context is one point in a declared categorical space, e.g. `asset=BTC,
//! timeframe=1h`. Each context accumulates the parameter vectors that worked
//! there, weighted by fitness, and keeps its own failure memory.

use crate::config::learning::ContextConfig;
use crate::config::traits::ConfigSection;
use crate::engines::generation::genome::Genome;
use crate::error::{EvoError, Result};
use crate::learning::negative::{FailureOutcome, NegativeLearning};
use crate::learning::weighted::{explore_around, WeightedArray};
use crate::types::{fitness_weight, Timestamp};
use chrono::Utc;
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Write;

/// Separator between dimension values in a context key.
pub const KEY_SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    name: String,
    values: Vec<String>,
}

impl Dimension {
    pub fn new<S: AsRef<str>>(name: &str, values: &[S]) -> Result<Self> {
        if name.is_empty() {
            return Err(EvoError::invalid("dimension name is empty"));
        }
        if values.is_empty() {
            return Err(EvoError::invalid(format!("dimension '{}' has no values", name)));
        }
        let mut owned: Vec<String> = Vec::with_capacity(values.len());
        for value in values.iter().map(AsRef::as_ref) {
            if value.is_empty() || value.contains(KEY_SEPARATOR) {
                return Err(EvoError::invalid(format!(
                    "dimension '{}' value {:?} is empty or contains '{}'",
                    name, value, KEY_SEPARATOR
                )));
            }
            if owned.iter().any(|v| v == value) {
                return Err(EvoError::invalid(format!(
                    "dimension '{}' repeats value '{}'",
                    name, value
                )));
            }
            owned.push(value.to_string());
        }
        Ok(Self {
            name: name.to_string(),
            values: owned,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// Everything learned about one context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStats {
    pub key: String,
    pub params: WeightedArray,
    pub confidence: f64,
    pub first_update: Option<Timestamp>,
    pub last_update: Option<Timestamp>,
    pub total_experiences: usize,
    pub best_fitness: f64,
    pub avg_fitness: f64,
    pub negative: NegativeLearning,
}

impl ContextStats {
    fn new(key: String, param_count: usize, config: &ContextConfig) -> Result<Self> {
        Ok(Self {
            key,
            params: WeightedArray::new(param_count),
            confidence: 0.0,
            first_update: None,
            last_update: None,
            total_experiences: 0,
            best_fitness: f64::NEG_INFINITY,
            avg_fitness: 0.0,
            negative: NegativeLearning::new(config.negative.clone())?,
        })
    }

    pub fn means(&self) -> Vec<f64> {
        self.params.means()
    }

    fn clear(&mut self) {
        self.params.reset();
        self.confidence = 0.0;
        self.first_update = None;
        self.last_update = None;
        self.total_experiences = 0;
        self.best_fitness = f64::NEG_INFINITY;
        self.avg_fitness = 0.0;
        self.negative.clear();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSystem {
    dimensions: Vec<Dimension>,
    param_count: usize,
    config: ContextConfig,
    index: HashMap<String, usize>,
    contexts: Vec<ContextStats>,
}

impl ContextSystem {
    pub fn new(param_count: usize, dimensions: Vec<Dimension>, config: ContextConfig) -> Result<Self> {
        if param_count == 0 {
            return Err(EvoError::invalid("param_count must be positive"));
        }
        if dimensions.is_empty() {
            return Err(EvoError::invalid("at least one dimension is required"));
        }
        for (i, d) in dimensions.iter().enumerate() {
            if dimensions[..i].iter().any(|other| other.name == d.name) {
                return Err(EvoError::invalid(format!("duplicate dimension '{}'", d.name)));
            }
        }
        config.validate()?;
        Ok(Self {
            dimensions,
            param_count,
            config,
            index: HashMap::new(),
            contexts: Vec::new(),
        })
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Joins one value per dimension, in declaration order, with `:`.
    pub fn build_key<S: AsRef<str>>(&self, values: &[S]) -> Result<String> {
        if values.len() != self.dimensions.len() {
            return Err(EvoError::SizeMismatch {
                expected: self.dimensions.len(),
                actual: values.len(),
            });
        }
        let mut key = String::new();
        for (i, (dimension, value)) in self.dimensions.iter().zip(values).enumerate() {
            let value = value.as_ref();
            if !dimension.contains(value) {
                return Err(EvoError::invalid(format!(
                    "'{}' is not a valid value for dimension '{}'",
                    value, dimension.name
                )));
            }
            if i > 0 {
                key.push(KEY_SEPARATOR);
            }
            key.push_str(value);
        }
        Ok(key)
    }

    pub fn validate_key(&self, key: &str) -> Result<()> {
        let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        self.build_key(&parts).map(|_| ())
    }

    pub fn learn<S: AsRef<str>>(&mut self, values: &[S], params: &[f64], fitness: f64) -> Result<()> {
        let key = self.build_key(values)?;
        self.learn_validated(key, params, fitness)
    }

    pub fn learn_key(&mut self, key: &str, params: &[f64], fitness: f64) -> Result<()> {
        self.validate_key(key)?;
        self.learn_validated(key.to_string(), params, fitness)
    }

    fn learn_validated(&mut self, key: String, params: &[f64], fitness: f64) -> Result<()> {
        if params.len() != self.param_count {
            return Err(EvoError::SizeMismatch {
                expected: self.param_count,
                actual: params.len(),
            });
        }
        if !fitness.is_finite() {
            return Err(EvoError::invalid(format!("fitness {} is not finite", fitness)));
        }
        if params.iter().any(|p| !p.is_finite()) {
            return Err(EvoError::invalid("parameters must be finite"));
        }

        let max_samples = self.config.max_samples;
        let stats = self.entry(key)?;
        stats.params.update(params, fitness_weight(fitness));

        let now = Utc::now();
        stats.first_update.get_or_insert(now);
        stats.last_update = Some(now);
        stats.total_experiences += 1;
        stats.avg_fitness += (fitness - stats.avg_fitness) / stats.total_experiences as f64;
        stats.best_fitness = stats.best_fitness.max(fitness);
        stats.confidence = stats.params.confidence(max_samples);
        Ok(())
    }

    /// Draws a parameter vector for a context.
    ///
    /// Unknown or empty contexts yield uniform values in `[0, 1)`. Otherwise
    /// each parameter is its learned mean plus an offset scaled by
    /// `exploration` and the learned spread.
    pub fn sample<S: AsRef<str>, R: Rng + ?Sized>(
        &self,
        values: &[S],
        exploration: f64,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        let key = self.build_key(values)?;
        Ok(self.sample_validated(&key, exploration, rng))
    }

    pub fn sample_key<R: Rng + ?Sized>(&self, key: &str, exploration: f64, rng: &mut R) -> Result<Vec<f64>> {
        self.validate_key(key)?;
        Ok(self.sample_validated(key, exploration, rng))
    }

    fn sample_validated<R: Rng + ?Sized>(&self, key: &str, exploration: f64, rng: &mut R) -> Vec<f64> {
        match self.lookup(key) {
            Some(stats) if stats.total_experiences > 0 => stats
                .params
                .iter()
                .map(|s| explore_around(s.mean(), s.std(), exploration, rng))
                .collect(),
            _ => (0..self.param_count).map(|_| rng.gen::<f64>()).collect(),
        }
    }

    pub fn get_stats<S: AsRef<str>>(&self, values: &[S]) -> Result<&ContextStats> {
        let key = self.build_key(values)?;
        self.lookup(&key).ok_or(EvoError::UnknownContext(key))
    }

    pub fn get_stats_key(&self, key: &str) -> Option<&ContextStats> {
        self.lookup(key)
    }

    /// True once the context has at least `min_samples` experiences.
    /// Invalid or unknown contexts report false.
    pub fn has_data<S: AsRef<str>>(&self, values: &[S]) -> bool {
        self.build_key(values)
            .ok()
            .and_then(|key| self.lookup(&key))
            .map(|s| s.total_experiences >= self.config.min_samples.max(1))
            .unwrap_or(false)
    }

    /// Contexts whose key contains `partial_match` and that have at least
    /// `min_samples` experiences, best fitness first.
    pub fn query_best(&self, partial_match: &str, min_samples: usize) -> Vec<&ContextStats> {
        let mut matches: Vec<&ContextStats> = self
            .contexts
            .iter()
            .filter(|s| s.key.contains(partial_match))
            .filter(|s| s.total_experiences > 0 && s.total_experiences >= min_samples)
            .collect();
        matches.sort_by(|a, b| {
            b.best_fitness
                .partial_cmp(&a.best_fitness)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        matches
    }

    pub fn record_failure<S: AsRef<str>>(
        &mut self,
        values: &[S],
        genome: &Genome,
        fitness: f64,
        generation: usize,
    ) -> Result<FailureOutcome> {
        let key = self.build_key(values)?;
        let stats = self.entry(key)?;
        stats.negative.record_failure(genome, fitness, generation)
    }

    /// Penalty from the context's failure memory; 0 for unknown contexts.
    pub fn check_penalty<S: AsRef<str>>(&self, values: &[S], genome: &Genome) -> f64 {
        self.negative_for(values)
            .map(|neg| neg.check_penalty(genome))
            .unwrap_or(0.0)
    }

    pub fn is_forbidden<S: AsRef<str>>(&self, values: &[S], genome: &Genome, threshold: f64) -> bool {
        self.negative_for(values)
            .map(|neg| neg.is_forbidden(genome, threshold))
            .unwrap_or(false)
    }

    pub fn failure_count<S: AsRef<str>>(&self, values: &[S]) -> usize {
        self.negative_for(values).map(NegativeLearning::len).unwrap_or(0)
    }

    /// Clears what a context has learned. The context itself stays known.
    pub fn reset<S: AsRef<str>>(&mut self, values: &[S]) -> Result<()> {
        let key = self.build_key(values)?;
        let slot = *self.index.get(&key).ok_or(EvoError::UnknownContext(key))?;
        self.contexts[slot].clear();
        Ok(())
    }

    pub fn reset_all(&mut self) {
        self.contexts.iter_mut().for_each(ContextStats::clear);
    }

    /// Folds the statistics of `source` into `target`.
    pub fn merge<S: AsRef<str>>(&mut self, target: &[S], source: &[S]) -> Result<()> {
        let target_key = self.build_key(target)?;
        let source_key = self.build_key(source)?;
        if target_key == source_key {
            return Ok(());
        }
        let source = self
            .lookup(&source_key)
            .cloned()
            .ok_or(EvoError::UnknownContext(source_key))?;
        let max_samples = self.config.max_samples;
        let stats = self.entry(target_key)?;

        let combined = stats.total_experiences + source.total_experiences;
        if combined > 0 {
            stats.avg_fitness = (stats.avg_fitness * stats.total_experiences as f64
                + source.avg_fitness * source.total_experiences as f64)
                / combined as f64;
        }
        stats.params.merge(&source.params);
        stats.total_experiences = combined;
        stats.best_fitness = stats.best_fitness.max(source.best_fitness);
        stats.first_update = match (stats.first_update, source.first_update) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        stats.last_update = stats.last_update.max(source.last_update);
        stats.confidence = stats.params.confidence(max_samples);
        debug!("merged context '{}' into '{}'", source.key, stats.key);
        Ok(())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.contexts.iter().map(|s| s.key.as_str()).collect()
    }

    pub fn count(&self) -> usize {
        self.contexts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContextStats> {
        self.contexts.iter()
    }

    /// One row per context: key, experiences, confidence, best/avg fitness,
    /// then the learned mean of every parameter.
    pub fn export_csv<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut header = vec![
            "context".to_string(),
            "experiences".to_string(),
            "confidence".to_string(),
            "best_fitness".to_string(),
            "avg_fitness".to_string(),
        ];
        header.extend((0..self.param_count).map(|i| format!("param_{}", i)));
        writeln!(writer, "{}", header.join(","))?;

        let mut rows: Vec<&ContextStats> = self.contexts.iter().collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        for stats in rows {
            let mut fields = vec![
                stats.key.clone(),
                stats.total_experiences.to_string(),
                format!("{:.6}", stats.confidence),
                format!("{:.6}", stats.best_fitness),
                format!("{:.6}", stats.avg_fitness),
            ];
            fields.extend(stats.means().iter().map(|m| format!("{:.6}", m)));
            writeln!(writer, "{}", fields.join(","))?;
        }
        Ok(())
    }

    fn lookup(&self, key: &str) -> Option<&ContextStats> {
        self.index.get(key).map(|&slot| &self.contexts[slot])
    }

    fn negative_for<S: AsRef<str>>(&self, values: &[S]) -> Option<&NegativeLearning> {
        let key = self.build_key(values).ok()?;
        self.lookup(&key).map(|s| &s.negative)
    }

    fn entry(&mut self, key: String) -> Result<&mut ContextStats> {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let stats = ContextStats::new(key.clone(), self.param_count, &self.config)?;
                self.contexts.push(stats);
                let slot = self.contexts.len() - 1;
                self.index.insert(key, slot);
                slot
            }
        };
        Ok(&mut self.contexts[slot])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn system() -> ContextSystem {
        let dims = vec![
            Dimension::new("asset", &["BTC", "ETH"]).unwrap(),
            Dimension::new("timeframe", &["1h", "1d"]).unwrap(),
        ];
        ContextSystem::new(2, dims, ContextConfig::default()).unwrap()
    }

    #[test]
    fn test_build_key() {
        let sys = system();
        assert_eq!(sys.build_key(&["BTC", "1h"]).unwrap(), "BTC:1h");
        assert_ne!(
            sys.build_key(&["BTC", "1d"]).unwrap(),
            sys.build_key(&["ETH", "1d"]).unwrap()
        );
        assert!(sys.build_key(&["DOGE", "1h"]).is_err());
        assert!(sys.build_key(&["BTC"]).is_err());
        assert!(sys.build_key(&["1h", "BTC"]).is_err());
    }

    #[test]
    fn test_dimension_rejects_separator() {
        assert!(Dimension::new("asset", &["BTC:USD"]).is_err());
        assert!(Dimension::new("asset", &["BTC", "BTC"]).is_err());
        assert!(Dimension::new::<&str>("asset", &[]).is_err());
    }

    #[test]
    fn test_learn_and_sample_exploit() {
        let mut sys = system();
        for _ in 0..5 {
            sys.learn(&["BTC", "1h"], &[0.4, 0.6], 0.8).unwrap();
        }
        let sample = sys.sample(&["BTC", "1h"], 0.0, &mut StdRng::seed_from_u64(1)).unwrap();
        assert!((sample[0] - 0.4).abs() < 1e-9);
        assert!((sample[1] - 0.6).abs() < 1e-9);

        let stats = sys.get_stats(&["BTC", "1h"]).unwrap();
        assert_eq!(stats.total_experiences, 5);
        assert!((stats.confidence - 0.05).abs() < 1e-12);
        assert!(sys.has_data(&["BTC", "1h"]));
        assert!(!sys.has_data(&["ETH", "1h"]));
        assert!(!sys.has_data(&["XRP", "1h"]));
    }

    #[test]
    fn test_sample_unknown_context_is_uniform() {
        let sys = system();
        let sample = sys.sample(&["ETH", "1d"], 0.0, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_eq!(sample.len(), 2);
        assert!(sample.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn test_higher_fitness_pulls_mean() {
        let mut sys = system();
        sys.learn(&["BTC", "1h"], &[0.0, 0.0], 0.1).unwrap();
        sys.learn(&["BTC", "1h"], &[1.0, 1.0], 0.9).unwrap();
        let means = sys.get_stats(&["BTC", "1h"]).unwrap().means();
        assert!((means[0] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_learn_rejects_wrong_param_count() {
        let mut sys = system();
        assert!(sys.learn(&["BTC", "1h"], &[1.0], 0.5).is_err());
        assert_eq!(sys.count(), 0);
    }

    #[test]
    fn test_query_best() {
        let mut sys = system();
        sys.learn(&["BTC", "1h"], &[0.1, 0.1], 0.3).unwrap();
        sys.learn(&["BTC", "1d"], &[0.1, 0.1], 0.9).unwrap();
        sys.learn(&["ETH", "1d"], &[0.1, 0.1], 0.5).unwrap();

        let btc: Vec<&str> = sys.query_best("BTC", 1).iter().map(|s| s.key.as_str()).collect();
        assert_eq!(btc, vec!["BTC:1d", "BTC:1h"]);

        let daily: Vec<&str> = sys.query_best("1d", 1).iter().map(|s| s.key.as_str()).collect();
        assert_eq!(daily, vec!["BTC:1d", "ETH:1d"]);

        assert!(sys.query_best("BTC", 2).is_empty());
    }

    #[test]
    fn test_failures_are_scoped_per_context() {
        let mut sys = system();
        let g = Genome::from_bytes(&[1, 2, 3, 4]);
        sys.record_failure(&["BTC", "1h"], &g, -1.0, 0).unwrap();

        assert!(sys.check_penalty(&["BTC", "1h"], &g) > 0.0);
        assert!(sys.is_forbidden(&["BTC", "1h"], &g, 0.1));
        assert_eq!(sys.check_penalty(&["ETH", "1h"], &g), 0.0);
        assert!(!sys.is_forbidden(&["ETH", "1h"], &g, 0.1));
        assert_eq!(sys.failure_count(&["BTC", "1h"]), 1);
    }

    #[test]
    fn test_reset_keeps_context() {
        let mut sys = system();
        sys.learn(&["BTC", "1h"], &[0.1, 0.2], 0.5).unwrap();
        sys.reset(&["BTC", "1h"]).unwrap();
        assert_eq!(sys.count(), 1);
        assert_eq!(sys.get_stats(&["BTC", "1h"]).unwrap().total_experiences, 0);
        assert!(sys.reset(&["ETH", "1h"]).is_err());
    }

    #[test]
    fn test_merge() {
        let mut sys = system();
        sys.learn(&["BTC", "1h"], &[0.0, 0.0], 1.0).unwrap();
        sys.learn(&["ETH", "1h"], &[1.0, 1.0], 1.0).unwrap();
        sys.merge(&["BTC", "1h"], &["ETH", "1h"]).unwrap();

        let merged = sys.get_stats(&["BTC", "1h"]).unwrap();
        assert_eq!(merged.total_experiences, 2);
        assert!((merged.means()[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_export_csv() {
        let mut sys = system();
        sys.learn(&["ETH", "1d"], &[0.25, 0.75], 0.5).unwrap();
        let mut out = Vec::new();
        sys.export_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "context,experiences,confidence,best_fitness,avg_fitness,param_0,param_1");
        assert!(lines[1].starts_with("ETH:1d,1,"));
        assert!(lines[1].ends_with("0.250000,0.750000"));
    }
}
