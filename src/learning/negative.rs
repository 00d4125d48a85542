//! Failure memory.
//!
//! Genomes that scored badly are remembered together with a penalty. Later
//! candidates that look like a remembered failure have that penalty subtracted
//! from their fitness, which steers the search away from known dead ends.

use crate::config::learning::{NegativeLearningConfig, SeverityThresholds};
use crate::config::traits::ConfigSection;
use crate::engines::generation::genome::Genome;
use crate::error::{EvoError, Result};
use crate::types::{Severity, Timestamp};
use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Highest severity whose threshold `fitness` reaches.
pub fn classify_failure(fitness: f64, thresholds: &SeverityThresholds) -> Severity {
    if fitness.is_nan() {
        return Severity::None;
    }
    if fitness <= thresholds.fatal {
        Severity::Fatal
    } else if fitness <= thresholds.severe {
        Severity::Severe
    } else if fitness <= thresholds.moderate {
        Severity::Moderate
    } else if fitness <= thresholds.mild {
        Severity::Mild
    } else {
        Severity::None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub genome: Genome,
    pub fitness: f64, // worst seen
    pub severity: Severity,
    pub generation: usize,
    pub last_seen_generation: usize,
    pub penalty_score: f64, // before generational decay
    pub repeat_count: u32,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub active: bool,
    sequence: u64,
}

impl FailureRecord {
    fn decayed_penalty(&self, current_generation: usize, decay_rate: f64) -> f64 {
        let age = current_generation.saturating_sub(self.last_seen_generation);
        self.penalty_score * decay_rate.powi(age.min(i32::MAX as usize) as i32)
    }

    /// Oldest first, insertion order breaking timestamp ties.
    fn age_order(&self, other: &FailureRecord) -> Ordering {
        self.first_seen
            .cmp(&other.first_seen)
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// What `record_failure` did with an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Fitness was above every threshold
    NotAFailure,
    Recorded(Severity),
    /// Folded into an existing similar record
    Repeated { severity: Severity, repeat_count: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NegativeStats {
    pub total: usize,
    pub active: usize,
    pub mild: usize,
    pub moderate: usize,
    pub severe: usize,
    pub fatal: usize,
    pub repeat_victims: usize,
    pub avg_penalty: f64,
    pub max_penalty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegativeLearning {
    config: NegativeLearningConfig,
    records: Vec<FailureRecord>,
    current_generation: usize,
    last_cleanup: usize,
    next_sequence: u64,
}

impl NegativeLearning {
    pub fn new(config: NegativeLearningConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            records: Vec::new(),
            current_generation: 0,
            last_cleanup: 0,
            next_sequence: 0,
        })
    }

    pub fn config(&self) -> &NegativeLearningConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn current_generation(&self) -> usize {
        self.current_generation
    }

    pub fn classify(&self, fitness: f64) -> Severity {
        classify_failure(fitness, &self.config.thresholds)
    }

    /// Records `genome` if `fitness` classifies as a failure.
    pub fn record_failure(&mut self, genome: &Genome, fitness: f64, generation: usize) -> Result<FailureOutcome> {
        let severity = self.classify(fitness);
        self.record_with_severity(genome, fitness, severity, generation)
    }

    pub fn record_with_severity(
        &mut self,
        genome: &Genome,
        fitness: f64,
        severity: Severity,
        generation: usize,
    ) -> Result<FailureOutcome> {
        if genome.is_empty() {
            return Err(EvoError::GenomeEmpty);
        }
        if fitness.is_nan() {
            return Err(EvoError::invalid("failure fitness is NaN"));
        }
        if severity == Severity::None {
            return Ok(FailureOutcome::NotAFailure);
        }

        self.current_generation = self.current_generation.max(generation);
        let now = Utc::now();

        if let Some(index) = self.most_similar(genome) {
            let thresholds = self.config.thresholds;
            let record = &mut self.records[index];
            record.repeat_count = record.repeat_count.saturating_add(1);
            record.last_seen = now;
            record.last_seen_generation = generation.max(record.last_seen_generation);
            record.active = true;
            if fitness < record.fitness {
                record.fitness = fitness;
                record.severity = record.severity.max(classify_failure(fitness, &thresholds));
            }
            record.severity = record.severity.max(severity);
            let growth = self
                .config
                .repeat_multiplier
                .powi(record.repeat_count.min(i32::MAX as u32) as i32);
            record.penalty_score =
                (self.config.base_penalty * record.severity.weight() * growth).min(self.config.penalty_cap);

            debug!(
                "repeat failure #{} ({}), penalty {:.3}",
                record.repeat_count, record.severity, record.penalty_score
            );
            return Ok(FailureOutcome::Repeated {
                severity: record.severity,
                repeat_count: record.repeat_count,
            });
        }

        if self.records.len() >= self.config.capacity {
            self.evict_one();
        }

        self.records.push(FailureRecord {
            genome: genome.clone(),
            fitness,
            severity,
            generation,
            last_seen_generation: generation,
            penalty_score: (self.config.base_penalty * severity.weight()).min(self.config.penalty_cap),
            repeat_count: 0,
            first_seen: now,
            last_seen: now,
            active: true,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
        Ok(FailureOutcome::Recorded(severity))
    }

    /// Penalty for the most similar remembered failure, 0 when none is
    /// similar enough.
    pub fn check_penalty(&self, genome: &Genome) -> f64 {
        self.most_similar(genome)
            .map(|i| self.records[i].decayed_penalty(self.current_generation, self.config.decay_rate))
            .unwrap_or(0.0)
    }

    /// `raw - penalty`; never better than `raw`.
    pub fn adjust_fitness(&self, genome: &Genome, raw: f64) -> f64 {
        raw - self.check_penalty(genome).max(0.0)
    }

    pub fn is_forbidden(&self, genome: &Genome, threshold: f64) -> bool {
        let penalty = self.check_penalty(genome);
        penalty > 0.0 && penalty >= threshold
    }

    /// Ages every record by `generations`, deactivating those whose decayed
    /// penalty drops under the configured floor. Returns how many were
    /// deactivated.
    pub fn decay(&mut self, generations: usize) -> usize {
        self.current_generation = self.current_generation.saturating_add(generations);
        let floor = self.config.penalty_floor;
        let mut deactivated = 0;
        for record in self.records.iter_mut().filter(|r| r.active) {
            if record.decayed_penalty(self.current_generation, self.config.decay_rate) < floor {
                record.active = false;
                deactivated += 1;
            }
        }
        deactivated
    }

    /// Moves the clock to `generation`, decaying and running the periodic
    /// cleanup when it is due.
    pub fn set_generation(&mut self, generation: usize) {
        if generation > self.current_generation {
            self.decay(generation - self.current_generation);
        }
        let interval = self.config.cleanup_interval;
        if interval > 0 && self.current_generation.saturating_sub(self.last_cleanup) >= interval {
            let removed = self.prune(self.config.penalty_floor, self.config.max_age);
            if removed > 0 {
                debug!("negative learning cleanup removed {} records", removed);
            }
            self.last_cleanup = self.current_generation;
        }
    }

    /// Removes inactive records, those whose decayed penalty is below
    /// `min_penalty`, and those unseen for more than `max_age` generations
    /// (`0` disables the age check). Returns the number removed.
    pub fn prune(&mut self, min_penalty: f64, max_age: usize) -> usize {
        let before = self.records.len();
        let current = self.current_generation;
        let decay_rate = self.config.decay_rate;
        self.records.retain(|r| {
            let expired = max_age > 0 && current.saturating_sub(r.last_seen_generation) > max_age;
            r.active && !expired && r.decayed_penalty(current, decay_rate) >= min_penalty
        });
        before - self.records.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn stats(&self) -> NegativeStats {
        let mut stats = NegativeStats {
            total: self.records.len(),
            ..NegativeStats::default()
        };
        let mut penalty_sum = 0.0;
        for record in self.records.iter().filter(|r| r.active) {
            stats.active += 1;
            match record.severity {
                Severity::None => {}
                Severity::Mild => stats.mild += 1,
                Severity::Moderate => stats.moderate += 1,
                Severity::Severe => stats.severe += 1,
                Severity::Fatal => stats.fatal += 1,
            }
            if record.repeat_count > 0 {
                stats.repeat_victims += 1;
            }
            let penalty = record.decayed_penalty(self.current_generation, self.config.decay_rate);
            penalty_sum += penalty;
            stats.max_penalty = stats.max_penalty.max(penalty);
        }
        if stats.active > 0 {
            stats.avg_penalty = penalty_sum / stats.active as f64;
        }
        stats
    }

    /// Index of the active record most similar to `genome`, provided it
    /// meets the similarity threshold. Equal similarity prefers the larger
    /// penalty.
    fn most_similar(&self, genome: &Genome) -> Option<usize> {
        let mut best: Option<(usize, f64, f64)> = None;
        for (i, record) in self.records.iter().enumerate().filter(|(_, r)| r.active) {
            let similarity = genome.similarity(&record.genome);
            if similarity < self.config.similarity_threshold {
                continue;
            }
            let penalty = record.decayed_penalty(self.current_generation, self.config.decay_rate);
            let better = match best {
                None => true,
                Some((_, s, p)) => similarity > s || (similarity == s && penalty > p),
            };
            if better {
                best = Some((i, similarity, penalty));
            }
        }
        best.map(|(i, _, _)| i)
    }

    /// Drops an inactive record if there is one, otherwise the record with
    /// the lowest decayed penalty, oldest first among equals.
    fn evict_one(&mut self) {
        let current = self.current_generation;
        let decay_rate = self.config.decay_rate;
        let victim = self
            .records
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.active
                    .cmp(&b.active)
                    .then_with(|| {
                        a.decayed_penalty(current, decay_rate)
                            .partial_cmp(&b.decayed_penalty(current, decay_rate))
                            .unwrap_or(Ordering::Equal)
                    })
                    .then_with(|| a.age_order(b))
            })
            .map(|(i, _)| i);

        if let Some(index) = victim {
            let removed = self.records.remove(index);
            debug!(
                "evicted {} failure from generation {} (penalty {:.3})",
                removed.severity, removed.generation, removed.penalty_score
            );
        }
    }
}
