use super::params::MetaParams;
use crate::config::scheduler::SchedulerConfig;
use crate::config::traits::ConfigSection;
use crate::error::{EvoError, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

const EARLY_END: f64 = 0.30;
const MID_END: f64 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Early,
    Mid,
    Late,
}

impl Phase {
    pub fn from_progress(progress: f64) -> Self {
        if progress < EARLY_END {
            Phase::Early
        } else if progress < MID_END {
            Phase::Mid
        } else {
            Phase::Late
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Early => "EARLY",
            Phase::Mid => "MID",
            Phase::Late => "LATE",
        }
    }

    fn exploration(self) -> f64 {
        match self {
            Phase::Early => 0.7,
            Phase::Mid => 0.5,
            Phase::Late => 0.2,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do about a population whose diversity is sliding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DiversityAction {
    None,
    IncreaseMutation,
    /// Replace this fraction of the population with random individuals
    InjectRandom { fraction: f64 },
}

fn slope<'a>(values: impl ExactSizeIterator<Item = &'a f64>) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let (mut sx, mut sy, mut sxy, mut sxx) = (0.0, 0.0, 0.0, 0.0);
    for (i, y) in values.enumerate() {
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

/// Drives mutation rate, selection pressure and population size from run
/// progress, stagnation and diversity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveScheduler {
    config: SchedulerConfig,
    max_generations: usize,
    generation: usize,
    phase: Phase,

    fitness_history: VecDeque<f64>,
    best_fitness_ever: Option<f64>,
    stagnant_generations: usize,
    fitness_variance: f64,

    diversity: f64,
    avg_diversity: f64,
    diversity_history: VecDeque<f64>,
    diversity_trend: f64,

    initial_mutation_rate: f64,
    initial_population_size: usize,
    final_population_size: usize,
    mutation_rate: f64,
    selection_pressure: f64,
    population_size: usize,

    recovery: bool,
    recovery_remaining: usize,
    recovery_count: usize,
}

impl AdaptiveScheduler {
    pub fn new(max_generations: usize, initial: &MetaParams, config: SchedulerConfig) -> Result<Self> {
        if max_generations == 0 {
            return Err(EvoError::invalid("max_generations must be at least 1"));
        }
        config.validate()?;
        let window = config.history_window;
        info!(
            "adaptive scheduler created: max_gen={}, init_mut={:.3}",
            max_generations, initial.optimization_mutation_rate
        );
        Ok(Self {
            max_generations,
            generation: 0,
            phase: Phase::Early,
            fitness_history: VecDeque::with_capacity(window),
            best_fitness_ever: None,
            stagnant_generations: 0,
            fitness_variance: 0.0,
            diversity: 0.5,
            avg_diversity: 0.5,
            diversity_history: VecDeque::with_capacity(window),
            diversity_trend: 0.0,
            initial_mutation_rate: initial.optimization_mutation_rate,
            initial_population_size: initial.target_population_size,
            final_population_size: initial.min_population_size.min(initial.target_population_size),
            mutation_rate: initial.optimization_mutation_rate,
            selection_pressure: initial.culling_ratio,
            population_size: initial.target_population_size,
            recovery: false,
            recovery_remaining: 0,
            recovery_count: 0,
            config,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn max_generations(&self) -> usize {
        self.max_generations
    }

    pub fn progress(&self) -> f64 {
        self.generation as f64 / self.max_generations as f64
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stagnant_generations(&self) -> usize {
        self.stagnant_generations
    }

    pub fn is_stagnant(&self) -> bool {
        self.stagnant_generations >= self.config.stagnation_threshold
    }

    pub fn in_recovery(&self) -> bool {
        self.recovery
    }

    pub fn recovery_remaining(&self) -> usize {
        self.recovery_remaining
    }

    pub fn recovery_count(&self) -> usize {
        self.recovery_count
    }

    pub fn best_fitness_ever(&self) -> Option<f64> {
        self.best_fitness_ever
    }

    /// Coefficient of variation of the recent best fitness.
    pub fn fitness_variance(&self) -> f64 {
        self.fitness_variance
    }

    /// Slope of the recent best fitness per generation.
    pub fn improvement_rate(&self) -> f64 {
        slope(self.fitness_history.iter())
    }

    pub fn diversity(&self) -> f64 {
        self.diversity
    }

    pub fn avg_diversity(&self) -> f64 {
        self.avg_diversity
    }

    pub fn diversity_trend(&self) -> f64 {
        self.diversity_trend
    }

    pub fn current_mutation_rate(&self) -> f64 {
        self.mutation_rate
    }

    pub fn current_selection_pressure(&self) -> f64 {
        self.selection_pressure
    }

    pub fn current_population_size(&self) -> usize {
        self.population_size
    }

    /// Feeds one generation's results and refreshes every derived setting.
    pub fn update(&mut self, best_fitness: f64, _avg_fitness: f64, diversity: f64) {
        self.generation += 1;
        self.phase = Phase::from_progress(self.progress());

        if self.recovery {
            self.recovery_remaining = self.recovery_remaining.saturating_sub(1);
            if self.recovery_remaining == 0 {
                self.recovery = false;
                info!("stagnation recovery ended at generation {}", self.generation);
            }
        }

        if best_fitness.is_finite() {
            if self.fitness_history.len() == self.config.history_window {
                self.fitness_history.pop_front();
            }
            self.fitness_history.push_back(best_fitness);

            let improved = match self.best_fitness_ever {
                None => true,
                Some(best) => best_fitness - best > self.config.improvement_epsilon,
            };
            if improved {
                self.stagnant_generations = 0;
            } else {
                self.stagnant_generations += 1;
            }
            if self.best_fitness_ever.map_or(true, |b| best_fitness > b) {
                self.best_fitness_ever = Some(best_fitness);
            }
        } else {
            self.stagnant_generations += 1;
        }
        self.fitness_variance = self.compute_fitness_variance();

        if diversity.is_finite() {
            self.diversity = diversity;
            let alpha = self.config.diversity_smoothing;
            self.avg_diversity = alpha * diversity + (1.0 - alpha) * self.avg_diversity;
            if self.diversity_history.len() == self.config.history_window {
                self.diversity_history.pop_front();
            }
            self.diversity_history.push_back(diversity);
            self.diversity_trend = slope(self.diversity_history.iter());
        }

        if self.is_stagnant() && !self.recovery {
            self.trigger_recovery();
        }

        self.mutation_rate = self.get_mutation_rate();
        self.selection_pressure = self.get_selection_pressure();
        self.population_size = self.get_population_size();
    }

    fn compute_fitness_variance(&self) -> f64 {
        let n = self.fitness_history.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.fitness_history.iter().sum::<f64>() / n as f64;
        if mean.abs() < 1e-9 {
            return 0.0;
        }
        let var = self.fitness_history.iter().map(|f| (f - mean) * (f - mean)).sum::<f64>() / n as f64;
        var.sqrt() / mean.abs()
    }

    /// Enters recovery mode for `recovery_duration` generations.
    pub fn trigger_recovery(&mut self) {
        if self.config.recovery_duration == 0 {
            return;
        }
        self.recovery = true;
        self.recovery_remaining = self.config.recovery_duration;
        self.recovery_count += 1;
        self.stagnant_generations = 0;
        info!(
            "stagnation recovery triggered at generation {} (#{})",
            self.generation, self.recovery_count
        );
    }

    /// Decaying base rate, boosted in recovery and when diversity is low.
    pub fn get_mutation_rate(&self) -> f64 {
        let mut rate = self.initial_mutation_rate * (-self.config.decay_alpha * self.progress()).exp();
        if self.recovery {
            rate *= self.config.stagnation_boost;
        }
        if self.diversity < self.config.min_diversity {
            rate *= self.config.diversity_boost;
        }
        rate.clamp(self.config.min_mutation_rate, 1.0)
    }

    /// Fraction culled per generation: gentle when fitness is spread out or
    /// during recovery, harsh when it has collapsed.
    pub fn get_selection_pressure(&self) -> f64 {
        let cfg = &self.config;
        if self.recovery || self.fitness_variance > cfg.high_variance_threshold {
            cfg.high_variance_kill
        } else if self.fitness_variance < cfg.low_variance_threshold {
            cfg.low_variance_kill
        } else {
            cfg.medium_variance_kill
        }
    }

    /// Large early, shrinking linearly through MID, small late; expanded in recovery.
    pub fn get_population_size(&self) -> usize {
        let initial = self.initial_population_size as f64;
        let last = self.final_population_size as f64;
        let mut size = match self.phase {
            Phase::Early => initial,
            Phase::Mid => {
                let t = ((self.progress() - EARLY_END) / (MID_END - EARLY_END)).clamp(0.0, 1.0);
                initial - (initial - last) * t
            }
            Phase::Late => last,
        };
        if self.recovery {
            size *= self.config.expansion_factor;
        }
        (size.round() as usize).max(1)
    }

    /// Recommended response to `diversity`. Thresholds grow by up to half
    /// when diversity has been falling.
    pub fn diversity_intervention(&mut self, diversity: f64) -> DiversityAction {
        let scale = (1.0 - self.diversity_trend * 10.0).clamp(1.0, 1.5);
        if diversity < 0.1 * scale {
            warn!("diversity critical ({:.3}): injecting 20% random individuals", diversity);
            DiversityAction::InjectRandom { fraction: 0.2 }
        } else if diversity < 0.2 * scale {
            warn!("diversity low ({:.3}): injecting 10% random individuals", diversity);
            DiversityAction::InjectRandom { fraction: 0.1 }
        } else if diversity < 0.3 * scale {
            info!("diversity below target ({:.3}): increasing mutation", diversity);
            self.mutation_rate = (self.mutation_rate * self.config.diversity_boost).min(1.0);
            DiversityAction::IncreaseMutation
        } else {
            DiversityAction::None
        }
    }

    /// Writes the current schedule into `params`.
    pub fn apply_to_meta(&self, params: &mut MetaParams) {
        params.optimization_mutation_rate = self.mutation_rate;
        params.variance_mutation_rate = (self.mutation_rate * 1.2).min(1.0);
        params.culling_ratio = self.selection_pressure;
        params.target_population_size = self.population_size;
        if params.max_population_size < self.population_size {
            params.max_population_size = self.population_size;
        }
        if params.min_population_size > self.population_size {
            params.min_population_size = self.population_size;
        }
        let mut exploration = self.phase.exploration();
        if self.recovery {
            exploration += 0.2;
        }
        params.exploration_factor = exploration.min(1.0);
    }
}

impl fmt::Display for AdaptiveScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gen={}/{} Phase={} Mut={:.4} Kill={:.2} Pop={} Div={:.3} Stag={} Recovery={}",
            self.generation,
            self.max_generations,
            self.phase,
            self.mutation_rate,
            self.selection_pressure,
            self.population_size,
            self.diversity,
            self.stagnant_generations,
            if self.recovery { "yes" } else { "no" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(max_generations: usize) -> AdaptiveScheduler {
        AdaptiveScheduler::new(max_generations, &MetaParams::default(), SchedulerConfig::default()).unwrap()
    }

    #[test]
    fn test_phases() {
        assert_eq!(Phase::from_progress(0.0), Phase::Early);
        assert_eq!(Phase::from_progress(0.29), Phase::Early);
        assert_eq!(Phase::from_progress(0.3), Phase::Mid);
        assert_eq!(Phase::from_progress(0.69), Phase::Mid);
        assert_eq!(Phase::from_progress(0.7), Phase::Late);

        let mut s = scheduler(10);
        for _ in 0..3 {
            s.update(1.0, 1.0, 0.5);
        }
        assert_eq!(s.phase(), Phase::Mid);
        assert!(AdaptiveScheduler::new(0, &MetaParams::default(), SchedulerConfig::default()).is_err());
    }

    #[test]
    fn test_improving_never_stagnates() {
        let mut s = scheduler(200);
        for g in 0..100 {
            s.update(g as f64, 0.0, 0.5);
            assert_eq!(s.stagnant_generations(), 0);
        }
        assert!(!s.in_recovery());
        assert!(s.improvement_rate() > 0.0);
    }

    #[test]
    fn test_flat_run_triggers_recovery_once() {
        let mut s = scheduler(1000);
        let mut entered = 0;
        let mut was = false;
        for _ in 0..=20 {
            s.update(1.0, 1.0, 0.5);
            if s.in_recovery() && !was {
                entered += 1;
            }
            was = s.in_recovery();
        }
        assert_eq!(entered, 1);
        assert_eq!(s.recovery_count(), 1);
        assert_eq!(s.recovery_remaining(), 10);

        // recovery runs its course without re-triggering
        for _ in 0..9 {
            s.update(1.0, 1.0, 0.5);
            assert!(s.in_recovery());
        }
        s.update(1.0, 1.0, 0.5);
        assert!(!s.in_recovery());
        assert_eq!(s.recovery_count(), 1);
    }

    #[test]
    fn test_recovery_boosts_mutation_and_relaxes_selection() {
        let mut s = scheduler(1000);
        s.update(1.0, 1.0, 0.5);
        let calm = s.current_mutation_rate();
        s.trigger_recovery();
        assert!(s.get_mutation_rate() > calm * 2.0);
        assert_eq!(s.get_selection_pressure(), 0.15);
        assert!(s.get_population_size() > 500);
    }

    #[test]
    fn test_schedule_is_pure() {
        let mut a = scheduler(100);
        let mut b = scheduler(100);
        for g in 0..40 {
            let best = (g as f64 * 0.3).sin();
            a.update(best, 0.0, 0.4);
            b.update(best, 0.0, 0.4);
        }
        assert_eq!(a.get_mutation_rate(), b.get_mutation_rate());
        assert_eq!(a.get_selection_pressure(), b.get_selection_pressure());
        assert_eq!(a.get_population_size(), b.get_population_size());
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_selection_pressure_follows_variance() {
        let mut s = scheduler(1000);
        for _ in 0..5 {
            s.update(10.0, 0.0, 0.5);
        }
        // identical best fitness: no spread, harsh selection
        assert_eq!(s.fitness_variance(), 0.0);
        assert_eq!(s.get_selection_pressure(), 0.40);

        let mut s = scheduler(1000);
        for f in [1.0, 10.0, 2.0, 20.0] {
            s.update(f, 0.0, 0.5);
        }
        assert!(s.fitness_variance() > 0.15);
        assert_eq!(s.get_selection_pressure(), 0.15);
    }

    #[test]
    fn test_diversity_intervention() {
        let mut s = scheduler(100);
        assert_eq!(
            s.diversity_intervention(0.05),
            DiversityAction::InjectRandom { fraction: 0.2 }
        );
        assert_eq!(
            s.diversity_intervention(0.15),
            DiversityAction::InjectRandom { fraction: 0.1 }
        );
        let before = s.current_mutation_rate();
        assert_eq!(s.diversity_intervention(0.25), DiversityAction::IncreaseMutation);
        assert!(s.current_mutation_rate() > before);
        assert_eq!(s.diversity_intervention(0.6), DiversityAction::None);

        // a falling trend widens the net
        let mut falling = scheduler(100);
        for d in [0.9, 0.8, 0.7, 0.6, 0.5, 0.4] {
            falling.update(1.0, 1.0, d);
        }
        assert!(falling.diversity_trend() < 0.0);
        assert_eq!(falling.diversity_intervention(0.32), DiversityAction::IncreaseMutation);
    }

    #[test]
    fn test_apply_to_meta() {
        let mut s = scheduler(100);
        s.update(1.0, 1.0, 0.5);
        let mut params = MetaParams::default();
        s.apply_to_meta(&mut params);
        assert_eq!(params.optimization_mutation_rate, s.current_mutation_rate());
        assert!((params.variance_mutation_rate - s.current_mutation_rate() * 1.2).abs() < 1e-12);
        assert_eq!(params.exploration_factor, 0.7);
        assert_eq!(params.target_population_size, s.current_population_size());
        params.validate().unwrap();

        s.trigger_recovery();
        s.apply_to_meta(&mut params);
        assert!((params.exploration_factor - 0.9).abs() < 1e-12);
    }
}
