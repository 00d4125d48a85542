use crate::config::traits::ConfigSection;
use crate::config::{AppConfig, EvolutionConfig, NegativeLearningConfig, SchedulerConfig};
use crate::engines::evaluation::{evaluate_population, BatchEvaluator, ParallelEvaluator, SequentialEvaluator};
use crate::engines::generation::{
    domain::Domain,
    genome::Genome,
    population::{Individual, Population},
};
use crate::engines::metrics::{population_diversity, EvolutionStats, LogProgressCallback, ProgressReporter, StatsTracker};
use crate::error::{EvoError, Result};
use crate::learning::NegativeLearning;
use crate::meta::{AdaptiveScheduler, DiversityAction, MetaParams};
use crate::persist::{Checkpoint, CheckpointManager};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, _generation: usize) {}
    fn on_generation_complete(&mut self, stats: &EvolutionStats);
    fn on_batch_evaluated(&mut self, _evaluated: usize, _total_evaluations: u64) {}
    fn on_checkpoint(&mut self, _generation: usize, _path: &Path) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxGenerations,
    TargetReached,
    Converged,
}

#[derive(Debug, Clone)]
pub struct EvolutionResult {
    pub best_genome: Genome,
    /// Raw domain fitness of `best_genome`, before any failure penalty
    pub best_fitness: f64,
    pub generations: usize,
    pub stats: EvolutionStats,
    pub stop_reason: StopReason,
}

/// Runs a domain's population through evaluate, learn, adapt and breed.
pub struct EvolutionEngine<D: Domain + 'static> {
    config: EvolutionConfig,
    domain: Arc<D>,
    evaluator: Box<dyn BatchEvaluator>,
    population: Population,
    rng: StdRng,
    meta: MetaParams,
    scheduler_config: SchedulerConfig,
    scheduler: AdaptiveScheduler,
    negative_base: NegativeLearningConfig,
    negative: NegativeLearning,
    tracker: StatsTracker,
    reporter: Option<ProgressReporter>,
    checkpoints: Option<CheckpointManager>,
    best: Option<Individual>,
    generations_run: usize,
}

fn default_evaluator<D: Domain + 'static>(domain: &Arc<D>, config: &EvolutionConfig) -> Box<dyn BatchEvaluator> {
    let d = Arc::clone(domain);
    if config.parallel {
        Box::new(ParallelEvaluator::new(move |g: &Genome| d.fitness(g)).with_min_batch(config.min_parallel_batch))
    } else {
        Box::new(SequentialEvaluator::new(move |g: &Genome| d.fitness(g)))
    }
}

/// Keeps the meta population bounds consistent with the configured size.
fn align_meta(mut meta: MetaParams, population_size: usize) -> Result<MetaParams> {
    meta.target_population_size = population_size;
    meta.max_population_size = meta.max_population_size.max(population_size);
    meta.min_population_size = meta.min_population_size.min(population_size);
    meta.validate()?;
    Ok(meta)
}

impl<D: Domain + 'static> EvolutionEngine<D> {
    pub fn new(domain: D, config: EvolutionConfig) -> Result<Self> {
        config.validate()?;
        let domain = Arc::new(domain);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let meta = align_meta(
            MetaParams {
                optimization_mutation_rate: config.mutation_rate,
                ..MetaParams::default()
            },
            config.population_size,
        )?;
        let scheduler_config = SchedulerConfig::default();
        let scheduler = AdaptiveScheduler::new(config.generations, &meta, scheduler_config.clone())?;
        let negative_base = NegativeLearningConfig::default();
        let negative = NegativeLearning::new(meta.negative_config(&negative_base))?;

        Ok(Self {
            evaluator: default_evaluator(&domain, &config),
            population: Population::new(config.population_size)?,
            domain,
            rng,
            meta,
            scheduler_config,
            scheduler,
            negative_base,
            negative,
            tracker: StatsTracker::new(),
            reporter: None,
            checkpoints: None,
            best: None,
            generations_run: 0,
            config,
        })
    }

    /// Builds an engine from every relevant section of `app`, including
    /// checkpointing and log-based progress reporting when enabled.
    pub fn from_app_config(domain: D, app: &AppConfig) -> Result<Self> {
        app.validate()?;
        let mut engine = Self::new(domain, app.evolution.clone())?
            .with_scheduler_config(app.scheduler.clone())?
            .with_negative_learning(app.negative.clone())?;
        if app.reporting.enabled {
            engine = engine.with_progress(Box::new(LogProgressCallback), app.reporting.every_n_generations);
        }
        if app.checkpoint.enabled {
            engine = engine.with_checkpoints(CheckpointManager::new(app.checkpoint.clone())?);
        }
        Ok(engine)
    }

    pub fn with_meta_params(mut self, meta: MetaParams) -> Result<Self> {
        self.meta = align_meta(meta, self.config.population_size)?;
        self.rebuild_learners()?;
        Ok(self)
    }

    pub fn with_scheduler_config(mut self, config: SchedulerConfig) -> Result<Self> {
        self.scheduler_config = config;
        self.rebuild_learners()?;
        Ok(self)
    }

    /// Base settings for failure memory; the meta-parameters still decide
    /// whether it is enabled and override its penalty fields.
    pub fn with_negative_learning(mut self, config: NegativeLearningConfig) -> Result<Self> {
        self.negative_base = config;
        self.rebuild_learners()?;
        Ok(self)
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn BatchEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_progress(mut self, callback: Box<dyn ProgressCallback>, every_n: usize) -> Self {
        self.reporter = Some(ProgressReporter::new(callback, every_n));
        self
    }

    pub fn with_checkpoints(mut self, manager: CheckpointManager) -> Self {
        self.checkpoints = Some(manager);
        self
    }

    fn rebuild_learners(&mut self) -> Result<()> {
        self.scheduler = AdaptiveScheduler::new(self.config.generations, &self.meta, self.scheduler_config.clone())?;
        self.negative = NegativeLearning::new(self.meta.negative_config(&self.negative_base))?;
        Ok(())
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn domain(&self) -> &D {
        &self.domain
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn meta_params(&self) -> &MetaParams {
        &self.meta
    }

    pub fn scheduler(&self) -> &AdaptiveScheduler {
        &self.scheduler
    }

    pub fn negative_learning(&self) -> &NegativeLearning {
        &self.negative
    }

    pub fn stats(&self) -> &EvolutionStats {
        self.tracker.stats()
    }

    pub fn generations_run(&self) -> usize {
        self.generations_run
    }

    /// Best individual seen so far, by raw fitness.
    pub fn best(&self) -> Option<&Individual> {
        self.best.as_ref()
    }

    /// Fills the population with random genomes.
    pub fn initialize(&mut self) -> Result<()> {
        let size = self.config.population_size;
        let mut population = Population::new(size)?;
        for _ in 0..size {
            population.push(Individual::new(self.random_genome()?))?;
        }
        self.population = population;
        self.generations_run = 0;
        self.best = None;
        self.tracker.reset();
        debug!("initialised {} genomes for domain '{}'", size, self.domain.name());
        Ok(())
    }

    /// Continues from a checkpoint of the same domain.
    pub fn resume(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let population = checkpoint.restore(&*self.domain)?;
        if population.is_empty() {
            return Err(EvoError::PopulationEmpty);
        }
        if let Some(meta) = &checkpoint.meta_params {
            self.meta = align_meta(meta.clone(), self.config.population_size)?;
            self.rebuild_learners()?;
        }
        self.generations_run = population.generation();
        self.population = population;
        info!(
            "resumed domain '{}' at generation {}",
            self.domain.name(),
            self.generations_run
        );
        Ok(())
    }

    pub fn run(&mut self) -> Result<EvolutionResult> {
        if self.population.is_empty() {
            self.initialize()?;
        }
        info!(
            "evolving '{}': population {}, {} generations",
            self.domain.name(),
            self.population.len(),
            self.config.generations
        );

        let mut stop_reason = StopReason::MaxGenerations;
        while self.generations_run < self.config.generations {
            let stats = self.step()?;
            if let Some(target) = self.config.target_fitness {
                if stats.best_fitness_ever >= target {
                    stop_reason = StopReason::TargetReached;
                    break;
                }
            }
            if self.config.stop_on_convergence && stats.converged {
                stop_reason = StopReason::Converged;
                break;
            }
        }

        let best = self.best.clone().ok_or(EvoError::PopulationEmpty)?;
        let result = EvolutionResult {
            best_fitness: best.fitness.unwrap_or(f64::NAN),
            best_genome: best.genome,
            generations: self.generations_run,
            stats: self.tracker.stats().clone(),
            stop_reason,
        };
        info!(
            "evolution finished after {} generations ({:?}), best fitness {:.6}",
            result.generations, result.stop_reason, result.best_fitness
        );
        Ok(result)
    }

    /// Runs one generation and returns its statistics.
    pub fn step(&mut self) -> Result<EvolutionStats> {
        if self.population.is_empty() {
            return Err(EvoError::PopulationEmpty);
        }
        let generation = self.population.generation();
        self.tracker.start_generation();
        if let Some(reporter) = &mut self.reporter {
            reporter.generation_start(generation);
        }

        let evaluated = evaluate_population(&mut self.population, self.evaluator.as_ref())?;
        self.tracker.record_operations(evaluated as u64, 0, 0);
        if let Some(reporter) = &mut self.reporter {
            reporter.batch_evaluated(evaluated, self.tracker.stats().evaluations);
        }
        self.track_best();

        if self.negative.config().enabled {
            self.negative.set_generation(generation);
            self.penalize_failures(generation)?;
        }

        self.population.update_stats()?;
        let diversity = population_diversity(&self.population, &*self.domain, &mut self.rng);
        let (best, avg) = {
            let stats = self.tracker.update(&self.population, diversity)?;
            (stats.best_fitness, stats.avg_fitness)
        };

        self.scheduler.update(best, avg, diversity);
        self.scheduler.apply_to_meta(&mut self.meta);
        let action = self.scheduler.diversity_intervention(diversity);

        let (mutations, crossovers) = self.breed(action)?;
        self.tracker.record_operations(0, mutations, crossovers);
        self.generations_run += 1;

        let stats = self.tracker.stats().clone();
        if let Some(reporter) = &mut self.reporter {
            reporter.report(&stats);
        }

        if let Some(manager) = &mut self.checkpoints {
            let population = &self.population;
            let domain: &D = &self.domain;
            let meta = &self.meta;
            let saved = manager.update(population.generation(), || {
                Ok(Checkpoint::new(population, domain)
                    .with_fitness(best, avg)
                    .with_meta_params(meta))
            })?;
            if let (Some(path), Some(reporter)) = (saved, &mut self.reporter) {
                reporter.checkpoint(population.generation(), &path);
            }
        }

        debug!("generation {}: {}", generation, self.scheduler);
        Ok(stats)
    }

    fn random_genome(&mut self) -> Result<Genome> {
        let mut genome = Genome::with_capacity(self.domain.genome_size())?;
        self.domain.random_init(&mut genome, &mut self.rng);
        Ok(genome)
    }

    fn track_best(&mut self) {
        for ind in self.population.iter() {
            let Some(f) = ind.fitness.filter(|f| !f.is_nan()) else {
                continue;
            };
            if self.best.as_ref().and_then(|b| b.fitness).map_or(true, |b| f > b) {
                self.best = Some(ind.clone());
            }
        }
    }

    /// Subtracts remembered-failure penalties and records new failures.
    fn penalize_failures(&mut self, generation: usize) -> Result<()> {
        let mut adjusted = Vec::with_capacity(self.population.len());
        for ind in self.population.iter() {
            match ind.fitness {
                Some(raw) if !raw.is_nan() => {
                    adjusted.push(Some(self.negative.adjust_fitness(&ind.genome, raw)));
                    self.negative.record_failure(&ind.genome, raw, generation)?;
                }
                _ => adjusted.push(None),
            }
        }
        for (i, fitness) in adjusted.into_iter().enumerate() {
            if let Some(f) = fitness {
                self.population.set_fitness(i, f)?;
            }
        }
        Ok(())
    }

    /// Elitism, culling at the scheduler's selection pressure, then tournament
    /// selection with crossover and mutation. Returns (mutations, crossovers).
    fn breed(&mut self, action: DiversityAction) -> Result<(u64, u64)> {
        let target = if self.config.adaptive_population {
            self.scheduler.current_population_size().max(2)
        } else {
            self.config.population_size
        };
        let mutation_rate = self.scheduler.current_mutation_rate();
        let pressure = self.scheduler.current_selection_pressure();
        let forbidden = self.meta.negative_forbidden_threshold;

        self.population.sort();
        let elite = self.config.elitism_count.min(target - 1).min(self.population.len());
        let inject = match action {
            DiversityAction::InjectRandom { fraction } => {
                ((target as f64 * fraction).round() as usize).min(target - elite)
            }
            _ => 0,
        };

        let mut next = Population::new(target)?;
        next.set_generation(self.population.generation() + 1);
        for ind in &self.population.individuals()[..elite] {
            next.push(Individual::new(ind.genome.clone()))?;
        }

        let survivors = self.population.len() - (self.population.len() as f64 * pressure).floor() as usize;
        self.population.truncate(survivors.max(1));

        let tournament = self.config.tournament_size;
        let (mut mutations, mut crossovers) = (0u64, 0u64);
        while next.len() < target - inject {
            let mut children = if self.population.len() >= 2 && self.rng.gen::<f64>() < self.config.crossover_rate {
                let a = self.population.tournament_select(tournament, &mut self.rng)?;
                let b = self.population.tournament_select(tournament, &mut self.rng)?;
                let (c1, c2) = self.domain.crossover(
                    &self.population.individuals()[a].genome,
                    &self.population.individuals()[b].genome,
                    &mut self.rng,
                );
                crossovers += 1;
                vec![c1, c2]
            } else {
                let p = self.population.tournament_select(tournament, &mut self.rng)?;
                vec![self.population.individuals()[p].genome.clone()]
            };

            for child in &mut children {
                mutations += self.domain.mutate(child, mutation_rate, &mut self.rng)? as u64;
            }
            for child in children {
                if next.len() >= target - inject {
                    break;
                }
                let child = if self.negative.is_forbidden(&child, forbidden) {
                    self.random_genome()?
                } else {
                    child
                };
                next.push(Individual::new(child))?;
            }
        }

        for _ in 0..inject {
            next.push(Individual::new(self.random_genome()?))?;
        }
        if inject > 0 {
            debug!("injected {} random genomes", inject);
        }

        self.population = next;
        Ok((mutations, crossovers))
    }
}
