use adaptevo::config::{AppConfig, CheckpointConfig, EvolutionConfig};
use adaptevo::engines::generation::{
    ByteDomain, Domain, DomainRegistry, EvolutionEngine, IpcProgressCallback, ProgressMessage, StopReason,
};
use adaptevo::meta::{meta_evaluate, MetaParams, MetaPopulation};
use adaptevo::persist::{CheckpointManager, Format};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::mpsc;
use std::sync::Arc;

const GENOME_BYTES: usize = 12;

fn one_max(bytes: &[u8]) -> f64 {
    let ones: u32 = bytes.iter().map(|b| b.count_ones()).sum();
    ones as f64 / (bytes.len() * 8) as f64
}

fn domain() -> ByteDomain<fn(&[u8]) -> f64> {
    ByteDomain::new("onemax", GENOME_BYTES, one_max as fn(&[u8]) -> f64)
}

fn test_config(seed: u64, generations: usize) -> EvolutionConfig {
    EvolutionConfig {
        population_size: 24,
        generations,
        tournament_size: 3,
        elitism_count: 2,
        seed: Some(seed),
        parallel: false,
        ..EvolutionConfig::default()
    }
}

fn checkpoint_config(dir: &std::path::Path, every: usize, format: Format) -> CheckpointConfig {
    CheckpointConfig {
        enabled: true,
        every_n_generations: every,
        directory: dir.to_path_buf(),
        max_checkpoints: 0,
        format,
    }
}

#[test]
fn test_evolution_basic() {
    let mut engine = EvolutionEngine::new(domain(), test_config(11, 40)).unwrap();
    let result = engine.run().unwrap();

    assert_eq!(result.stop_reason, StopReason::MaxGenerations);
    assert_eq!(result.generations, 40);
    assert!(result.best_fitness > 0.6, "one-max should climb, got {}", result.best_fitness);
    assert_eq!(result.best_genome.size(), GENOME_BYTES);
    assert_eq!(one_max(result.best_genome.as_bytes()), result.best_fitness);
    assert!(result.stats.best_fitness_ever >= result.stats.avg_fitness);
    assert!(result.stats.mutations > 0);
    assert!(result.stats.crossovers > 0);
}

#[test]
fn test_parallel_matches_sequential() {
    let sequential = EvolutionConfig {
        population_size: 40,
        ..test_config(5, 10)
    };
    let parallel = EvolutionConfig {
        parallel: true,
        min_parallel_batch: 8,
        ..sequential.clone()
    };

    let a = EvolutionEngine::new(domain(), sequential).unwrap().run().unwrap();
    let b = EvolutionEngine::new(domain(), parallel).unwrap().run().unwrap();
    assert_eq!(a.best_genome, b.best_genome);
    assert_eq!(a.stats.evaluations, b.stats.evaluations);
}

#[test]
fn test_progress_over_channel() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::channel();
    let manager = CheckpointManager::new(checkpoint_config(dir.path(), 2, Format::Binary)).unwrap();

    let mut engine = EvolutionEngine::new(domain(), test_config(2, 4))
        .unwrap()
        .with_progress(Box::new(IpcProgressCallback::new(tx)), 1)
        .with_checkpoints(manager);
    engine.run().unwrap();
    drop(engine);

    let messages: Vec<ProgressMessage> = rx.iter().collect();
    let count = |pred: fn(&ProgressMessage) -> bool| messages.iter().filter(|m| pred(m)).count();
    assert_eq!(count(|m| matches!(m, ProgressMessage::GenerationStart(_))), 4);
    assert_eq!(count(|m| matches!(m, ProgressMessage::GenerationComplete(_))), 4);
    assert_eq!(count(|m| matches!(m, ProgressMessage::BatchEvaluated { .. })), 4);

    let written: Vec<usize> = messages
        .iter()
        .filter_map(|m| match m {
            ProgressMessage::CheckpointWritten { generation, path } => {
                assert!(path.exists());
                Some(*generation)
            }
            _ => None,
        })
        .collect();
    assert_eq!(written, vec![2, 4]);
}

#[test]
fn test_resume_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = checkpoint_config(dir.path(), 5, Format::Json);

    let mut first = EvolutionEngine::new(domain(), test_config(21, 12))
        .unwrap()
        .with_checkpoints(CheckpointManager::new(config.clone()).unwrap());
    let first_result = first.run().unwrap();
    assert_eq!(first_result.generations, 12);

    let manager = CheckpointManager::new(config).unwrap();
    let generations: Vec<usize> = manager.list().unwrap().into_iter().map(|(g, _)| g).collect();
    assert_eq!(generations, vec![5, 10]);

    let checkpoint = manager.latest().unwrap().unwrap();
    assert_eq!(checkpoint.generation, 10);
    assert_eq!(checkpoint.domain, "onemax");
    assert!(checkpoint.meta_params.is_some());

    let mut resumed = EvolutionEngine::new(domain(), test_config(22, 20)).unwrap();
    resumed.resume(&checkpoint).unwrap();
    assert_eq!(resumed.generations_run(), 10);
    assert_eq!(resumed.population().len(), 24);

    let result = resumed.run().unwrap();
    assert_eq!(result.generations, 20);
    assert_eq!(resumed.population().generation(), 20);
}

#[test]
fn test_resume_rejects_other_domain() {
    let dir = tempfile::tempdir().unwrap();
    let config = checkpoint_config(dir.path(), 1, Format::Binary);
    let mut engine = EvolutionEngine::new(domain(), test_config(1, 2))
        .unwrap()
        .with_checkpoints(CheckpointManager::new(config.clone()).unwrap());
    engine.run().unwrap();

    let checkpoint = CheckpointManager::new(config).unwrap().latest().unwrap().unwrap();
    let other = ByteDomain::new("zeros", GENOME_BYTES, |b: &[u8]| b.iter().filter(|&&x| x == 0).count() as f64);
    let mut engine = EvolutionEngine::new(other, test_config(1, 4)).unwrap();
    assert!(engine.resume(&checkpoint).is_err());
}

#[test]
fn test_engine_from_app_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = AppConfig::default();
    app.evolution = test_config(8, 6);
    app.reporting.enabled = false;
    app.checkpoint = checkpoint_config(dir.path(), 3, Format::Json);
    app.scheduler.stagnation_threshold = 4;

    let mut engine = EvolutionEngine::from_app_config(domain(), &app).unwrap();
    assert_eq!(engine.scheduler().config().stagnation_threshold, 4);
    engine.run().unwrap();

    let saved = CheckpointManager::new(app.checkpoint.clone()).unwrap().list().unwrap();
    assert_eq!(saved.len(), 2);

    app.evolution.population_size = 1;
    assert!(EvolutionEngine::from_app_config(domain(), &app).is_err());
}

#[test]
fn test_meta_population_tunes_engines() {
    let mut rng = StdRng::seed_from_u64(4);
    let mut meta = MetaPopulation::new(3, &mut rng).unwrap();

    for _ in 0..2 {
        for i in 0..meta.len() {
            let params = meta.get(i).unwrap().params.clone();
            let mut trial = EvolutionEngine::new(domain(), test_config(i as u64, 6))
                .unwrap()
                .with_meta_params(params)
                .unwrap();
            let outcome = trial.run().unwrap();
            let score = meta_evaluate(
                outcome.stats.best_fitness_ever,
                outcome.stats.avg_fitness,
                outcome.stats.diversity,
                outcome.generations,
            );
            assert!(score.is_finite());
            meta.record_fitness(i, score).unwrap();
        }
        meta.evolve(&mut rng, None).unwrap();
    }

    assert_eq!(meta.generation(), 2);
    assert!(meta.best_meta_fitness().is_some());
    assert!(meta.best_params().validate().is_ok());
}

#[test]
fn test_meta_params_at_range_edges_build_engines() {
    let silent = MetaParams {
        negative_penalty_weight: 0.0,
        ..MetaParams::default()
    };
    silent.validate().unwrap();
    let mut engine = EvolutionEngine::new(domain(), test_config(3, 5))
        .unwrap()
        .with_meta_params(silent)
        .unwrap();
    assert_eq!(engine.run().unwrap().generations, 5);

    // Every mutated set stays inside its ranges and must still build.
    let mut rng = StdRng::seed_from_u64(17);
    let mut params = MetaParams::default();
    for _ in 0..200 {
        params.mutate(&mut rng);
        params.validate().unwrap();
        EvolutionEngine::new(domain(), test_config(1, 2))
            .unwrap()
            .with_meta_params(params.clone())
            .unwrap();
    }
}

#[test]
fn test_domain_registry() {
    let mut registry = DomainRegistry::new();
    registry.register(Arc::new(domain())).unwrap();
    assert!(registry.register(Arc::new(domain())).is_err());

    let found = registry.get("onemax").unwrap();
    assert_eq!(found.genome_size(), GENOME_BYTES);
    assert_eq!(registry.names(), vec!["onemax"]);
    assert!(registry.unregister("onemax").is_some());
    assert!(registry.is_empty());
}
