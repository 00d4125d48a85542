use adaptevo::config::{ConfigManager, EvolutionConfig};
use adaptevo::engines::generation::{ByteDomain, ConsoleProgressCallback, EvolutionEngine};
use adaptevo::meta::{meta_evaluate, MetaPopulation};
use anyhow::{Context, Result};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

const GENOME_BYTES: usize = 16;

/// Fraction of set bits.
fn one_max(bytes: &[u8]) -> f64 {
    let ones: u32 = bytes.iter().map(|b| b.count_ones()).sum();
    ones as f64 / (bytes.len() * 8) as f64
}

fn main() -> Result<()> {
    env_logger::init();

    let manager = ConfigManager::new();
    if let Some(path) = std::env::args().nth(1) {
        manager
            .load_from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?;
    }
    let app = manager.get()?;

    let domain = ByteDomain::new("onemax", GENOME_BYTES, one_max);
    let reporting_every = app.reporting.every_n_generations;
    let mut engine = EvolutionEngine::from_app_config(domain, &app)
        .context("building the evolution engine")?
        .with_progress(Box::new(ConsoleProgressCallback), reporting_every);
    let result = engine.run().context("evolution run failed")?;
    println!(
        "\nBest fitness {:.4} after {} generations ({:?})",
        result.best_fitness, result.generations, result.stop_reason
    );

    // Tune the engine's own settings with a few short runs per candidate.
    let mut rng = StdRng::seed_from_u64(app.evolution.seed.unwrap_or(0));
    let mut meta = MetaPopulation::new(4, &mut rng).context("creating meta-population")?;
    let short = EvolutionConfig {
        generations: 15,
        population_size: 24,
        tournament_size: 3,
        ..app.evolution.clone()
    };
    for round in 0..3 {
        for i in 0..meta.len() {
            let params = meta.get(i).map(|ind| ind.params.clone()).unwrap_or_default();
            let mut trial = EvolutionEngine::new(ByteDomain::new("onemax", GENOME_BYTES, one_max), short.clone())?
                .with_meta_params(params)?;
            let outcome = trial.run()?;
            let score = meta_evaluate(
                outcome.stats.best_fitness_ever,
                outcome.stats.avg_fitness,
                outcome.stats.diversity,
                outcome.generations,
            );
            meta.record_fitness(i, score)?;
        }
        meta.evolve(&mut rng, None)?;
        info!(
            "meta round {}: best meta-fitness {:.3}",
            round,
            meta.best_meta_fitness().unwrap_or(0.0)
        );
    }
    println!(
        "Best mutation rate found: {:.4}",
        meta.best_params().optimization_mutation_rate
    );
    Ok(())
}
