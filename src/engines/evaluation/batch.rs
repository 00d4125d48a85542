use crate::engines::generation::{genome::Genome, population::Population};
use crate::error::Result;
use rayon::prelude::*;

/// Scores a batch of genomes, returning fitnesses in input order.
pub trait BatchEvaluator: Send + Sync {
    fn evaluate_batch(&self, genomes: &[&Genome]) -> Vec<f64>;
}

/// Evaluates one genome at a time on the calling thread.
pub struct SequentialEvaluator<F> {
    fitness: F,
}

impl<F> SequentialEvaluator<F>
where
    F: Fn(&Genome) -> f64 + Send + Sync,
{
    pub fn new(fitness: F) -> Self {
        Self { fitness }
    }
}

impl<F> BatchEvaluator for SequentialEvaluator<F>
where
    F: Fn(&Genome) -> f64 + Send + Sync,
{
    fn evaluate_batch(&self, genomes: &[&Genome]) -> Vec<f64> {
        genomes.iter().map(|g| (self.fitness)(*g)).collect()
    }
}

/// Spreads evaluation over the rayon thread pool.
pub struct ParallelEvaluator<F> {
    fitness: F,
    min_batch: usize,
}

impl<F> ParallelEvaluator<F>
where
    F: Fn(&Genome) -> f64 + Send + Sync,
{
    pub fn new(fitness: F) -> Self {
        Self { fitness, min_batch: 16 }
    }

    /// Batches smaller than this are evaluated sequentially.
    pub fn with_min_batch(mut self, min_batch: usize) -> Self {
        self.min_batch = min_batch;
        self
    }
}

impl<F> BatchEvaluator for ParallelEvaluator<F>
where
    F: Fn(&Genome) -> f64 + Send + Sync,
{
    fn evaluate_batch(&self, genomes: &[&Genome]) -> Vec<f64> {
        if genomes.len() < self.min_batch {
            return genomes.iter().map(|g| (self.fitness)(*g)).collect();
        }
        genomes.par_iter().map(|g| (self.fitness)(*g)).collect()
    }
}

/// Evaluates every individual and writes the scores back.
pub fn evaluate_population(population: &mut Population, evaluator: &dyn BatchEvaluator) -> Result<usize> {
    let scores = {
        let genomes = population.genomes();
        evaluator.evaluate_batch(&genomes)
    };
    population.apply_fitness(&scores)?;
    Ok(scores.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_sum(g: &Genome) -> f64 {
        g.as_bytes().iter().map(|&b| b as f64).sum()
    }

    #[test]
    fn test_parallel_matches_sequential_order() {
        let genomes: Vec<Genome> = (0..100u8).map(|i| Genome::from_bytes(&[i, i])).collect();
        let refs: Vec<&Genome> = genomes.iter().collect();

        let sequential = SequentialEvaluator::new(byte_sum).evaluate_batch(&refs);
        let parallel = ParallelEvaluator::new(byte_sum).with_min_batch(1).evaluate_batch(&refs);

        assert_eq!(sequential, parallel);
        assert_eq!(parallel[10], 20.0);
    }

    #[test]
    fn test_evaluate_population() {
        let mut pop = Population::new(4).unwrap();
        for i in 0..4u8 {
            pop.add(&Genome::from_bytes(&[i]), None).unwrap();
        }
        let n = evaluate_population(&mut pop, &ParallelEvaluator::new(byte_sum)).unwrap();
        assert_eq!(n, 4);
        let stats = pop.update_stats().unwrap();
        assert_eq!(stats.best_fitness, 3.0);
        assert_eq!(stats.best_index, 3);
    }
}
