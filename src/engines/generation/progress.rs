use super::evolution_engine::ProgressCallback;
use crate::engines::metrics::EvolutionStats;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

pub struct ConsoleProgressCallback;

impl ProgressCallback for ConsoleProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        println!("Generation {} starting...", generation);
    }

    fn on_generation_complete(&mut self, stats: &EvolutionStats) {
        println!("\n=== Generation {} ===", stats.generation);
        println!(
            "Fitness:     best={:.6}  avg={:.6}  worst={:.6}",
            stats.best_fitness, stats.avg_fitness, stats.worst_fitness
        );
        println!(
            "All-time:    best_ever={:.6}  improvement_rate={:.8}",
            stats.best_fitness_ever, stats.improvement_rate
        );
        println!(
            "Diversity:   genome={:.4}  variance={:.6}  diverse={}",
            stats.diversity,
            stats.fitness_variance,
            if stats.diverse { "yes" } else { "no" }
        );
        if stats.convergence_streak > 0 {
            println!("Stagnation:  {} generations without improvement", stats.convergence_streak);
        }
        println!(
            "Operations:  {} evaluations, {} mutations, {} crossovers in {:.2?}",
            stats.evaluations, stats.mutations, stats.crossovers, stats.generation_time
        );
        if stats.converged {
            println!("Converged.");
        }
    }

    fn on_batch_evaluated(&mut self, evaluated: usize, total_evaluations: u64) {
        println!("  Evaluated {} genomes ({} total)", evaluated, total_evaluations);
    }
}

// For handing progress to another thread
pub struct IpcProgressCallback {
    sender: Sender<ProgressMessage>,
}

#[derive(Debug, Clone)]
pub enum ProgressMessage {
    GenerationStart(usize),
    GenerationComplete(Box<EvolutionStats>),
    BatchEvaluated { evaluated: usize, total: u64 },
    CheckpointWritten { generation: usize, path: PathBuf },
}

impl IpcProgressCallback {
    pub fn new(sender: Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

// A dropped receiver only means nobody is listening any more.
impl ProgressCallback for IpcProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        let _ = self.sender.send(ProgressMessage::GenerationStart(generation));
    }

    fn on_generation_complete(&mut self, stats: &EvolutionStats) {
        let _ = self
            .sender
            .send(ProgressMessage::GenerationComplete(Box::new(stats.clone())));
    }

    fn on_batch_evaluated(&mut self, evaluated: usize, total_evaluations: u64) {
        let _ = self.sender.send(ProgressMessage::BatchEvaluated {
            evaluated,
            total: total_evaluations,
        });
    }

    fn on_checkpoint(&mut self, generation: usize, path: &Path) {
        let _ = self.sender.send(ProgressMessage::CheckpointWritten {
            generation,
            path: path.to_path_buf(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_ipc_forwards_messages() {
        let (tx, rx) = mpsc::channel();
        let mut cb = IpcProgressCallback::new(tx);
        cb.on_generation_start(3);
        cb.on_generation_complete(&EvolutionStats {
            generation: 3,
            best_fitness: 2.5,
            ..EvolutionStats::default()
        });
        cb.on_checkpoint(3, Path::new("cp/checkpoint_00000003.json"));

        assert!(matches!(rx.recv().unwrap(), ProgressMessage::GenerationStart(3)));
        match rx.recv().unwrap() {
            ProgressMessage::GenerationComplete(stats) => assert_eq!(stats.best_fitness, 2.5),
            other => panic!("unexpected message {:?}", other),
        }
        assert!(matches!(
            rx.recv().unwrap(),
            ProgressMessage::CheckpointWritten { generation: 3, .. }
        ));
    }

    #[test]
    fn test_ipc_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut cb = IpcProgressCallback::new(tx);
        cb.on_generation_start(0);
        cb.on_batch_evaluated(10, 10);
    }
}
