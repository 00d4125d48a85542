use super::stats::EvolutionStats;
use crate::engines::generation::evolution_engine::ProgressCallback;
use log::info;
use std::path::Path;

/// Forwards events to a `ProgressCallback`, thinning generation reports to
/// every `every_n` generations. Generation 0 and converged generations are
/// always reported.
pub struct ProgressReporter {
    callback: Box<dyn ProgressCallback>,
    every_n: usize,
    reported: usize,
}

impl ProgressReporter {
    pub fn new(callback: Box<dyn ProgressCallback>, every_n: usize) -> Self {
        Self {
            callback,
            every_n: every_n.max(1),
            reported: 0,
        }
    }

    pub fn every_n(&self) -> usize {
        self.every_n
    }

    /// Generation reports delivered so far.
    pub fn reported(&self) -> usize {
        self.reported
    }

    pub fn should_report(&self, stats: &EvolutionStats) -> bool {
        stats.generation == 0 || stats.generation % self.every_n == 0 || stats.converged
    }

    pub fn generation_start(&mut self, generation: usize) {
        self.callback.on_generation_start(generation);
    }

    pub fn batch_evaluated(&mut self, evaluated: usize, total_evaluations: u64) {
        self.callback.on_batch_evaluated(evaluated, total_evaluations);
    }

    /// Returns true when the callback was invoked.
    pub fn report(&mut self, stats: &EvolutionStats) -> bool {
        if !self.should_report(stats) {
            return false;
        }
        self.callback.on_generation_complete(stats);
        self.reported += 1;
        true
    }

    pub fn checkpoint(&mut self, generation: usize, path: &Path) {
        self.callback.on_checkpoint(generation, path);
    }
}

/// Reports through the `log` facade at info level.
pub struct LogProgressCallback;

impl ProgressCallback for LogProgressCallback {
    fn on_generation_complete(&mut self, stats: &EvolutionStats) {
        info!("{}", stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<usize>>>);

    impl ProgressCallback for Recorder {
        fn on_generation_complete(&mut self, stats: &EvolutionStats) {
            self.0.lock().unwrap().push(stats.generation);
        }
    }

    #[test]
    fn test_cadence() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut reporter = ProgressReporter::new(Box::new(Recorder(seen.clone())), 5);
        for generation in 0..12 {
            let stats = EvolutionStats {
                generation,
                converged: generation == 7,
                ..EvolutionStats::default()
            };
            reporter.report(&stats);
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 5, 7, 10]);
        assert_eq!(reporter.reported(), 4);
    }

    #[test]
    fn test_zero_cadence_reports_every_generation() {
        let reporter = ProgressReporter::new(Box::new(LogProgressCallback), 0);
        assert_eq!(reporter.every_n(), 1);
    }
}
