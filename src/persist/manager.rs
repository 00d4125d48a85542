use super::checkpoint::Checkpoint;
use super::Format;
use crate::config::CheckpointConfig;
use crate::error::{EvoError, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

const PREFIX: &str = "checkpoint_";

/// Writes checkpoints on a generation cadence and keeps only the newest few.
#[derive(Debug)]
pub struct CheckpointManager {
    config: CheckpointConfig,
    since_last: usize,
    saved: usize,
    last_path: Option<PathBuf>,
}

impl CheckpointManager {
    /// Creates the checkpoint directory when checkpoints are enabled.
    pub fn new(config: CheckpointConfig) -> Result<Self> {
        if config.enabled {
            if config.every_n_generations == 0 {
                return Err(EvoError::Configuration(
                    "checkpoint cadence must be at least one generation".to_string(),
                ));
            }
            fs::create_dir_all(&config.directory).map_err(|e| EvoError::FileWrite {
                path: config.directory.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(Self {
            config,
            since_last: 0,
            saved: 0,
            last_path: None,
        })
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Checkpoints written by this manager.
    pub fn saved_count(&self) -> usize {
        self.saved
    }

    pub fn last_path(&self) -> Option<&Path> {
        self.last_path.as_deref()
    }

    pub fn path_for(&self, generation: usize) -> PathBuf {
        self.config.directory.join(format!(
            "{}{:08}.{}",
            PREFIX,
            generation,
            self.config.format.extension()
        ))
    }

    /// Called once per generation. When the cadence is due, builds a
    /// checkpoint with `make`, saves it and prunes old files. `make` is not
    /// called on other generations.
    pub fn update<F>(&mut self, generation: usize, make: F) -> Result<Option<PathBuf>>
    where
        F: FnOnce() -> Result<Checkpoint>,
    {
        if !self.config.enabled {
            return Ok(None);
        }
        self.since_last += 1;
        if self.since_last < self.config.every_n_generations {
            return Ok(None);
        }
        self.since_last = 0;

        let mut checkpoint = make()?;
        checkpoint.generation = generation;
        let path = self.save(&checkpoint)?;
        self.prune()?;
        Ok(Some(path))
    }

    /// Saves immediately, regardless of cadence.
    pub fn save(&mut self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.directory).map_err(|e| EvoError::FileWrite {
            path: self.config.directory.clone(),
            reason: e.to_string(),
        })?;
        let path = self.path_for(checkpoint.generation);
        checkpoint.save(&path, self.config.format)?;
        self.saved += 1;
        self.last_path = Some(path.clone());
        info!("checkpoint for generation {} written to {}", checkpoint.generation, path.display());
        Ok(path)
    }

    /// Checkpoint files in the directory, oldest generation first. Files that
    /// do not follow the naming scheme are ignored.
    pub fn list(&self) -> Result<Vec<(usize, PathBuf)>> {
        let entries = match fs::read_dir(&self.config.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EvoError::FileRead {
                    path: self.config.directory.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let mut found = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if let Some(generation) = parse_generation(&path) {
                found.push((generation, path));
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(found)
    }

    pub fn latest(&self) -> Result<Option<Checkpoint>> {
        match self.list()?.pop() {
            Some((_, path)) => Ok(Some(Checkpoint::load(&path)?)),
            None => Ok(None),
        }
    }

    /// Deletes the oldest checkpoints beyond `max_checkpoints`; returns how
    /// many were removed.
    pub fn prune(&self) -> Result<usize> {
        if self.config.max_checkpoints == 0 {
            return Ok(0);
        }
        let files = self.list()?;
        let excess = files.len().saturating_sub(self.config.max_checkpoints);
        let mut removed = 0;
        for (generation, path) in files.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    debug!("pruned checkpoint for generation {}", generation);
                }
                Err(e) => warn!("could not prune {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

fn parse_generation(path: &Path) -> Option<usize> {
    Format::from_path(path)?;
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix(PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::domain::ByteDomain;
    use crate::engines::generation::genome::Genome;
    use crate::engines::generation::population::Population;

    fn config(dir: &Path, every: usize, max: usize, format: Format) -> CheckpointConfig {
        CheckpointConfig {
            enabled: true,
            every_n_generations: every,
            directory: dir.join("cps"),
            max_checkpoints: max,
            format,
        }
    }

    fn population() -> Population {
        let mut pop = Population::new(2).unwrap();
        pop.add(&Genome::from_bytes(&[4, 2]), Some(1.0)).unwrap();
        pop
    }

    #[test]
    fn test_cadence_and_pruning() {
        let dir = tempfile::tempdir().unwrap();
        let domain = ByteDomain::new("pair", 2, |b: &[u8]| b[0] as f64);
        let mut manager = CheckpointManager::new(config(dir.path(), 2, 2, Format::Binary)).unwrap();

        let mut written = Vec::new();
        for generation in 1..=7 {
            let pop = population();
            if let Some(path) = manager.update(generation, || Ok(Checkpoint::new(&pop, &domain))).unwrap() {
                written.push(path);
            }
        }
        assert_eq!(written.len(), 3);
        assert_eq!(manager.saved_count(), 3);

        let kept: Vec<usize> = manager.list().unwrap().into_iter().map(|(g, _)| g).collect();
        assert_eq!(kept, vec![4, 6]);
        assert!(written[0].ends_with("checkpoint_00000002.bin"));

        let latest = manager.latest().unwrap().unwrap();
        assert_eq!(latest.generation, 6);
        assert_eq!(latest.restore(&domain).unwrap().len(), 1);
    }

    #[test]
    fn test_disabled_never_calls_make() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), 1, 5, Format::Json);
        cfg.enabled = false;
        let mut manager = CheckpointManager::new(cfg).unwrap();
        let out = manager
            .update(1, || -> Result<Checkpoint> { panic!("should not build a checkpoint") })
            .unwrap();
        assert!(out.is_none());
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let domain = ByteDomain::new("pair", 2, |b: &[u8]| b[0] as f64);
        let mut manager = CheckpointManager::new(config(dir.path(), 1, 0, Format::Json)).unwrap();
        manager.save(&Checkpoint::new(&population(), &domain)).unwrap();
        fs::write(dir.path().join("cps").join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("cps").join("checkpoint_abc.json"), "{}").unwrap();
        assert_eq!(manager.list().unwrap().len(), 1);
        assert_eq!(manager.prune().unwrap(), 0);
    }
}
