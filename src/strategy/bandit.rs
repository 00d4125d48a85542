use crate::error::{EvoError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmStats {
    pub pulls: u64,
    pub total_reward: f64,
    pub mean_reward: f64,
}

/// UCB1 multi-armed bandit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bandit {
    arms: Vec<ArmStats>,
    total_pulls: u64,
    ucb_c: f64,
}

impl Bandit {
    pub fn new(arm_count: usize, ucb_c: f64) -> Result<Self> {
        if arm_count == 0 {
            return Err(EvoError::invalid("bandit needs at least one arm"));
        }
        if !(ucb_c >= 0.0) {
            return Err(EvoError::invalid(format!("ucb constant {} must be non-negative", ucb_c)));
        }
        Ok(Self {
            arms: vec![ArmStats::default(); arm_count],
            total_pulls: 0,
            ucb_c,
        })
    }

    pub fn arm_count(&self) -> usize {
        self.arms.len()
    }

    pub fn total_pulls(&self) -> u64 {
        self.total_pulls
    }

    /// Arm with the highest upper confidence bound. Unpulled arms come first
    /// (lowest index wins), and ties on the bound also go to the lowest index.
    pub fn select(&self) -> usize {
        if let Some(unpulled) = self.arms.iter().position(|a| a.pulls == 0) {
            return unpulled;
        }
        let log_total = (self.total_pulls as f64).ln();
        let mut best = 0;
        let mut best_bound = f64::NEG_INFINITY;
        for (i, arm) in self.arms.iter().enumerate() {
            let bound = arm.mean_reward + self.ucb_c * (log_total / arm.pulls as f64).sqrt();
            if bound > best_bound {
                best = i;
                best_bound = bound;
            }
        }
        best
    }

    pub fn update(&mut self, arm: usize, reward: f64) -> Result<()> {
        if !reward.is_finite() {
            return Err(EvoError::invalid(format!("reward {} is not finite", reward)));
        }
        let arm_count = self.arms.len();
        let stats = self
            .arms
            .get_mut(arm)
            .ok_or_else(|| EvoError::invalid(format!("arm {} out of range (0..{})", arm, arm_count)))?;
        stats.pulls += 1;
        stats.total_reward += reward;
        stats.mean_reward += (reward - stats.mean_reward) / stats.pulls as f64;
        self.total_pulls += 1;
        Ok(())
    }

    pub fn stats(&self, arm: usize) -> Option<&ArmStats> {
        self.arms.get(arm)
    }

    /// Arm with the highest mean reward among those pulled at least once.
    pub fn best_arm(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, arm) in self.arms.iter().enumerate().filter(|(_, a)| a.pulls > 0) {
            if best.map_or(true, |(_, m)| arm.mean_reward > m) {
                best = Some((i, arm.mean_reward));
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn reset(&mut self) {
        self.arms.iter_mut().for_each(|a| *a = ArmStats::default());
        self.total_pulls = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpulled_arms_first() {
        let mut bandit = Bandit::new(3, 1.4).unwrap();
        let mut seen = Vec::new();
        for _ in 0..3 {
            let arm = bandit.select();
            seen.push(arm);
            bandit.update(arm, 0.0).unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn test_converges_on_best_arm() {
        let mut bandit = Bandit::new(3, 1.0).unwrap();
        let rewards = [0.1, 0.9, 0.4];
        for _ in 0..300 {
            let arm = bandit.select();
            bandit.update(arm, rewards[arm]).unwrap();
        }
        assert_eq!(bandit.best_arm(), Some(1));
        let best_pulls = bandit.stats(1).unwrap().pulls;
        assert!(best_pulls > bandit.stats(0).unwrap().pulls);
        assert!(best_pulls > bandit.stats(2).unwrap().pulls);
        assert_eq!(bandit.total_pulls(), 300);
    }

    #[test]
    fn test_incremental_mean() {
        let mut bandit = Bandit::new(1, 1.0).unwrap();
        for r in [1.0, 2.0, 6.0] {
            bandit.update(0, r).unwrap();
        }
        let stats = bandit.stats(0).unwrap();
        assert!((stats.mean_reward - 3.0).abs() < 1e-12);
        assert_eq!(stats.total_reward, 9.0);
    }

    #[test]
    fn test_invalid_arm() {
        let mut bandit = Bandit::new(2, 1.0).unwrap();
        assert!(bandit.update(5, 1.0).is_err());
        assert!(Bandit::new(0, 1.0).is_err());
        bandit.update(1, 1.0).unwrap();
        bandit.reset();
        assert_eq!(bandit.total_pulls(), 0);
        assert_eq!(bandit.best_arm(), None);
    }
}
