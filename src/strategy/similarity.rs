use crate::error::{EvoError, Result};
use crate::learning::ContextSystem;
use crate::types::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Euclidean distance between two parameter vectors, over their common prefix.
pub fn param_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// `exp(-distance / max_distance)`: 1 for identical vectors, falling towards 0.
pub fn param_similarity(a: &[f64], b: &[f64], max_distance: f64) -> f64 {
    let max_distance = if max_distance > 0.0 { max_distance } else { 1.0 };
    (-param_distance(a, b) / max_distance).exp()
}

/// Symmetric similarity scores between a fixed set of context ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    scores: Vec<f64>,
    last_update: Timestamp,
}

impl SimilarityMatrix {
    pub fn new<S: AsRef<str>>(ids: &[S]) -> Result<Self> {
        if ids.is_empty() {
            return Err(EvoError::invalid("similarity matrix needs at least one context id"));
        }
        let mut index = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if index.insert(id.as_ref().to_string(), i).is_some() {
                return Err(EvoError::invalid(format!(
                    "duplicate context id '{}' in similarity matrix",
                    id.as_ref()
                )));
            }
        }
        let n = ids.len();
        let mut scores = vec![0.0; n * n];
        for i in 0..n {
            scores[i * n + i] = 1.0;
        }
        Ok(Self {
            ids: ids.iter().map(|s| s.as_ref().to_string()).collect(),
            index,
            scores,
            last_update: Utc::now(),
        })
    }

    /// Builds a matrix over every context with data, scoring each pair by
    /// `param_similarity` of their learned means.
    pub fn from_contexts(system: &ContextSystem, max_distance: f64) -> Result<Self> {
        let learned: Vec<_> = system.iter().filter(|c| c.total_experiences > 0).collect();
        let ids: Vec<&str> = learned.iter().map(|c| c.key.as_str()).collect();
        let mut matrix = Self::new(&ids)?;
        let means: Vec<Vec<f64>> = learned.iter().map(|c| c.means()).collect();
        for i in 0..means.len() {
            for j in (i + 1)..means.len() {
                let s = param_similarity(&means[i], &means[j], max_distance);
                matrix.set_at(i, j, s);
            }
        }
        Ok(matrix)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn last_update(&self) -> Timestamp {
        self.last_update
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| EvoError::UnknownContext(id.to_string()))
    }

    fn set_at(&mut self, i: usize, j: usize, similarity: f64) {
        let n = self.ids.len();
        self.scores[i * n + j] = similarity;
        self.scores[j * n + i] = similarity;
    }

    /// Sets the score for both orderings of the pair.
    pub fn set(&mut self, a: &str, b: &str, similarity: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&similarity) {
            return Err(EvoError::invalid(format!(
                "similarity {} outside [0, 1]",
                similarity
            )));
        }
        let i = self.position(a)?;
        let j = self.position(b)?;
        if i == j {
            return Err(EvoError::invalid(format!("self-similarity of '{}' is fixed at 1", a)));
        }
        self.set_at(i, j, similarity);
        self.last_update = Utc::now();
        Ok(())
    }

    /// 1 on the diagonal, 0 for unset pairs or unknown ids.
    pub fn get(&self, a: &str, b: &str) -> f64 {
        match (self.index.get(a), self.index.get(b)) {
            (Some(&i), Some(&j)) => self.scores[i * self.ids.len() + j],
            _ => 0.0,
        }
    }

    /// Most similar other context with a positive score. Ties go to the id
    /// registered first.
    pub fn find_nearest(&self, target: &str) -> Option<&str> {
        let t = *self.index.get(target)?;
        let n = self.ids.len();
        let mut best: Option<(usize, f64)> = None;
        for j in (0..n).filter(|&j| j != t) {
            let s = self.scores[t * n + j];
            if s > 0.0 && best.map_or(true, |(_, b)| s > b) {
                best = Some((j, s));
            }
        }
        best.map(|(j, _)| self.ids[j].as_str())
    }

    /// Other contexts at least `min_similarity` similar to `target`, most
    /// similar first.
    pub fn transferable(&self, target: &str, min_similarity: f64) -> Vec<(&str, f64)> {
        let Some(&t) = self.index.get(target) else {
            return Vec::new();
        };
        let n = self.ids.len();
        let mut out: Vec<(&str, f64)> = (0..n)
            .filter(|&j| j != t)
            .map(|j| (self.ids[j].as_str(), self.scores[t * n + j]))
            .filter(|&(_, s)| s > 0.0 && s >= min_similarity)
            .collect();
        out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::learning::ContextConfig;
    use crate::learning::Dimension;

    #[test]
    fn test_param_distance() {
        assert_eq!(param_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(param_similarity(&[1.0], &[1.0], 1.0), 1.0);
        let s = param_similarity(&[0.0], &[2.0], 2.0);
        assert!((s - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_matrix_defaults_and_symmetry() {
        let mut m = SimilarityMatrix::new(&["a", "b", "c"]).unwrap();
        assert_eq!(m.get("a", "a"), 1.0);
        assert_eq!(m.get("a", "b"), 0.0);
        assert_eq!(m.get("a", "zzz"), 0.0);

        m.set("a", "b", 0.7).unwrap();
        assert_eq!(m.get("b", "a"), 0.7);
        assert!(m.set("a", "b", 1.5).is_err());
        assert!(m.set("a", "zzz", 0.5).is_err());
        assert!(m.set("a", "a", 0.5).is_err());
    }

    #[test]
    fn test_rejects_bad_ids() {
        let empty: [&str; 0] = [];
        assert!(SimilarityMatrix::new(&empty).is_err());
        assert!(SimilarityMatrix::new(&["a", "a"]).is_err());
    }

    #[test]
    fn test_nearest_and_transferable() {
        let mut m = SimilarityMatrix::new(&["a", "b", "c", "d"]).unwrap();
        assert_eq!(m.find_nearest("a"), None);

        m.set("a", "b", 0.4).unwrap();
        m.set("a", "c", 0.9).unwrap();
        m.set("a", "d", 0.4).unwrap();
        assert_eq!(m.find_nearest("a"), Some("c"));

        let t = m.transferable("a", 0.4);
        let names: Vec<&str> = t.iter().map(|(id, _)| *id).collect();
        assert_eq!(names, vec!["c", "b", "d"]);
        assert!(m.transferable("a", 0.95).is_empty());
        assert!(m.transferable("nope", 0.0).is_empty());
    }

    #[test]
    fn test_from_contexts() {
        let dims = vec![Dimension::new("asset", &["BTC", "ETH", "SOL"]).unwrap()];
        let mut ctx = ContextSystem::new(2, dims, ContextConfig::default()).unwrap();
        ctx.learn(&["BTC"], &[0.1, 0.1], 1.0).unwrap();
        ctx.learn(&["ETH"], &[0.1, 0.2], 1.0).unwrap();
        ctx.learn(&["SOL"], &[5.0, 5.0], 1.0).unwrap();

        let m = SimilarityMatrix::from_contexts(&ctx, 1.0).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m.find_nearest("BTC"), Some("ETH"));
        assert!(m.get("BTC", "ETH") > m.get("BTC", "SOL"));
    }
}
