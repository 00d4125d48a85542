use super::similarity::SimilarityMatrix;
use crate::config::strategy::SynthesisConfig;
use crate::error::{EvoError, Result};
use crate::learning::ContextSystem;
use crate::types::Timestamp;
use chrono::Utc;
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Below this total confidence, WEIGHTED treats every source equally.
const MIN_WEIGHT_SUM: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisStrategy {
    Average,
    Weighted,
    Trend,
    Regime,
    Ensemble,
    Nearest,
}

impl SynthesisStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            SynthesisStrategy::Average => "average",
            SynthesisStrategy::Weighted => "weighted",
            SynthesisStrategy::Trend => "trend",
            SynthesisStrategy::Regime => "regime",
            SynthesisStrategy::Ensemble => "ensemble",
            SynthesisStrategy::Nearest => "nearest",
        }
    }
}

impl fmt::Display for SynthesisStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SynthesisStrategy {
    type Err = EvoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "average" => Ok(SynthesisStrategy::Average),
            "weighted" => Ok(SynthesisStrategy::Weighted),
            "trend" => Ok(SynthesisStrategy::Trend),
            "regime" => Ok(SynthesisStrategy::Regime),
            "ensemble" => Ok(SynthesisStrategy::Ensemble),
            "nearest" => Ok(SynthesisStrategy::Nearest),
            other => Err(EvoError::invalid(format!("unknown synthesis strategy '{}'", other))),
        }
    }
}

/// One parameter estimate feeding a synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSource {
    pub parameters: Vec<f64>,
    pub confidence: f64,
    pub fitness: f64,
    pub timestamp: Timestamp,
    pub context_id: Option<String>,
    /// Per-parameter slope, when the source comes with one.
    pub trend: Option<Vec<f64>>,
}

impl ParamSource {
    pub fn new(parameters: Vec<f64>, confidence: f64, fitness: f64) -> Self {
        Self {
            parameters,
            confidence,
            fitness,
            timestamp: Utc::now(),
            context_id: None,
            trend: None,
        }
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn with_trend(mut self, trend: Vec<f64>) -> Self {
        self.trend = Some(trend);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub parameters: Vec<f64>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    strategy: SynthesisStrategy,
    param_count: usize,
    sources: Vec<ParamSource>,
    exploration: f64,
    trend_strength: f64,
    target_context: Option<String>,
    regime: Option<String>,
    output: Option<SynthesisResult>,
}

impl SynthesisRequest {
    pub fn new(strategy: SynthesisStrategy, param_count: usize) -> Self {
        Self {
            strategy,
            param_count,
            sources: Vec::new(),
            exploration: 0.0,
            trend_strength: 0.5,
            target_context: None,
            regime: None,
            output: None,
        }
    }

    pub fn from_config(config: &SynthesisConfig, param_count: usize) -> Self {
        Self {
            exploration: config.exploration,
            trend_strength: config.trend_strength,
            ..Self::new(config.strategy, param_count)
        }
    }

    pub fn with_exploration(mut self, exploration: f64) -> Self {
        self.exploration = exploration.clamp(0.0, 1.0);
        self
    }

    pub fn with_trend_strength(mut self, strength: f64) -> Self {
        self.trend_strength = strength;
        self
    }

    pub fn with_target_context(mut self, context_id: impl Into<String>) -> Self {
        self.target_context = Some(context_id.into());
        self
    }

    pub fn with_regime(mut self, regime: impl Into<String>) -> Self {
        self.regime = Some(regime.into());
        self
    }

    pub fn strategy(&self) -> SynthesisStrategy {
        self.strategy
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn sources(&self) -> &[ParamSource] {
        &self.sources
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Result of the last successful `execute`.
    pub fn output(&self) -> Option<&SynthesisResult> {
        self.output.as_ref()
    }

    pub fn add_source(&mut self, source: ParamSource) -> Result<()> {
        if !(0.0..=1.0).contains(&source.confidence) {
            return Err(EvoError::invalid(format!(
                "source confidence {} outside [0, 1]",
                source.confidence
            )));
        }
        self.sources.push(source);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.param_count == 0 {
            return Err(EvoError::invalid("synthesis needs at least one parameter"));
        }
        if self.sources.is_empty() {
            return Err(EvoError::invalid("synthesis needs at least one source"));
        }
        for source in &self.sources {
            if source.parameters.len() != self.param_count {
                return Err(EvoError::SizeMismatch {
                    expected: self.param_count,
                    actual: source.parameters.len(),
                });
            }
            if let Some(trend) = &source.trend {
                if trend.len() != self.param_count {
                    return Err(EvoError::SizeMismatch {
                        expected: self.param_count,
                        actual: trend.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Combines the sources according to the strategy. NEAREST consults
    /// `similarity` when both it and a target context are present.
    pub fn execute<R: Rng + ?Sized>(
        &mut self,
        similarity: Option<&SimilarityMatrix>,
        rng: &mut R,
    ) -> Result<SynthesisResult> {
        self.validate()?;

        let all: Vec<&ParamSource> = self.sources.iter().collect();
        let (mut parameters, mut confidence) = match self.strategy {
            SynthesisStrategy::Average => (average(&all, self.param_count), blended_confidence(&all)),
            SynthesisStrategy::Weighted => (weighted(&all, self.param_count), blended_confidence(&all)),
            SynthesisStrategy::Trend => {
                let out = if all.iter().any(|s| s.trend.is_some()) {
                    trend(&all, self.param_count, self.trend_strength)
                } else {
                    weighted(&all, self.param_count)
                };
                (out, blended_confidence(&all))
            }
            SynthesisStrategy::Regime => {
                let matching: Vec<&ParamSource> = match &self.regime {
                    Some(regime) => all
                        .iter()
                        .copied()
                        .filter(|s| s.context_id.as_deref() == Some(regime.as_str()))
                        .collect(),
                    None => Vec::new(),
                };
                let used = if matching.is_empty() { &all } else { &matching };
                (weighted(used, self.param_count), blended_confidence(used))
            }
            SynthesisStrategy::Ensemble => {
                let chosen = ensemble_pick(&all, rng);
                (all[chosen].parameters.clone(), all[chosen].confidence)
            }
            SynthesisStrategy::Nearest => {
                let chosen = self.nearest_pick(similarity);
                (all[chosen].parameters.clone(), all[chosen].confidence)
            }
        };

        if self.exploration > 0.0 {
            let e = self.exploration;
            for p in parameters.iter_mut() {
                *p = (1.0 - e) * *p + e * rng.gen::<f64>();
            }
            confidence *= 1.0 - e * 0.5;
        }

        debug!(
            "synthesis {} over {} sources -> confidence {:.3}",
            self.strategy,
            self.sources.len(),
            confidence
        );
        let result = SynthesisResult { parameters, confidence };
        self.output = Some(result.clone());
        Ok(result)
    }

    fn nearest_pick(&self, similarity: Option<&SimilarityMatrix>) -> usize {
        let score = |s: &ParamSource| -> f64 {
            match (similarity, self.target_context.as_deref(), s.context_id.as_deref()) {
                (Some(m), Some(target), Some(id)) => m.get(target, id),
                _ => 0.0,
            }
        };
        let mut best = 0;
        for (i, source) in self.sources.iter().enumerate().skip(1) {
            let current = &self.sources[best];
            let (s, b) = (score(source), score(current));
            if s > b || (s == b && source.confidence > current.confidence) {
                best = i;
            }
        }
        best
    }
}

fn average(sources: &[&ParamSource], param_count: usize) -> Vec<f64> {
    let mut out = vec![0.0; param_count];
    for source in sources {
        for (o, p) in out.iter_mut().zip(&source.parameters) {
            *o += p;
        }
    }
    let n = sources.len() as f64;
    out.iter_mut().for_each(|o| *o /= n);
    out
}

fn weighted(sources: &[&ParamSource], param_count: usize) -> Vec<f64> {
    let total: f64 = sources.iter().map(|s| s.confidence).sum();
    if total < MIN_WEIGHT_SUM {
        return average(sources, param_count);
    }
    let mut out = vec![0.0; param_count];
    for source in sources {
        let w = source.confidence / total;
        for (o, p) in out.iter_mut().zip(&source.parameters) {
            *o += w * p;
        }
    }
    out
}

/// Confidence-weighted mean of each source extrapolated along its slope.
/// Sources without a slope contribute their parameters unchanged.
fn trend(sources: &[&ParamSource], param_count: usize, strength: f64) -> Vec<f64> {
    let projected: Vec<ParamSource> = sources
        .iter()
        .map(|s| {
            let mut p = (*s).clone();
            if let Some(slope) = &s.trend {
                for (v, d) in p.parameters.iter_mut().zip(slope) {
                    *v += d * strength;
                }
            }
            p
        })
        .collect();
    let refs: Vec<&ParamSource> = projected.iter().collect();
    weighted(&refs, param_count)
}

/// `sum(c^2) / sum(c)`, or 0 when every source has zero confidence.
fn blended_confidence(sources: &[&ParamSource]) -> f64 {
    let total: f64 = sources.iter().map(|s| s.confidence).sum();
    if total <= 0.0 {
        return 0.0;
    }
    sources.iter().map(|s| s.confidence * s.confidence).sum::<f64>() / total
}

fn ensemble_pick<R: Rng + ?Sized>(sources: &[&ParamSource], rng: &mut R) -> usize {
    let total: f64 = sources.iter().map(|s| s.confidence).sum();
    if !(total > 0.0) {
        return rng.gen_range(0..sources.len());
    }
    let mut spin = rng.gen::<f64>() * total;
    for (i, source) in sources.iter().enumerate() {
        spin -= source.confidence;
        if spin <= 0.0 && source.confidence > 0.0 {
            return i;
        }
    }
    sources
        .iter()
        .rposition(|s| s.confidence > 0.0)
        .unwrap_or(sources.len() - 1)
}

/// Sources for `target` built from the contexts the matrix deems similar
/// enough, each with its confidence scaled by that similarity.
pub fn transfer_sources(
    system: &ContextSystem,
    target: &str,
    matrix: &SimilarityMatrix,
    min_similarity: f64,
) -> Vec<ParamSource> {
    matrix
        .transferable(target, min_similarity)
        .into_iter()
        .filter_map(|(id, similarity)| {
            let stats = system.get_stats_key(id)?;
            if stats.total_experiences == 0 {
                return None;
            }
            Some(ParamSource {
                parameters: stats.means(),
                confidence: (stats.confidence * similarity).clamp(0.0, 1.0),
                fitness: stats.best_fitness,
                timestamp: stats.last_update.unwrap_or_else(Utc::now),
                context_id: Some(id.to_string()),
                trend: None,
            })
        })
        .collect()
}
