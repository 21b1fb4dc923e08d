// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Configuration
// ─────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};
use crate::score::MAX_INDEX_SCORE;

/// Rounding applied to a clamped dimension score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Integer,
    #[default]
    Half,
    Continuous,
}

/// Per-label coefficients of a learned linear scorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearTerm {
    #[serde(default)]
    pub frequency: f64,
    #[serde(default)]
    pub max_confidence: f64,
    #[serde(default)]
    pub mean_confidence: f64,
}

/// Coefficient on the co-occurrence count of one label pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairTerm {
    pub left: String,
    pub right: String,
    pub weight: f64,
}

/// Linear regressor for a single dimension, trained offline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub labels: BTreeMap<String, LinearTerm>,
    #[serde(default)]
    pub pairs: Vec<PairTerm>,
}

impl LinearModel {
    fn coefficients(&self) -> impl Iterator<Item = f64> + '_ {
        std::iter::once(self.intercept)
            .chain(self.labels.values().flat_map(|t| {
                [t.frequency, t.max_confidence, t.mean_confidence]
            }))
            .chain(self.pairs.iter().map(|p| p.weight))
    }
}

/// Which scoring strategy the pipeline builds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScorerKind {
    /// Weighted saturating sum (auditable default).
    #[default]
    Saturating,
    /// Learned linear models keyed by dimension.
    Linear { models: BTreeMap<String, LinearModel> },
}

/// Runtime configuration for the index kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Maximum evidence sentences per dimension.
    /// Default: 5.
    pub evidence_k: usize,

    /// Truncate quotes longer than this many characters (ellipsis marked).
    /// Default: None (quotes are never truncated).
    pub evidence_max_chars: Option<usize>,

    /// Rounding of the final 0–5 value.
    /// Default: half-integer.
    pub granularity: Granularity,

    /// λ in `f(freq, conf) = conf × (1 − e^{−λ·freq})`.
    /// Default: 8.0 (one hit in ten sentences reaches ~55% of its confidence).
    pub saturation_lambda: f64,

    /// Bonus per sentence in which a configured label pair co-occurs.
    /// Default: 0.25.
    pub co_occurrence_step: f64,

    /// Upper bound on the total co-occurrence bonus of one dimension.
    /// Default: 0.5.
    pub co_occurrence_cap: f64,

    /// Deadline for one classifier call.
    /// Default: 30 000 ms.
    pub classifier_deadline_ms: u64,

    /// Worker threads for batch analysis.
    /// Default: 4.
    pub max_workers: usize,

    /// Number of patterns named in a summary.
    /// Default: 3.
    pub summary_max_labels: usize,

    /// Scoring strategy.
    pub scorer: ScorerKind,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            evidence_k: 5,
            evidence_max_chars: None,
            granularity: Granularity::Half,
            saturation_lambda: 8.0,
            co_occurrence_step: 0.25,
            co_occurrence_cap: 0.5,
            classifier_deadline_ms: 30_000,
            max_workers: 4,
            summary_max_labels: 3,
            scorer: ScorerKind::Saturating,
        }
    }
}

impl IndexConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> IndexResult<()> {
        if self.evidence_k < 1 {
            return Err(IndexError::Config(format!(
                "evidence_k must be >= 1, got {}",
                self.evidence_k
            )));
        }
        if let Some(max_chars) = self.evidence_max_chars {
            if max_chars < 16 {
                return Err(IndexError::Config(format!(
                    "evidence_max_chars must be >= 16, got {max_chars}"
                )));
            }
        }
        if !self.saturation_lambda.is_finite() || self.saturation_lambda <= 0.0 {
            return Err(IndexError::Config(format!(
                "saturation_lambda must be finite and > 0, got {}",
                self.saturation_lambda
            )));
        }
        if !self.co_occurrence_step.is_finite() || self.co_occurrence_step < 0.0 {
            return Err(IndexError::Config(format!(
                "co_occurrence_step must be finite and >= 0, got {}",
                self.co_occurrence_step
            )));
        }
        if !(0.0..=MAX_INDEX_SCORE).contains(&self.co_occurrence_cap) {
            return Err(IndexError::Config(format!(
                "co_occurrence_cap must be in [0, {MAX_INDEX_SCORE}], got {}",
                self.co_occurrence_cap
            )));
        }
        if self.classifier_deadline_ms == 0 {
            return Err(IndexError::Config(
                "classifier_deadline_ms must be > 0".to_string(),
            ));
        }
        if self.max_workers < 1 {
            return Err(IndexError::Config(format!(
                "max_workers must be >= 1, got {}",
                self.max_workers
            )));
        }
        if self.summary_max_labels < 1 {
            return Err(IndexError::Config(format!(
                "summary_max_labels must be >= 1, got {}",
                self.summary_max_labels
            )));
        }
        if let ScorerKind::Linear { models } = &self.scorer {
            for (dimension, model) in models {
                if model.coefficients().any(|c| !c.is_finite()) {
                    return Err(IndexError::Config(format!(
                        "linear model for '{dimension}' has a non-finite coefficient"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Load from JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> IndexResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| IndexError::Config(format!("JSON parse error: {e}")))
    }
}
