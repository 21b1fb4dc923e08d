// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Score Types
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::config::Granularity;

/// Upper bound of every dimension score.
pub const MAX_INDEX_SCORE: f64 = 5.0;

/// Clamp a value to [lo, hi], mapping NaN to lo and Inf to nearest bound.
#[inline]
pub fn clamp_score(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        log::warn!("clamp_score: NaN detected, clamping to {lo:.4}");
        return lo;
    }
    if value.is_infinite() {
        let boundary = if value > 0.0 { hi } else { lo };
        log::warn!("clamp_score: Inf detected, clamping to {boundary:.4}");
        return boundary;
    }
    value.clamp(lo, hi)
}

/// Round to the configured granularity. Monotone non-decreasing.
#[inline]
pub fn round_to_granularity(value: f64, granularity: Granularity) -> f64 {
    match granularity {
        Granularity::Integer => value.round(),
        Granularity::Half => (value * 2.0).round() / 2.0,
        Granularity::Continuous => value,
    }
}

/// Clamp a raw score into [0, 5] and round it.
///
/// Rounding happens after clamping, and both bounds are representable at
/// every granularity, so the result never leaves [0, 5].
#[inline]
pub fn finalize_score(raw: f64, granularity: Granularity) -> f64 {
    round_to_granularity(clamp_score(raw, 0.0, MAX_INDEX_SCORE), granularity)
}

/// How much one label contributed to a dimension score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelContribution {
    pub label: String,
    pub count: u32,
    pub max_confidence: f64,
    pub mean_confidence: f64,
    /// Registry weight of the label in this dimension.
    pub weight: f64,
    /// Additive share of the raw score attributed to this label.
    pub contribution: f64,
}

/// Score of one document on one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexScore {
    pub dimension: String,
    /// Final value in [0, 5], rounded to the configured granularity.
    pub value: f64,
    /// Unclamped, unrounded sum of label contributions.
    pub raw: f64,
    /// Bonus from sentence-local label pairs (already capped).
    pub co_occurrence_bonus: f64,
    /// Labels with at least one detection, in feature order.
    pub contributions: Vec<LabelContribution>,
}

impl IndexScore {
    /// Score of a dimension with no contributing detections.
    pub fn zero(dimension: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            value: 0.0,
            raw: 0.0,
            co_occurrence_bonus: 0.0,
            contributions: Vec::new(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0.0
    }
}
