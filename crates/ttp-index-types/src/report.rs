// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Features, Explanations and Reports
// ─────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::detection::IngestWarning;
use crate::error::{IndexError, IndexResult};
use crate::score::IndexScore;

/// Per-label document statistics within one dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelFeatures {
    /// Distinct sentences carrying the label.
    pub count: u32,
    /// `count / total_sentences`.
    pub frequency: f64,
    pub max_confidence: f64,
    pub mean_confidence: f64,
    /// Registry weight of the label in this dimension.
    pub weight: f64,
}

/// Sentence-local co-occurrence of a configured label pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairFeature {
    pub left: String,
    pub right: String,
    /// Sentences in which both labels were detected.
    pub co_occurrence: u32,
}

/// Fixed-shape summary of one document on one dimension.
///
/// Every contributing label of the dimension is present, detected or not,
/// so vectors of different documents line up for a learned scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub dimension: String,
    pub total_sentences: usize,
    pub labels: BTreeMap<String, LabelFeatures>,
    pub pairs: Vec<PairFeature>,
}

impl FeatureVector {
    /// Total detections across contributing labels.
    pub fn detection_count(&self) -> u32 {
        self.labels.values().map(|f| f.count).sum()
    }

    pub fn has_detections(&self) -> bool {
        self.labels.values().any(|f| f.count > 0)
    }

    /// Labels with at least one detection.
    pub fn detected(&self) -> impl Iterator<Item = (&str, &LabelFeatures)> {
        self.labels
            .iter()
            .filter(|(_, f)| f.count > 0)
            .map(|(l, f)| (l.as_str(), f))
    }
}

/// A verbatim source sentence supporting a dimension score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSentence {
    pub sentence_index: usize,
    /// Exact document text of the sentence; ends with `…` only if truncated.
    pub quote: String,
    pub truncated: bool,
    /// Qualifying labels detected on this sentence, best first.
    pub labels: Vec<String>,
    /// Best `confidence × weight` among those labels.
    pub rank_score: f64,
}

impl EvidenceSentence {
    /// The quote without its truncation marker.
    pub fn verbatim(&self) -> &str {
        if self.truncated {
            self.quote.strip_suffix('…').unwrap_or(&self.quote)
        } else {
            &self.quote
        }
    }
}

/// A contributing label as presented in an explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLabel {
    pub label: String,
    pub display_name: String,
    pub count: u32,
    pub frequency: f64,
    pub max_confidence: f64,
    pub mean_confidence: f64,
    pub contribution: f64,
}

/// Evidence-bound justification of one dimension score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub dimension: String,
    pub dimension_name: String,
    pub score: f64,
    pub ranked_labels: Vec<RankedLabel>,
    pub evidence: Vec<EvidenceSentence>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionReport {
    pub score: IndexScore,
    pub features: FeatureVector,
    pub explanation: Explanation,
}

/// Final, immutable result of analysing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub taxonomy_version: String,
    /// Name of the scoring strategy that produced the values.
    pub scorer: String,
    /// Denominator of every `frequency` in the report.
    pub total_sentences: usize,
    pub dimensions: Vec<DimensionReport>,
    pub warnings: Vec<IngestWarning>,
}

impl Report {
    pub fn dimension(&self, key: &str) -> Option<&DimensionReport> {
        self.dimensions.iter().find(|d| d.score.dimension == key)
    }

    /// Dimension key → final value, in registry order.
    pub fn scores(&self) -> Vec<(&str, f64)> {
        self.dimensions
            .iter()
            .map(|d| (d.score.dimension.as_str(), d.score.value))
            .collect()
    }

    pub fn to_json(&self) -> IndexResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| IndexError::Numerical(format!("report serialisation failed: {e}")))
    }
}
