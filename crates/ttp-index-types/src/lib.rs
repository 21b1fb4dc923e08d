// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Data model, configuration, and error hierarchy for the TTP index
//! kernel: the aggregation, scoring, and explanation stage that turns
//! sentence-level pattern detections into bounded 0–5 document indices.

pub mod config;
pub mod detection;
pub mod document;
pub mod error;
pub mod report;
pub mod score;

pub use config::{Granularity, IndexConfig, LinearModel, LinearTerm, PairTerm, ScorerKind};
pub use detection::{IngestWarning, PatternDetection, RawDetection, WarningKind};
pub use document::{Document, Sentence, TextSpan};
pub use error::{IndexError, IndexResult};
pub use report::{
    DimensionReport, EvidenceSentence, Explanation, FeatureVector, LabelFeatures, PairFeature,
    RankedLabel, Report,
};
pub use score::{clamp_score, finalize_score, IndexScore, LabelContribution, MAX_INDEX_SCORE};
