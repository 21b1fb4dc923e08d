// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Core Engine
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Aggregation, scoring, and explanation engine that turns sentence-level
//! propaganda pattern detections into bounded 0–5 document indices with
//! verbatim supporting evidence.
//!
//! # Invariants
//!
//! 1. **Bounded scores**: every dimension value lies in [0, 5] whatever
//!    the detection volume. All scorers finish through `finalize_score`,
//!    which clamps before rounding and maps NaN to 0.
//!
//! 2. **Exact zero**: a dimension with no contributing detections scores
//!    exactly 0 and carries an empty evidence list.
//!
//! 3. **Determinism**: aggregation, scoring, and evidence selection fold
//!    over ordered maps with total orderings on floats, so identical
//!    inputs give bit-identical reports.
//!
//! 4. **Evidence fidelity**: quotes are slices of the document text.
//!    Truncation is always marked with `…`, and every explanation passes
//!    `check_evidence` before it enters a report.
//!
//! 5. **Monotonicity**: with the default scorer, adding a detection or
//!    raising a confidence never lowers a dimension score.

pub mod batch;
pub mod classifier;
pub mod evidence;
pub mod explain;
pub mod features;
pub mod ingest;
pub mod pipeline;
pub mod scorer;
pub mod taxonomy;

pub use batch::{BatchAnalyzer, BatchItem, BatchOutcome, BatchProgress, BatchResult};
pub use classifier::{ExternalClassifier, KeywordClassifier, PatternClassifier};
pub use evidence::EvidenceSelector;
pub use explain::{
    check_evidence, check_grounding, check_summary, ExplanationComposer, ExplanationDraft,
    SummaryWriter, TemplateSummary,
};
pub use features::FeatureAggregator;
pub use ingest::{parse_raw_detections, DetectionIngestor, Ingested};
pub use pipeline::{CancellationToken, IndexPipeline};
pub use scorer::{
    build_scorer, saturation, ExternalScorer, IndexScorer, LinearModelScorer, SaturatingScorer,
    ScoringPolicy,
};
pub use taxonomy::{Dimension, TaxonomyRegistry, TaxonomyTable};
