// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Detection Records and Ingestion Warnings
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::document::TextSpan;

/// One classifier hit before validation.
///
/// The sentence index is signed so that a misbehaving classifier's
/// negative indices survive deserialisation and can be reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(alias = "sentence")]
    pub sentence_index: i64,
    #[serde(alias = "technique", alias = "pattern")]
    pub label: String,
    #[serde(alias = "score")]
    pub confidence: f64,
    /// Document byte offsets of the mention, if the classifier reports one.
    #[serde(default)]
    pub span: Option<TextSpan>,
}

impl RawDetection {
    pub fn new(sentence_index: i64, label: impl Into<String>, confidence: f64) -> Self {
        Self {
            sentence_index,
            label: label.into(),
            confidence,
            span: None,
        }
    }

    pub fn with_span(mut self, span: TextSpan) -> Self {
        self.span = Some(span);
        self
    }
}

/// A validated detection: registry label, in-range sentence, confidence in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDetection {
    pub sentence_index: usize,
    pub label: String,
    pub confidence: f64,
    pub span: Option<TextSpan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Label absent from the registry; detection dropped.
    UnknownLabel,
    /// Label matched only after canonicalisation; detection kept.
    LabelNormalized,
    /// Confidence outside [0, 1]; clamped.
    ConfidenceClamped,
    /// Confidence was NaN; detection dropped.
    NonFiniteConfidence,
    /// Sentence index outside the document; detection dropped.
    OutOfRangeSentence,
    /// Same (sentence, label) seen again; merged into the first.
    DuplicateDetection,
    /// Mention span outside its sentence; span discarded.
    SpanDiscarded,
    /// Custom summary referenced material absent from the evidence; replaced.
    SummaryRejected,
}

/// A corrected input anomaly, surfaced in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestWarning {
    pub kind: WarningKind,
    /// Position of the offending record in the raw classifier output.
    pub position: Option<usize>,
    pub sentence_index: Option<i64>,
    pub label: Option<String>,
    pub message: String,
}

impl IngestWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            position: None,
            sentence_index: None,
            label: None,
            message: message.into(),
        }
    }

    /// Warning tied to one raw detection record.
    pub fn for_record(
        kind: WarningKind,
        position: usize,
        raw: &RawDetection,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            position: Some(position),
            sentence_index: Some(raw.sentence_index),
            label: Some(raw.label.clone()),
            message: message.into(),
        }
    }
}
