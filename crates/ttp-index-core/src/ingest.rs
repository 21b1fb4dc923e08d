// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Detection Ingestor
// ─────────────────────────────────────────────────────────────────────
//! Turns raw classifier output into validated `PatternDetection`s.
//!
//! Nothing is corrected silently: every dropped, clamped, merged or
//! renamed record leaves an `IngestWarning`. Ingestion is a pure function
//! of (registry, document, raw detections), so re-ingesting the same
//! input yields the same detections and the same warnings.

use std::collections::HashMap;

use serde_json::Value;

use ttp_index_types::score::clamp_score;
use ttp_index_types::{
    Document, IndexError, IndexResult, IngestWarning, PatternDetection, RawDetection, WarningKind,
};

use crate::taxonomy::TaxonomyRegistry;

/// Validated detections plus the anomalies found on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingested {
    pub detections: Vec<PatternDetection>,
    pub warnings: Vec<IngestWarning>,
}

pub struct DetectionIngestor<'a> {
    registry: &'a TaxonomyRegistry,
}

impl<'a> DetectionIngestor<'a> {
    pub fn new(registry: &'a TaxonomyRegistry) -> Self {
        Self { registry }
    }

    /// Validate a document's raw detections.
    ///
    /// Fails only for a document with zero sentences; every per-record
    /// problem becomes a warning.
    pub fn ingest(&self, document: &Document, raw: &[RawDetection]) -> IndexResult<Ingested> {
        if document.is_empty() {
            return Err(IndexError::EmptyDocument);
        }

        let mut out = Ingested::default();
        let mut slots: HashMap<(usize, String), usize> = HashMap::new();

        for (position, record) in raw.iter().enumerate() {
            let Some(sentence) = usize::try_from(record.sentence_index)
                .ok()
                .and_then(|i| document.sentence(i))
            else {
                log::warn!(
                    "Dropping '{}': out-of-range sentence index {} (document has {})",
                    record.label,
                    record.sentence_index,
                    document.len()
                );
                out.warnings.push(IngestWarning::for_record(
                    WarningKind::OutOfRangeSentence,
                    position,
                    record,
                    format!(
                        "out-of-range sentence index {} (document has {} sentences); detection dropped",
                        record.sentence_index,
                        document.len()
                    ),
                ));
                continue;
            };

            let Some(label) = self.resolve_label(position, record, &mut out.warnings) else {
                continue;
            };

            if record.confidence.is_nan() {
                log::warn!("Dropping '{label}' on sentence {}: NaN confidence", sentence.index);
                out.warnings.push(IngestWarning::for_record(
                    WarningKind::NonFiniteConfidence,
                    position,
                    record,
                    "non-finite confidence; detection dropped",
                ));
                continue;
            }
            let confidence = clamp_score(record.confidence, 0.0, 1.0);
            if confidence != record.confidence {
                out.warnings.push(IngestWarning::for_record(
                    WarningKind::ConfidenceClamped,
                    position,
                    record,
                    format!(
                        "confidence {} outside [0, 1]; clamped to {confidence}",
                        record.confidence
                    ),
                ));
            }

            let span = match record.span {
                Some(span) if sentence.span.contains(&span) && span.is_valid_in(document.text()) => {
                    Some(span)
                }
                Some(span) => {
                    out.warnings.push(IngestWarning::for_record(
                        WarningKind::SpanDiscarded,
                        position,
                        record,
                        format!(
                            "mention span {}..{} outside sentence {}..{}; span discarded",
                            span.start, span.end, sentence.span.start, sentence.span.end
                        ),
                    ));
                    None
                }
                None => None,
            };

            let key = (sentence.index, label.to_string());
            if let Some(&slot) = slots.get(&key) {
                let existing = &mut out.detections[slot];
                out.warnings.push(IngestWarning::for_record(
                    WarningKind::DuplicateDetection,
                    position,
                    record,
                    format!(
                        "duplicate of '{}' on sentence {}; merged keeping the higher confidence",
                        existing.label, existing.sentence_index
                    ),
                ));
                if confidence > existing.confidence {
                    existing.confidence = confidence;
                    if span.is_some() {
                        existing.span = span;
                    }
                }
                continue;
            }

            slots.insert(key, out.detections.len());
            out.detections.push(PatternDetection {
                sentence_index: sentence.index,
                label: label.to_string(),
                confidence,
                span,
            });
        }

        log::debug!(
            "Ingested {} of {} raw detections ({} warnings)",
            out.detections.len(),
            raw.len(),
            out.warnings.len()
        );
        Ok(out)
    }

    fn resolve_label(
        &self,
        position: usize,
        record: &RawDetection,
        warnings: &mut Vec<IngestWarning>,
    ) -> Option<&'a str> {
        let registry: &'a TaxonomyRegistry = self.registry;
        if let Some(label) = registry.resolve(&record.label) {
            return Some(label);
        }
        match registry.canonical_label(&record.label) {
            Some(label) => {
                warnings.push(IngestWarning::for_record(
                    WarningKind::LabelNormalized,
                    position,
                    record,
                    format!("label '{}' normalised to '{label}'", record.label),
                ));
                Some(label)
            }
            None => {
                log::warn!("Dropping unknown label '{}'", record.label);
                warnings.push(IngestWarning::for_record(
                    WarningKind::UnknownLabel,
                    position,
                    record,
                    format!("unknown label '{}'; detection dropped", record.label),
                ));
                None
            }
        }
    }
}

/// Extract raw detections from a classifier's textual response.
///
/// Accepts a JSON array of detections or an object with a `detections`
/// array. The payload may sit in a fenced ```json block or be surrounded
/// by prose; the outermost `{…}` / `[…]` is used in that case. A payload
/// that fails to parse gets one repair pass for truncated output before
/// it is rejected.
pub fn parse_raw_detections(response: &str) -> IndexResult<Vec<RawDetection>> {
    let payload = extract_json_payload(response).ok_or_else(|| {
        IndexError::Validation("classifier response contains no JSON payload".to_string())
    })?;

    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => match serde_json::from_str(&repair_truncated_json(payload)) {
            Ok(value) => {
                log::warn!("Classifier response was malformed JSON, parsed after repair: {e}");
                value
            }
            Err(_) => {
                return Err(IndexError::Validation(format!(
                    "classifier response is not valid JSON: {e}"
                )))
            }
        },
    };

    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map.remove("detections").ok_or_else(|| {
            IndexError::Validation("classifier response object has no 'detections' field".into())
        })?,
        other => {
            return Err(IndexError::Validation(format!(
                "classifier response must be an array or object, got {other}"
            )))
        }
    };

    serde_json::from_value(list)
        .map_err(|e| IndexError::Validation(format!("malformed detection record: {e}")))
}

fn extract_json_payload(response: &str) -> Option<&str> {
    if let Some(fence) = response.find("```json") {
        let body = &response[fence + "```json".len()..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }

    let open = response.find(['{', '['])?;
    let closer = if response[open..].starts_with('{') { '}' } else { ']' };
    match response.rfind(closer) {
        Some(close) if close > open => Some(&response[open..=close]),
        // Cut off before its closer; left for the repair pass.
        _ => Some(response[open..].trim_end()),
    }
}

/// Best-effort completion of JSON cut off mid-stream.
///
/// Drops commas before a closer or at the end, terminates an open
/// string, then closes every `[` and `{` left open outside strings.
fn repair_truncated_json(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len() + 8);
    let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in payload.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                drop_trailing_comma(&mut out);
                if open.last() == Some(&c) {
                    open.pop();
                }
            }
            _ => {}
        }
        out.push(c);
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    drop_trailing_comma(&mut out);
    while let Some(closer) = open.pop() {
        out.push(closer);
    }
    out
}

fn drop_trailing_comma(out: &mut String) {
    out.truncate(out.trim_end().len());
    if out.ends_with(',') {
        out.pop();
    }
}
