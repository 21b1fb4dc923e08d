// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Explanation Composer
// ─────────────────────────────────────────────────────────────────────
//! Turns a score, its features, and its evidence into an `Explanation`.
//!
//! The summary is the only free text in a report. Whatever writes it
//! sees only the structured draft. The built-in template renders draft
//! values only; a custom writer's output is checked before it is
//! accepted, and a summary naming a pattern outside the ranked list is
//! replaced by the template rendering.

use ttp_index_types::{
    Document, EvidenceSentence, Explanation, FeatureVector, IndexError, IndexResult, IndexScore,
    IngestWarning, RankedLabel, WarningKind,
};

use crate::taxonomy::TaxonomyRegistry;

/// Fixed vocabulary of `TemplateSummary`.
const TEMPLATE_WORDS: [&str; 13] = [
    "of", "no", "contributing", "patterns", "were", "detected", "top", "sentence", "sentences",
    "max", "confidence", "evidence", "and",
];

/// Structured values a summary may draw on.
#[derive(Debug, Clone, Copy)]
pub struct ExplanationDraft<'a> {
    pub dimension: &'a str,
    pub dimension_name: &'a str,
    pub score: f64,
    pub ranked_labels: &'a [RankedLabel],
    pub evidence: &'a [EvidenceSentence],
}

/// Renders the summary sentence of an explanation.
pub trait SummaryWriter: Send + Sync {
    fn write(&self, draft: &ExplanationDraft<'_>) -> String;
}

/// Deterministic summary built only from draft values.
#[derive(Debug, Clone)]
pub struct TemplateSummary {
    pub max_labels: usize,
}

impl Default for TemplateSummary {
    fn default() -> Self {
        Self { max_labels: 3 }
    }
}

impl SummaryWriter for TemplateSummary {
    fn write(&self, draft: &ExplanationDraft<'_>) -> String {
        let mut out = format!("{}: {:.1} of 5.", draft.dimension_name, draft.score);
        if draft.ranked_labels.is_empty() {
            out.push_str(" No contributing patterns were detected.");
            return out;
        }

        out.push_str(" Top patterns: ");
        let shown = draft.ranked_labels.iter().take(self.max_labels.max(1));
        for (i, label) in shown.enumerate() {
            if i > 0 {
                out.push_str("; ");
            }
            let noun = if label.count == 1 { "sentence" } else { "sentences" };
            out.push_str(&format!(
                "{} ({} {noun}, max confidence {:.2})",
                label.display_name, label.count, label.max_confidence
            ));
        }
        out.push('.');

        if !draft.evidence.is_empty() {
            let indices: Vec<String> = draft
                .evidence
                .iter()
                .map(|e| e.sentence_index.to_string())
                .collect();
            let plural = if indices.len() == 1 { "" } else { "s" };
            out.push_str(&format!(" Evidence: sentence{plural} {}.", indices.join(", ")));
        }
        out
    }
}

pub struct ExplanationComposer<'a> {
    registry: &'a TaxonomyRegistry,
    template: TemplateSummary,
    writer: Option<&'a dyn SummaryWriter>,
}

impl<'a> ExplanationComposer<'a> {
    pub fn new(registry: &'a TaxonomyRegistry, max_labels: usize) -> Self {
        Self {
            registry,
            template: TemplateSummary { max_labels },
            writer: None,
        }
    }

    /// Use a custom writer; its output is still checked.
    pub fn with_writer(mut self, writer: &'a dyn SummaryWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Single-pass transform of upstream results into an explanation.
    ///
    /// A rejected custom summary is replaced and recorded in `warnings`.
    pub fn compose(
        &self,
        score: &IndexScore,
        features: &FeatureVector,
        evidence: Vec<EvidenceSentence>,
        warnings: &mut Vec<IngestWarning>,
    ) -> Explanation {
        let dimension_name = self
            .registry
            .dimension(&features.dimension)
            .map_or(features.dimension.as_str(), |d| d.display_name.as_str());

        let mut ranked_labels: Vec<RankedLabel> = features
            .detected()
            .map(|(label, f)| RankedLabel {
                label: label.to_string(),
                display_name: self.registry.display_name(label).to_string(),
                count: f.count,
                frequency: f.frequency,
                max_confidence: f.max_confidence,
                mean_confidence: f.mean_confidence,
                contribution: score
                    .contributions
                    .iter()
                    .find(|c| c.label == label)
                    .map_or(0.0, |c| c.contribution),
            })
            .collect();
        ranked_labels.sort_by(|a, b| {
            b.contribution
                .total_cmp(&a.contribution)
                .then_with(|| a.label.cmp(&b.label))
        });

        let draft = ExplanationDraft {
            dimension: &features.dimension,
            dimension_name,
            score: score.value,
            ranked_labels: &ranked_labels,
            evidence: &evidence,
        };
        let summary = match self.writer {
            None => self.template.write(&draft),
            Some(writer) => {
                let candidate = writer.write(&draft);
                match unbound_label(&candidate, dimension_name, &ranked_labels, self.registry) {
                    None => candidate,
                    Some(stray) => {
                        log::warn!(
                            "Summary for '{}' names '{stray}' outside its evidence, using template",
                            features.dimension
                        );
                        warnings.push(IngestWarning::new(
                            WarningKind::SummaryRejected,
                            format!(
                                "summary for '{}' referenced '{stray}' which is not among its ranked labels",
                                features.dimension
                            ),
                        ));
                        self.template.write(&draft)
                    }
                }
            }
        };

        Explanation {
            dimension: features.dimension.clone(),
            dimension_name: dimension_name.to_string(),
            score: score.value,
            ranked_labels,
            evidence,
            summary,
        }
    }
}

/// Lowercase alphanumeric words; `_`, punctuation and spaces all split.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Start of every run of `residue` equal to `name`; blanked words never match.
fn occurrences(residue: &[Option<String>], name: &[String]) -> Vec<usize> {
    if name.is_empty() || name.len() > residue.len() {
        return Vec::new();
    }
    (0..=residue.len() - name.len())
        .filter(|&i| {
            residue[i..i + name.len()]
                .iter()
                .zip(name)
                .all(|(w, n)| w.as_deref() == Some(n.as_str()))
        })
        .collect()
}

/// First registry label whose identifier or display name `summary`
/// mentions as whole words, once the dimension name and the ranked labels
/// are blanked out.
///
/// Blanked words leave a gap, so removing one name never joins its
/// neighbours into another. Names made only of template words are never
/// reported.
fn unbound_label(
    summary: &str,
    dimension_name: &str,
    ranked: &[RankedLabel],
    registry: &TaxonomyRegistry,
) -> Option<String> {
    let mut allowed: Vec<Vec<String>> = std::iter::once(dimension_name)
        .chain(ranked.iter().flat_map(|r| [r.label.as_str(), r.display_name.as_str()]))
        .map(words)
        .collect();
    allowed.sort_by_key(|name| std::cmp::Reverse(name.len()));

    let mut residue: Vec<Option<String>> = words(summary).into_iter().map(Some).collect();
    for name in &allowed {
        for start in occurrences(&residue, name) {
            for slot in &mut residue[start..start + name.len()] {
                *slot = None;
            }
        }
    }

    registry.labels().find_map(|(label, display)| {
        let hit = [label, display].into_iter().map(words).any(|name| {
            !name.iter().all(|w| TEMPLATE_WORDS.contains(&w.as_str()))
                && !occurrences(&residue, &name).is_empty()
        });
        hit.then(|| label.to_string())
    })
}

/// Verify an explanation's quotes against its source document.
///
/// Every quote must be the literal sentence text (or a prefix of it when
/// truncated) and every evidence sentence must carry a ranked label.
pub fn check_evidence(explanation: &Explanation, document: &Document) -> IndexResult<()> {
    for e in &explanation.evidence {
        let Some(sentence) = document.sentence_text(e.sentence_index) else {
            return Err(IndexError::Validation(format!(
                "evidence for '{}' cites missing sentence {}",
                explanation.dimension, e.sentence_index
            )));
        };
        let quote = e.verbatim();
        let faithful = if e.truncated {
            sentence.starts_with(quote) && quote.len() < sentence.len()
        } else {
            quote == sentence
        };
        if !faithful {
            return Err(IndexError::Validation(format!(
                "evidence for '{}' sentence {} is not verbatim source text",
                explanation.dimension, e.sentence_index
            )));
        }
        if e.labels.is_empty() {
            return Err(IndexError::Validation(format!(
                "evidence for '{}' sentence {} has no supporting label",
                explanation.dimension, e.sentence_index
            )));
        }
        if let Some(stray) = e
            .labels
            .iter()
            .find(|l| !explanation.ranked_labels.iter().any(|r| &r.label == *l))
        {
            return Err(IndexError::Validation(format!(
                "evidence for '{}' sentence {} cites unranked label '{stray}'",
                explanation.dimension, e.sentence_index
            )));
        }
    }
    Ok(())
}

/// Verify that the summary names no pattern outside the ranked list.
pub fn check_summary(explanation: &Explanation, registry: &TaxonomyRegistry) -> IndexResult<()> {
    match unbound_label(
        &explanation.summary,
        &explanation.dimension_name,
        &explanation.ranked_labels,
        registry,
    ) {
        None => Ok(()),
        Some(stray) => Err(IndexError::Validation(format!(
            "summary for '{}' names unranked pattern '{stray}'",
            explanation.dimension
        ))),
    }
}

/// Verify an explanation against its source document: quotes via
/// [`check_evidence`], summary via [`check_summary`].
pub fn check_grounding(
    explanation: &Explanation,
    document: &Document,
    registry: &TaxonomyRegistry,
) -> IndexResult<()> {
    check_evidence(explanation, document)?;
    check_summary(explanation, registry)
}
