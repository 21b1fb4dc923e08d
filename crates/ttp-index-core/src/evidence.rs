// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Evidence Selector
// ─────────────────────────────────────────────────────────────────────
//! Picks the literal source sentences that support a dimension score.
//!
//! Detections are ranked by `confidence × weight(label, dimension)`,
//! descending, with ties broken by sentence index and then label. The
//! top K distinct sentences are quoted straight from the document text.

use std::collections::BTreeMap;

use ttp_index_types::{Document, EvidenceSentence, PatternDetection};

use crate::taxonomy::TaxonomyRegistry;

const ELLIPSIS: char = '…';

pub struct EvidenceSelector<'a> {
    registry: &'a TaxonomyRegistry,
    k: usize,
    max_chars: Option<usize>,
}

impl<'a> EvidenceSelector<'a> {
    pub fn new(registry: &'a TaxonomyRegistry, k: usize, max_chars: Option<usize>) -> Self {
        Self {
            registry,
            k,
            max_chars,
        }
    }

    /// Up to K evidence sentences for `dimension`, best first.
    ///
    /// Returns an empty vector when no detection contributes to the
    /// dimension. Detections pointing outside the document are skipped.
    pub fn select(
        &self,
        document: &Document,
        detections: &[PatternDetection],
        dimension: &str,
    ) -> Vec<EvidenceSentence> {
        let mut ranked: Vec<(f64, usize, &str)> = detections
            .iter()
            .filter_map(|d| {
                self.registry
                    .weight(&d.label, dimension)
                    .map(|w| (d.confidence * w, d.sentence_index, d.label.as_str()))
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(b.2))
        });

        // Sentences in rank order, each collecting its labels best first.
        let mut order: Vec<usize> = Vec::new();
        let mut by_sentence: BTreeMap<usize, (f64, Vec<String>)> = BTreeMap::new();
        for (rank, sentence, label) in ranked {
            let entry = by_sentence.entry(sentence).or_insert_with(|| {
                order.push(sentence);
                (rank, Vec::new())
            });
            if !entry.1.iter().any(|l| l == label) {
                entry.1.push(label.to_string());
            }
        }

        let mut evidence = Vec::with_capacity(self.k.min(order.len()));
        for sentence in order {
            if evidence.len() == self.k {
                break;
            }
            let Some(text) = document.sentence_text(sentence) else {
                log::warn!("Evidence skipped sentence {sentence}: not in document");
                continue;
            };
            let Some((rank_score, labels)) = by_sentence.remove(&sentence) else {
                continue;
            };
            let (quote, truncated) = self.quote(text);
            evidence.push(EvidenceSentence {
                sentence_index: sentence,
                quote,
                truncated,
                labels,
                rank_score,
            });
        }
        evidence
    }

    /// Verbatim text, or a char-boundary prefix ending in `…` when over
    /// the limit. The marked quote never exceeds `max_chars` chars.
    fn quote(&self, text: &str) -> (String, bool) {
        let Some(limit) = self.max_chars else {
            return (text.to_string(), false);
        };
        if text.chars().count() <= limit {
            return (text.to_string(), false);
        }
        let keep = limit.saturating_sub(1);
        let cut = text
            .char_indices()
            .nth(keep)
            .map_or(text.len(), |(i, _)| i);
        let mut quote = text[..cut].to_string();
        quote.push(ELLIPSIS);
        (quote, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(sentence: usize, label: &str, confidence: f64) -> PatternDetection {
        PatternDetection {
            sentence_index: sentence,
            label: label.to_string(),
            confidence,
            span: None,
        }
    }

    fn ten_sentences() -> Document {
        let text = (0..10)
            .map(|i| format!("Sentence number {i} is here."))
            .collect::<Vec<_>>()
            .join(" ");
        Document::segment(text)
    }

    #[test]
    fn test_scenario_order() {
        let registry = TaxonomyRegistry::builtin().unwrap();
        let doc = ten_sentences();
        let detections = vec![
            det(3, "FUNDING_COVERT", 0.9),
            det(7, "FUNDING_COVERT", 0.4),
            det(7, "CULTIVATION_INTELLECTUAL", 0.6),
        ];
        let evidence =
            EvidenceSelector::new(&registry, 5, None).select(&doc, &detections, "financial_leverage");
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].sentence_index, 3);
        assert_eq!(evidence[1].sentence_index, 7);
        assert_eq!(evidence[0].quote, "Sentence number 3 is here.");
        // 0.4 × 2.5 = 1.0 beats 0.6 × 1.0
        assert_eq!(evidence[1].labels, vec!["FUNDING_COVERT", "CULTIVATION_INTELLECTUAL"]);
        assert!((evidence[1].rank_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_distinct_sentences_and_k() {
        let registry = TaxonomyRegistry::builtin().unwrap();
        let doc = ten_sentences();
        let detections = vec![
            det(1, "EMOTIONAL_MANIPULATION", 0.9),
            det(1, "VICTIM_BLAMING", 0.8),
            det(2, "VICTIM_BLAMING", 0.5),
            det(5, "TRADITIONAL_VALUES_DEFENSE", 0.3),
        ];
        let evidence =
            EvidenceSelector::new(&registry, 2, None).select(&doc, &detections, "effectiveness");
        let indices: Vec<usize> = evidence.iter().map(|e| e.sentence_index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(evidence[0].labels.len(), 2);
    }

    #[test]
    fn test_ties_break_on_sentence_index() {
        let registry = TaxonomyRegistry::builtin().unwrap();
        let doc = ten_sentences();
        let detections = vec![det(6, "DEFLECTION", 0.5), det(2, "DEFLECTION", 0.5)];
        let evidence =
            EvidenceSelector::new(&registry, 5, None).select(&doc, &detections, "sophistication");
        assert_eq!(evidence[0].sentence_index, 2);
        assert_eq!(evidence[1].sentence_index, 6);
    }

    #[test]
    fn test_zero_detections_empty() {
        let registry = TaxonomyRegistry::builtin().unwrap();
        let doc = ten_sentences();
        let selector = EvidenceSelector::new(&registry, 5, None);
        assert!(selector.select(&doc, &[], "sophistication").is_empty());
        let unrelated = vec![det(0, "FUNDING_COVERT", 1.0)];
        assert!(selector.select(&doc, &unrelated, "effectiveness").is_empty());
    }

    #[test]
    fn test_fidelity() {
        let registry = TaxonomyRegistry::builtin().unwrap();
        let doc = Document::segment("«Они» всегда лгут!  Who funds them?\nThe money is hidden.");
        let detections = vec![det(0, "DEFLECTION", 0.4), det(2, "FUNDING_COVERT", 0.8)];
        for dim in ["sophistication", "financial_leverage"] {
            for e in EvidenceSelector::new(&registry, 5, None).select(&doc, &detections, dim) {
                assert!(!e.truncated);
                assert!(doc.text().contains(&e.quote));
            }
        }
    }

    #[test]
    fn test_truncation_marker() {
        let registry = TaxonomyRegistry::builtin().unwrap();
        let doc = Document::segment("Ёжик ёжик ёжик ёжик ёжик ёжик ёжик ёжик.");
        let detections = vec![det(0, "DEFLECTION", 0.4)];
        let evidence =
            EvidenceSelector::new(&registry, 5, Some(16)).select(&doc, &detections, "sophistication");
        let e = &evidence[0];
        assert!(e.truncated);
        assert!(e.quote.ends_with('…'));
        assert_eq!(e.quote.chars().count(), 16);
        assert!(doc.text().starts_with(e.verbatim()));

        let short =
            EvidenceSelector::new(&registry, 5, Some(200)).select(&doc, &detections, "sophistication");
        assert!(!short[0].truncated);
        assert_eq!(short[0].quote, doc.text());
    }

    #[test]
    fn test_deterministic() {
        let registry = TaxonomyRegistry::builtin().unwrap();
        let doc = ten_sentences();
        let mut detections = vec![
            det(4, "WHATABOUTISM", 0.7),
            det(1, "ENCIRCLEMENT_NARRATIVE", 0.3),
            det(9, "WESTERN_HYPOCRISY_FRAMING", 0.56),
        ];
        let selector = EvidenceSelector::new(&registry, 3, None);
        let a = selector.select(&doc, &detections, "russian_alignment");
        detections.reverse();
        let b = selector.select(&doc, &detections, "russian_alignment");
        assert_eq!(a, b);
    }
}
