// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Pattern Classifier Interface
// ─────────────────────────────────────────────────────────────────────
//! Sentence-level pattern classifier trait and a cue-phrase fallback.
//!
//! In production the classifier is a model served out of process and is
//! plugged in through `ExternalClassifier`. `KeywordClassifier` gives
//! deterministic detections for tests, benchmarks, and offline runs.

use ttp_index_types::{Document, IndexResult, RawDetection, TextSpan};

/// Source of raw sentence-level detections.
///
/// Output is unvalidated: indices, labels, and confidences are checked by
/// the ingestor. A missing label for a sentence means "not detected".
pub trait PatternClassifier: Send + Sync {
    fn classify(&self, document: &Document) -> IndexResult<Vec<RawDetection>>;
}

#[derive(Debug, Clone, PartialEq)]
struct Cue {
    label: String,
    phrase: String,
    confidence: f64,
}

/// Case-insensitive cue-phrase matcher.
///
/// A sentence containing a cue yields one detection for the cue's label,
/// with the best confidence among that label's matching cues.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    cues: Vec<Cue>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cue(mut self, label: &str, phrase: &str, confidence: f64) -> Self {
        self.cues.push(Cue {
            label: label.to_string(),
            phrase: phrase.to_lowercase(),
            confidence,
        });
        self
    }

    /// Cues for every label of the built-in taxonomy.
    pub fn builtin() -> Self {
        BUILTIN_CUES
            .iter()
            .fold(Self::new(), |c, (label, phrase, conf)| c.with_cue(label, phrase, *conf))
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}

impl PatternClassifier for KeywordClassifier {
    fn classify(&self, document: &Document) -> IndexResult<Vec<RawDetection>> {
        let mut out = Vec::new();
        for sentence in document.sentences() {
            let Some(text) = document.sentence_text(sentence.index) else {
                continue;
            };
            let lower = text.to_lowercase();
            // Offsets only carry over when lowercasing kept the byte layout.
            let same_layout = lower.len() == text.len();
            let first = out.len();

            for cue in &self.cues {
                let Some(pos) = lower.find(&cue.phrase) else {
                    continue;
                };
                let span = same_layout
                    .then(|| {
                        TextSpan::new(
                            sentence.span.start + pos,
                            sentence.span.start + pos + cue.phrase.len(),
                        )
                    })
                    .filter(|s| s.is_valid_in(document.text()));

                let existing = out[first..]
                    .iter_mut()
                    .find(|d: &&mut RawDetection| d.label == cue.label);
                match existing {
                    Some(d) if d.confidence < cue.confidence => {
                        d.confidence = cue.confidence;
                        d.span = span;
                    }
                    Some(_) => {}
                    None => out.push(RawDetection {
                        sentence_index: sentence.index as i64,
                        label: cue.label.clone(),
                        confidence: cue.confidence,
                        span,
                    }),
                }
            }
        }
        Ok(out)
    }
}

type ClassifyFn = Box<dyn Fn(&Document) -> IndexResult<Vec<RawDetection>> + Send + Sync>;

/// Classifier that calls a caller-supplied function.
///
/// Used to delegate to a model server while keeping the rest of the
/// pipeline in Rust.
pub struct ExternalClassifier {
    classify_fn: ClassifyFn,
}

impl ExternalClassifier {
    pub fn new(
        classify_fn: impl Fn(&Document) -> IndexResult<Vec<RawDetection>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            classify_fn: Box::new(classify_fn),
        }
    }
}

impl PatternClassifier for ExternalClassifier {
    fn classify(&self, document: &Document) -> IndexResult<Vec<RawDetection>> {
        (self.classify_fn)(document)
    }
}

#[rustfmt::skip]
const BUILTIN_CUES: [(&str, &str, f64); 42] = [
    ("ENCIRCLEMENT_NARRATIVE", "surrounded by nato", 0.8),
    ("ENCIRCLEMENT_NARRATIVE", "encircle", 0.7),
    ("NATO_EXPANSION_EXISTENTIAL_THREAT", "nato expansion", 0.7),
    ("NATO_EXPANSION_EXISTENTIAL_THREAT", "existential threat", 0.8),
    ("WESTERN_HYPOCRISY_FRAMING", "western hypocrisy", 0.85),
    ("WESTERN_HYPOCRISY_FRAMING", "double standard", 0.7),
    ("BOTH_SIDES_FALSE_EQUIVALENCY", "both sides", 0.6),
    ("BOTH_SIDES_FALSE_EQUIVALENCY", "no one is innocent", 0.65),
    ("US_DECLINE_DEGENERACY", "decadent west", 0.8),
    ("US_DECLINE_DEGENERACY", "america is in decline", 0.75),
    ("TRADITIONAL_VALUES_DEFENSE", "traditional values", 0.75),
    ("TRADITIONAL_VALUES_DEFENSE", "family values", 0.6),
    ("MULTIPOLAR_WORLD_ORDER", "multipolar", 0.8),
    ("MULTIPOLAR_WORLD_ORDER", "unipolar", 0.6),
    ("ILLEGITIMATE_SECURITY_CONCERNS", "legitimate security concerns", 0.85),
    ("ILLEGITIMATE_SECURITY_CONCERNS", "security guarantees", 0.6),
    ("HISTORICAL_GRIEVANCES", "historical injustice", 0.7),
    ("HISTORICAL_GRIEVANCES", "humiliated", 0.6),
    ("WHATABOUTISM", "what about", 0.7),
    ("WHATABOUTISM", "and yet the us", 0.65),
    ("UKRAINE_CORRUPTION_NARRATIVE", "corrupt kyiv", 0.8),
    ("UKRAINE_CORRUPTION_NARRATIVE", "ukrainian corruption", 0.75),
    ("SANCTIONS_COUNTER_NARRATIVE", "sanctions backfire", 0.8),
    ("SANCTIONS_COUNTER_NARRATIVE", "sanctions hurt europe", 0.75),
    ("FALSE_EQUIVALENCY", "just as bad", 0.7),
    ("FALSE_EQUIVALENCY", "no different from", 0.6),
    ("EMOTIONAL_MANIPULATION", "think of the children", 0.8),
    ("EMOTIONAL_MANIPULATION", "outrageous", 0.5),
    ("HISTORICAL_REVISIONISM", "never really existed", 0.8),
    ("HISTORICAL_REVISIONISM", "artificial state", 0.75),
    ("VICTIM_BLAMING", "brought it on themselves", 0.85),
    ("VICTIM_BLAMING", "provoked", 0.6),
    ("DEFLECTION", "the real question is", 0.65),
    ("DEFLECTION", "instead we should ask", 0.6),
    ("FUNDING_COVERT", "undisclosed funding", 0.9),
    ("FUNDING_COVERT", "paid through intermediaries", 0.85),
    ("FUNDING_STATE_MEDIA", "rt contract", 0.8),
    ("FUNDING_STATE_MEDIA", "state media fee", 0.75),
    ("CULTIVATION_INTELLECTUAL", "think tank", 0.6),
    ("CULTIVATION_INTELLECTUAL", "academic fellowship", 0.7),
    ("CULTIVATION_INFLUENCER", "sponsored influencer", 0.75),
    ("CULTIVATION_INFLUENCER", "paid posts", 0.7),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::TaxonomyRegistry;
    use ttp_index_types::IndexError;

    #[test]
    fn test_builtin_cues_cover_taxonomy() {
        let registry = TaxonomyRegistry::builtin().unwrap();
        let classifier = KeywordClassifier::builtin();
        assert_eq!(classifier.len(), BUILTIN_CUES.len());
        for (label, _) in registry.labels() {
            assert!(
                BUILTIN_CUES.iter().any(|(l, _, _)| *l == label),
                "no cue for {label}"
            );
        }
        for (label, _, _) in BUILTIN_CUES {
            assert!(registry.contains(label), "cue for unknown {label}");
        }
    }

    #[test]
    fn test_keyword_detection_and_span() {
        let doc = Document::segment("Nothing here. They received Undisclosed Funding from abroad.");
        let detections = KeywordClassifier::builtin().classify(&doc).unwrap();
        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.sentence_index, 1);
        assert_eq!(d.label, "FUNDING_COVERT");
        assert!((d.confidence - 0.9).abs() < 1e-12);
        let span = d.span.unwrap();
        assert_eq!(&doc.text()[span.start..span.end], "Undisclosed Funding");
    }

    #[test]
    fn test_best_cue_per_label() {
        let doc = Document::segment("An outrageous plan: think of the children!");
        let detections = KeywordClassifier::builtin().classify(&doc).unwrap();
        assert_eq!(detections.len(), 1);
        assert!((detections[0].confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_custom_cue() {
        let classifier = KeywordClassifier::new().with_cue("DEFLECTION", "Look Over There", 0.4);
        let doc = Document::segment("Well, look over there.");
        let detections = classifier.classify(&doc).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "DEFLECTION");
    }

    #[test]
    fn test_external_classifier() {
        let classifier = ExternalClassifier::new(|doc| {
            Ok(vec![RawDetection::new(doc.len() as i64 - 1, "WHATABOUTISM", 0.5)])
        });
        let doc = Document::segment("One. Two.");
        assert_eq!(classifier.classify(&doc).unwrap()[0].sentence_index, 1);

        let failing = ExternalClassifier::new(|_| Err(IndexError::Classifier("offline".into())));
        assert!(failing.classify(&doc).unwrap_err().is_retryable());
    }
}
