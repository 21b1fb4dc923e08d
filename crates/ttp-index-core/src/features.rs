// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Feature Aggregator
// ─────────────────────────────────────────────────────────────────────
//! Folds a document's detections into one fixed-shape `FeatureVector`
//! per dimension.
//!
//! The fold runs over ordered maps only, so identical detection sets give
//! bit-identical vectors regardless of input order. Co-occurrence is
//! counted per sentence, not per document.

use std::collections::{BTreeMap, BTreeSet};

use ttp_index_types::{
    FeatureVector, IndexError, IndexResult, LabelFeatures, PairFeature, PatternDetection,
};

use crate::taxonomy::TaxonomyRegistry;

pub struct FeatureAggregator<'a> {
    registry: &'a TaxonomyRegistry,
}

impl<'a> FeatureAggregator<'a> {
    pub fn new(registry: &'a TaxonomyRegistry) -> Self {
        Self { registry }
    }

    /// One vector per registry dimension, in registry order.
    pub fn aggregate(
        &self,
        detections: &[PatternDetection],
        total_sentences: usize,
    ) -> IndexResult<Vec<FeatureVector>> {
        if total_sentences == 0 {
            return Err(IndexError::EmptyDocument);
        }
        let hits = best_per_sentence(detections);
        Ok(self
            .registry
            .dimensions()
            .iter()
            .map(|d| self.fold_dimension(&d.key, &hits, total_sentences))
            .collect())
    }

    /// Vector for a single dimension.
    pub fn aggregate_dimension(
        &self,
        dimension: &str,
        detections: &[PatternDetection],
        total_sentences: usize,
    ) -> IndexResult<FeatureVector> {
        if total_sentences == 0 {
            return Err(IndexError::EmptyDocument);
        }
        if self.registry.dimension(dimension).is_none() {
            return Err(IndexError::Validation(format!(
                "unknown dimension '{dimension}'"
            )));
        }
        let hits = best_per_sentence(detections);
        Ok(self.fold_dimension(dimension, &hits, total_sentences))
    }

    fn fold_dimension(
        &self,
        dimension: &str,
        hits: &BTreeMap<(usize, &str), f64>,
        total_sentences: usize,
    ) -> FeatureVector {
        let contributors = self.registry.contributors(dimension);

        let mut labels: BTreeMap<String, LabelFeatures> = contributors
            .into_iter()
            .flatten()
            .map(|(label, weight)| {
                (
                    label.clone(),
                    LabelFeatures {
                        weight: *weight,
                        ..Default::default()
                    },
                )
            })
            .collect();

        let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
        let mut per_sentence: BTreeMap<usize, BTreeSet<&str>> = BTreeMap::new();

        for (&(sentence, label), &confidence) in hits {
            let Some(features) = labels.get_mut(label) else {
                continue;
            };
            features.count += 1;
            features.max_confidence = features.max_confidence.max(confidence);
            *sums.entry(label).or_insert(0.0) += confidence;
            per_sentence.entry(sentence).or_default().insert(label);
        }

        for (label, features) in labels.iter_mut() {
            if features.count == 0 {
                continue;
            }
            let sum = sums.get(label.as_str()).copied().unwrap_or(0.0);
            features.frequency = f64::from(features.count) / total_sentences as f64;
            features.mean_confidence = sum / f64::from(features.count);
        }

        let pairs = self
            .registry
            .pairs(dimension)
            .iter()
            .map(|(left, right)| PairFeature {
                left: left.clone(),
                right: right.clone(),
                co_occurrence: per_sentence
                    .values()
                    .filter(|set| set.contains(left.as_str()) && set.contains(right.as_str()))
                    .count() as u32,
            })
            .collect();

        FeatureVector {
            dimension: dimension.to_string(),
            total_sentences,
            labels,
            pairs,
        }
    }
}

/// Highest confidence per (sentence, label); duplicates count once.
fn best_per_sentence(detections: &[PatternDetection]) -> BTreeMap<(usize, &str), f64> {
    let mut hits: BTreeMap<(usize, &str), f64> = BTreeMap::new();
    for d in detections {
        let slot = hits
            .entry((d.sentence_index, d.label.as_str()))
            .or_insert(d.confidence);
        *slot = slot.max(d.confidence);
    }
    hits
}
