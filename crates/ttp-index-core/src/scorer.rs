// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Index Scorers
// ─────────────────────────────────────────────────────────────────────
//! Maps a dimension's `FeatureVector` to a bounded 0–5 `IndexScore`.
//!
//! The default `SaturatingScorer` is a weighted sum of saturating terms:
//!
//! ```text
//! f(freq, conf) = conf × (1 − e^{−λ·freq})
//! raw           = Σ_label weight × f(frequency, max_confidence)
//! bonus         = min(cap, step × Σ_pair co_occurrence)
//! value         = round(clamp(raw + bonus, 0, 5))
//! ```
//!
//! `f` is bounded by the label's best confidence, so repeated weak hits
//! saturate below one strong hit. Every term is non-decreasing in count
//! and confidence, hence adding a detection never lowers a score.
//!
//! All strategies sit behind `IndexScorer` and finish through
//! `finalize_score`, so the feature layer never knows which one is active.

use std::collections::BTreeMap;
use std::sync::Arc;

use ttp_index_types::score::finalize_score;
use ttp_index_types::{
    FeatureVector, Granularity, IndexConfig, IndexError, IndexResult, IndexScore,
    LabelContribution, LinearModel, ScorerKind,
};

use crate::taxonomy::TaxonomyRegistry;

/// Strategy mapping a feature vector to a dimension score.
///
/// Implementations must return a value in [0, 5] and exactly 0 when the
/// vector has no detections.
pub trait IndexScorer: Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, features: &FeatureVector) -> IndexScore;
}

/// Tunables of the saturating scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPolicy {
    pub saturation_lambda: f64,
    pub co_occurrence_step: f64,
    pub co_occurrence_cap: f64,
    pub granularity: Granularity,
}

impl ScoringPolicy {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            saturation_lambda: config.saturation_lambda,
            co_occurrence_step: config.co_occurrence_step,
            co_occurrence_cap: config.co_occurrence_cap,
            granularity: config.granularity,
        }
    }
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self::from_config(&IndexConfig::default())
    }
}

/// `conf × (1 − e^{−λ·freq})`.
#[inline]
pub fn saturation(frequency: f64, confidence: f64, lambda: f64) -> f64 {
    confidence * -(-lambda * frequency).exp_m1()
}

/// Saturating contribution of every detected label.
fn saturating_contributions(features: &FeatureVector, lambda: f64) -> Vec<LabelContribution> {
    features
        .detected()
        .map(|(label, f)| LabelContribution {
            label: label.to_string(),
            count: f.count,
            max_confidence: f.max_confidence,
            mean_confidence: f.mean_confidence,
            weight: f.weight,
            contribution: f.weight * saturation(f.frequency, f.max_confidence, lambda),
        })
        .collect()
}

/// Default, auditable scorer.
pub struct SaturatingScorer {
    policy: ScoringPolicy,
}

impl SaturatingScorer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(ScoringPolicy::from_config(config))
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }
}

impl Default for SaturatingScorer {
    fn default() -> Self {
        Self::new(ScoringPolicy::default())
    }
}

impl IndexScorer for SaturatingScorer {
    fn name(&self) -> &str {
        "saturating"
    }

    fn score(&self, features: &FeatureVector) -> IndexScore {
        if !features.has_detections() {
            return IndexScore::zero(&features.dimension);
        }

        let contributions = saturating_contributions(features, self.policy.saturation_lambda);
        let raw: f64 = contributions.iter().map(|c| c.contribution).sum();

        let co_occurrences: u32 = features.pairs.iter().map(|p| p.co_occurrence).sum();
        let bonus = (self.policy.co_occurrence_step * f64::from(co_occurrences))
            .min(self.policy.co_occurrence_cap);

        IndexScore {
            dimension: features.dimension.clone(),
            value: finalize_score(raw + bonus, self.policy.granularity),
            raw,
            co_occurrence_bonus: bonus,
            contributions,
        }
    }
}

/// Learned linear regressor over the same feature shape.
///
/// Coefficients come from offline training; negative coefficients are
/// allowed, so monotonicity holds only if the model was trained for it.
pub struct LinearModelScorer {
    models: BTreeMap<String, LinearModel>,
    granularity: Granularity,
}

impl LinearModelScorer {
    pub fn new(models: BTreeMap<String, LinearModel>, granularity: Granularity) -> Self {
        Self {
            models,
            granularity,
        }
    }

    /// Check that every registry dimension has a model and that models
    /// only reference labels and pairs the registry knows for that dimension.
    pub fn validate_for(&self, registry: &TaxonomyRegistry) -> IndexResult<()> {
        for dim in registry.dimensions() {
            let Some(model) = self.models.get(&dim.key) else {
                return Err(IndexError::Config(format!(
                    "linear scorer has no model for dimension '{}'",
                    dim.key
                )));
            };
            for label in model.labels.keys() {
                if registry.weight(label, &dim.key).is_none() {
                    return Err(IndexError::Config(format!(
                        "linear model for '{}' references non-contributing label '{label}'",
                        dim.key
                    )));
                }
            }
            for term in &model.pairs {
                let configured = registry.pairs(&dim.key).iter().any(|(l, r)| {
                    (l == &term.left && r == &term.right) || (l == &term.right && r == &term.left)
                });
                if !configured {
                    return Err(IndexError::Config(format!(
                        "linear model for '{}' references unconfigured pair ({}, {})",
                        dim.key, term.left, term.right
                    )));
                }
            }
        }
        for key in self.models.keys() {
            if registry.dimension(key).is_none() {
                return Err(IndexError::Config(format!(
                    "linear model given for unknown dimension '{key}'"
                )));
            }
        }
        Ok(())
    }
}

impl IndexScorer for LinearModelScorer {
    fn name(&self) -> &str {
        "linear"
    }

    fn score(&self, features: &FeatureVector) -> IndexScore {
        if !features.has_detections() {
            return IndexScore::zero(&features.dimension);
        }
        let Some(model) = self.models.get(&features.dimension) else {
            log::error!(
                "No linear model for dimension '{}', scoring 0",
                features.dimension
            );
            return IndexScore::zero(&features.dimension);
        };

        let contributions: Vec<LabelContribution> = features
            .detected()
            .map(|(label, f)| {
                let contribution = model.labels.get(label).map_or(0.0, |t| {
                    t.frequency * f.frequency
                        + t.max_confidence * f.max_confidence
                        + t.mean_confidence * f.mean_confidence
                });
                LabelContribution {
                    label: label.to_string(),
                    count: f.count,
                    max_confidence: f.max_confidence,
                    mean_confidence: f.mean_confidence,
                    weight: f.weight,
                    contribution,
                }
            })
            .collect();

        let raw = model.intercept + contributions.iter().map(|c| c.contribution).sum::<f64>();
        let bonus: f64 = model
            .pairs
            .iter()
            .map(|term| {
                features
                    .pairs
                    .iter()
                    .filter(|p| {
                        (p.left == term.left && p.right == term.right)
                            || (p.left == term.right && p.right == term.left)
                    })
                    .map(|p| term.weight * f64::from(p.co_occurrence))
                    .sum::<f64>()
            })
            .sum();

        IndexScore {
            dimension: features.dimension.clone(),
            value: finalize_score(raw + bonus, self.granularity),
            raw,
            co_occurrence_bonus: bonus,
            contributions,
        }
    }
}

type ScoreFn = Box<dyn Fn(&FeatureVector) -> f64 + Send + Sync>;

/// Scorer that delegates the raw value to a caller-supplied function.
///
/// Used to plug in models living outside this crate. Label attribution
/// still uses the saturating terms so explanations stay comparable.
pub struct ExternalScorer {
    name: String,
    score_fn: ScoreFn,
    policy: ScoringPolicy,
}

impl ExternalScorer {
    pub fn new(
        name: impl Into<String>,
        policy: ScoringPolicy,
        score_fn: impl Fn(&FeatureVector) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            score_fn: Box::new(score_fn),
            policy,
        }
    }
}

impl IndexScorer for ExternalScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, features: &FeatureVector) -> IndexScore {
        if !features.has_detections() {
            return IndexScore::zero(&features.dimension);
        }
        let raw = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (self.score_fn)(features)
        })) {
            Ok(v) => v,
            Err(_) => {
                log::error!(
                    "External scorer '{}' panicked on '{}', scoring 0",
                    self.name,
                    features.dimension
                );
                0.0
            }
        };
        IndexScore {
            dimension: features.dimension.clone(),
            value: finalize_score(raw, self.policy.granularity),
            raw,
            co_occurrence_bonus: 0.0,
            contributions: saturating_contributions(features, self.policy.saturation_lambda),
        }
    }
}

/// Build the scorer selected by `config.scorer`.
pub fn build_scorer(
    config: &IndexConfig,
    registry: &TaxonomyRegistry,
) -> IndexResult<Arc<dyn IndexScorer>> {
    match &config.scorer {
        ScorerKind::Saturating => Ok(Arc::new(SaturatingScorer::from_config(config))),
        ScorerKind::Linear { models } => {
            let scorer = LinearModelScorer::new(models.clone(), config.granularity);
            scorer.validate_for(registry)?;
            Ok(Arc::new(scorer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureAggregator;
    use ttp_index_types::{LinearTerm, PairTerm, PatternDetection, MAX_INDEX_SCORE};

    fn det(sentence: usize, label: &str, confidence: f64) -> PatternDetection {
        PatternDetection {
            sentence_index: sentence,
            label: label.to_string(),
            confidence,
            span: None,
        }
    }

    fn features(detections: &[PatternDetection], total: usize, dimension: &str) -> FeatureVector {
        let registry = TaxonomyRegistry::builtin().unwrap();
        FeatureAggregator::new(&registry)
            .aggregate_dimension(dimension, detections, total)
            .unwrap()
    }

    #[test]
    fn test_saturation_shape() {
        assert_eq!(saturation(0.0, 1.0, 8.0), 0.0);
        assert!(saturation(0.1, 1.0, 8.0) < saturation(0.2, 1.0, 8.0));
        assert!(saturation(1.0, 0.9, 8.0) <= 0.9);
        assert!(saturation(1.0, 0.9, 8.0) > 0.89);
    }

    #[test]
    fn test_scenario_beats_empty() {
        let scorer = SaturatingScorer::default();
        let with = features(
            &[
                det(3, "FUNDING_COVERT", 0.9),
                det(7, "FUNDING_COVERT", 0.4),
                det(7, "CULTIVATION_INTELLECTUAL", 0.6),
            ],
            10,
            "financial_leverage",
        );
        let without = features(&[det(7, "CULTIVATION_INTELLECTUAL", 0.6)], 10, "financial_leverage");
        let a = scorer.score(&with);
        let b = scorer.score(&without);
        assert!(a.value > b.value, "{} vs {}", a.value, b.value);
        // 2.5·0.9·(1−e^{−1.6}) + 1.0·0.6·(1−e^{−0.8}) + 0.25 ≈ 2.376 → 2.5
        assert!((a.raw - 2.1259).abs() < 1e-3, "raw {}", a.raw);
        assert_eq!(a.co_occurrence_bonus, 0.25);
        assert_eq!(a.value, 2.5);
    }

    #[test]
    fn test_zero_case_is_exact() {
        let scorer = SaturatingScorer::default();
        let fv = features(&[], 10, "sophistication");
        let score = scorer.score(&fv);
        assert_eq!(score.value, 0.0);
        assert!(score.contributions.is_empty());
    }

    #[test]
    fn test_bounds_under_extreme_input() {
        let scorer = SaturatingScorer::default();
        let mut detections = Vec::new();
        for i in 0..1000 {
            detections.push(det(i, "FUNDING_COVERT", 1.0));
            detections.push(det(i, "CULTIVATION_INTELLECTUAL", 1.0));
            detections.push(det(i, "CULTIVATION_INFLUENCER", 1.0));
            detections.push(det(i, "FUNDING_STATE_MEDIA", 1.0));
        }
        let score = scorer.score(&features(&detections, 1000, "financial_leverage"));
        assert!(score.raw > MAX_INDEX_SCORE);
        assert_eq!(score.value, MAX_INDEX_SCORE);
        assert_eq!(score.co_occurrence_bonus, 0.5);
    }

    #[test]
    fn test_strong_hit_outweighs_weak_noise() {
        let scorer = SaturatingScorer::new(ScoringPolicy {
            granularity: Granularity::Continuous,
            ..Default::default()
        });
        let strong = scorer.score(&features(&[det(0, "DEFLECTION", 1.0)], 10, "sophistication"));
        let noise: Vec<_> = (0..5).map(|i| det(i, "DEFLECTION", 0.1)).collect();
        let weak = scorer.score(&features(&noise, 10, "sophistication"));
        assert!(strong.value > weak.value);
    }

    #[test]
    fn test_monotonic_in_detections() {
        let scorer = SaturatingScorer::new(ScoringPolicy {
            granularity: Granularity::Continuous,
            ..Default::default()
        });
        let mut detections = Vec::new();
        let mut previous = 0.0;
        for i in 0..20 {
            let label = if i % 3 == 0 { "EMOTIONAL_MANIPULATION" } else { "VICTIM_BLAMING" };
            detections.push(det(i, label, 0.3 + 0.03 * i as f64));
            let value = scorer.score(&features(&detections, 20, "effectiveness")).value;
            assert!(value >= previous, "step {i}: {value} < {previous}");
            previous = value;
        }

        // Same holds after rounding.
        let rounded = SaturatingScorer::default();
        let mut previous = 0.0;
        for n in 1..=20 {
            let value = rounded.score(&features(&detections[..n], 20, "effectiveness")).value;
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn test_co_occurrence_bonus_capped() {
        let scorer = SaturatingScorer::new(ScoringPolicy {
            granularity: Granularity::Continuous,
            ..Default::default()
        });
        let detections: Vec<_> = (0..10)
            .flat_map(|i| [det(i, "EMOTIONAL_MANIPULATION", 0.05), det(i, "VICTIM_BLAMING", 0.05)])
            .collect();
        let score = scorer.score(&features(&detections, 10, "effectiveness"));
        assert_eq!(score.co_occurrence_bonus, 0.5);
        assert!(score.value <= MAX_INDEX_SCORE);
    }

    #[test]
    fn test_deterministic_bits() {
        let scorer = SaturatingScorer::default();
        let fv = features(
            &[det(1, "WHATABOUTISM", 0.61), det(4, "WESTERN_HYPOCRISY_FRAMING", 0.77)],
            9,
            "russian_alignment",
        );
        let a = scorer.score(&fv);
        let b = scorer.score(&fv);
        assert_eq!(a.raw.to_bits(), b.raw.to_bits());
        assert_eq!(a, b);
    }

    fn linear_models() -> BTreeMap<String, LinearModel> {
        let registry = TaxonomyRegistry::builtin().unwrap();
        registry
            .dimensions()
            .iter()
            .map(|d| (d.key.clone(), LinearModel::default()))
            .collect()
    }

    #[test]
    fn test_linear_scorer() {
        let mut models = linear_models();
        let model = models.get_mut("financial_leverage").unwrap();
        model.intercept = 0.5;
        model.labels.insert(
            "FUNDING_COVERT".into(),
            LinearTerm {
                frequency: 5.0,
                max_confidence: 2.0,
                mean_confidence: 0.0,
            },
        );
        model.pairs.push(PairTerm {
            left: "FUNDING_COVERT".into(),
            right: "CULTIVATION_INTELLECTUAL".into(),
            weight: 0.3,
        });
        let scorer = LinearModelScorer::new(models, Granularity::Continuous);
        scorer.validate_for(&TaxonomyRegistry::builtin().unwrap()).unwrap();

        let fv = features(
            &[det(3, "FUNDING_COVERT", 0.9), det(3, "CULTIVATION_INTELLECTUAL", 0.6)],
            10,
            "financial_leverage",
        );
        let score = scorer.score(&fv);
        // 0.5 + (5·0.1 + 2·0.9) + 0.3·1
        assert!((score.value - 3.1).abs() < 1e-9, "{}", score.value);
        assert!((score.co_occurrence_bonus - 0.3).abs() < 1e-12);
        assert_eq!(scorer.score(&features(&[], 10, "financial_leverage")).value, 0.0);
    }

    #[test]
    fn test_linear_validation() {
        let registry = TaxonomyRegistry::builtin().unwrap();
        let mut models = linear_models();
        models.remove("effectiveness");
        let scorer = LinearModelScorer::new(models, Granularity::Half);
        assert!(matches!(scorer.validate_for(&registry), Err(IndexError::Config(_))));

        let mut models = linear_models();
        models
            .get_mut("effectiveness")
            .unwrap()
            .labels
            .insert("FUNDING_COVERT".into(), LinearTerm::default());
        let scorer = LinearModelScorer::new(models, Granularity::Half);
        assert!(scorer.validate_for(&registry).is_err());
    }

    #[test]
    fn test_external_scorer_clamps() {
        let fv = features(&[det(0, "DEFLECTION", 0.5)], 4, "sophistication");
        let huge = ExternalScorer::new("huge", ScoringPolicy::default(), |_| 1e6);
        assert_eq!(huge.score(&fv).value, MAX_INDEX_SCORE);
        let nan = ExternalScorer::new("nan", ScoringPolicy::default(), |_| f64::NAN);
        assert_eq!(nan.score(&fv).value, 0.0);
        let panics = ExternalScorer::new("panics", ScoringPolicy::default(), |_| panic!("boom"));
        assert_eq!(panics.score(&fv).value, 0.0);
        assert_eq!(huge.score(&fv).contributions.len(), 1);
    }

    #[test]
    fn test_external_scorer_zero_case() {
        let scorer = ExternalScorer::new("const", ScoringPolicy::default(), |_| 3.0);
        let fv = features(&[], 4, "sophistication");
        assert_eq!(scorer.score(&fv).value, 0.0);
    }

    #[test]
    fn test_build_scorer() {
        let registry = TaxonomyRegistry::builtin().unwrap();
        let scorer = build_scorer(&IndexConfig::default(), &registry).unwrap();
        assert_eq!(scorer.name(), "saturating");

        let config = IndexConfig {
            scorer: ScorerKind::Linear {
                models: linear_models(),
            },
            ..Default::default()
        };
        assert_eq!(build_scorer(&config, &registry).unwrap().name(), "linear");

        let config = IndexConfig {
            scorer: ScorerKind::Linear {
                models: BTreeMap::new(),
            },
            ..Default::default()
        };
        assert!(build_scorer(&config, &registry).is_err());
    }
}
