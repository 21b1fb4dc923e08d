// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Analysis Pipeline
// ─────────────────────────────────────────────────────────────────────
//! Single-document orchestration:
//! classify → ingest → aggregate → score → select evidence → explain.
//!
//! Stages run sequentially over values the run owns; the registry,
//! classifier and scorer are shared read-only. Cancellation is observed
//! at every stage boundary and the classifier call is bounded by a
//! deadline.
//!
//! At most `max_workers` classifier calls are in flight per pipeline. A
//! call that overruns its deadline keeps its permit until it actually
//! returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use ttp_index_types::{
    DimensionReport, Document, IndexConfig, IndexError, IndexResult, RawDetection, Report,
};

use crate::classifier::PatternClassifier;
use crate::evidence::EvidenceSelector;
use crate::explain::{check_evidence, ExplanationComposer, SummaryWriter};
use crate::features::FeatureAggregator;
use crate::ingest::DetectionIngestor;
use crate::scorer::{build_scorer, IndexScorer};
use crate::taxonomy::TaxonomyRegistry;

/// Shared flag that stops analyses at their next stage boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` if the flag is set before `stage` starts.
    pub fn check(&self, stage: &str) -> IndexResult<()> {
        if self.is_cancelled() {
            log::info!("Analysis cancelled before {stage}");
            return Err(IndexError::Cancelled {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }
}

/// Counting semaphore over in-flight classifier calls.
struct ClassifierGate {
    in_flight: Mutex<usize>,
    released: Condvar,
    limit: usize,
}

impl ClassifierGate {
    fn new(limit: usize) -> Self {
        Self {
            in_flight: Mutex::new(0),
            released: Condvar::new(),
            limit,
        }
    }

    /// Wait for a free slot until `deadline`; `None` if none freed up.
    fn acquire(self: &Arc<Self>, deadline: Instant) -> Option<ClassifierPermit> {
        let mut in_flight = self.in_flight.lock();
        while *in_flight >= self.limit {
            if self.released.wait_until(&mut in_flight, deadline).timed_out()
                && *in_flight >= self.limit
            {
                return None;
            }
        }
        *in_flight += 1;
        Some(ClassifierPermit {
            gate: Arc::clone(self),
        })
    }
}

/// Slot held for the lifetime of one classifier call.
struct ClassifierPermit {
    gate: Arc<ClassifierGate>,
}

impl Drop for ClassifierPermit {
    fn drop(&mut self) {
        *self.gate.in_flight.lock() -= 1;
        self.gate.released.notify_one();
    }
}

pub struct IndexPipeline {
    config: IndexConfig,
    registry: Arc<TaxonomyRegistry>,
    classifier: Arc<dyn PatternClassifier>,
    scorer: Arc<dyn IndexScorer>,
    summary_writer: Option<Arc<dyn SummaryWriter>>,
    gate: Arc<ClassifierGate>,
}

impl IndexPipeline {
    /// Validate `config` and build the configured scorer.
    pub fn new(
        config: IndexConfig,
        registry: Arc<TaxonomyRegistry>,
        classifier: Arc<dyn PatternClassifier>,
    ) -> IndexResult<Self> {
        config.validate()?;
        let scorer = build_scorer(&config, &registry)?;
        let gate = Arc::new(ClassifierGate::new(config.max_workers));
        Ok(Self {
            config,
            registry,
            classifier,
            scorer,
            summary_writer: None,
            gate,
        })
    }

    /// Replace the configured scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn IndexScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_summary_writer(mut self, writer: Arc<dyn SummaryWriter>) -> Self {
        self.summary_writer = Some(writer);
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TaxonomyRegistry> {
        &self.registry
    }

    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }

    /// Segment `text` and analyse it.
    pub fn analyze(&self, text: &str) -> IndexResult<Report> {
        self.analyze_document(&Document::segment(text))
    }

    pub fn analyze_document(&self, document: &Document) -> IndexResult<Report> {
        self.analyze_cancellable(document, &CancellationToken::new())
    }

    pub fn analyze_cancellable(
        &self,
        document: &Document,
        token: &CancellationToken,
    ) -> IndexResult<Report> {
        if document.is_empty() {
            return Err(IndexError::EmptyDocument);
        }
        token.check("classification")?;
        let raw = self.classify_with_deadline(document)?;
        self.run(document, &raw, token)
    }

    /// Analyse detections produced elsewhere, skipping the classifier.
    pub fn analyze_with_detections(
        &self,
        document: &Document,
        raw: &[RawDetection],
    ) -> IndexResult<Report> {
        self.run(document, raw, &CancellationToken::new())
    }

    fn classify_with_deadline(&self, document: &Document) -> IndexResult<Vec<RawDetection>> {
        let deadline_ms = self.config.classifier_deadline_ms;
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);

        let Some(permit) = self.gate.acquire(deadline) else {
            log::warn!("No classifier slot freed within {deadline_ms}ms deadline");
            return Err(IndexError::Timeout { deadline_ms });
        };

        let (tx, rx) = mpsc::channel();
        let classifier = Arc::clone(&self.classifier);
        let owned = document.clone();

        thread::Builder::new()
            .name("ttp-index-classifier".to_string())
            .spawn(move || {
                let _permit = permit;
                // Receiver may be gone after a timeout.
                let _ = tx.send(classifier.classify(&owned));
            })
            .map_err(|e| IndexError::Classifier(format!("cannot spawn classifier thread: {e}")))?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Classifier exceeded {deadline_ms}ms deadline");
                Err(IndexError::Timeout { deadline_ms })
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("Classifier thread died without a result");
                Err(IndexError::Classifier("classifier panicked".to_string()))
            }
        }
    }

    fn run(
        &self,
        document: &Document,
        raw: &[RawDetection],
        token: &CancellationToken,
    ) -> IndexResult<Report> {
        let registry = self.registry.as_ref();

        token.check("ingestion")?;
        let ingested = DetectionIngestor::new(registry).ingest(document, raw)?;
        let detections = ingested.detections;
        let mut warnings = ingested.warnings;

        token.check("aggregation")?;
        let vectors = FeatureAggregator::new(registry).aggregate(&detections, document.len())?;

        token.check("scoring")?;
        let mut scores = Vec::with_capacity(vectors.len());
        for features in &vectors {
            let score = self.scorer.score(features);
            if !score.value.is_finite() {
                return Err(IndexError::Numerical(format!(
                    "scorer '{}' produced {} for '{}'",
                    self.scorer.name(),
                    score.value,
                    features.dimension
                )));
            }
            scores.push(score);
        }

        token.check("explanation")?;
        let selector =
            EvidenceSelector::new(registry, self.config.evidence_k, self.config.evidence_max_chars);
        let mut composer = ExplanationComposer::new(registry, self.config.summary_max_labels);
        if let Some(writer) = self.summary_writer.as_deref() {
            composer = composer.with_writer(writer);
        }

        let mut dimensions = Vec::with_capacity(vectors.len());
        for (features, score) in vectors.into_iter().zip(scores) {
            let evidence = selector.select(document, &detections, &features.dimension);
            let explanation = composer.compose(&score, &features, evidence, &mut warnings);
            check_evidence(&explanation, document)?;
            dimensions.push(DimensionReport {
                score,
                features,
                explanation,
            });
        }

        log::debug!(
            "Analysed {} sentences: {} detections, {} warnings",
            document.len(),
            detections.len(),
            warnings.len()
        );
        Ok(Report {
            taxonomy_version: registry.version().to_string(),
            scorer: self.scorer.name().to_string(),
            total_sentences: document.len(),
            dimensions,
            warnings,
        })
    }
}
