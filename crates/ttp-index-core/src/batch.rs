// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Batch Analyzer
// ─────────────────────────────────────────────────────────────────────
//! Runs many independent documents through one pipeline on a bounded
//! rayon pool.
//!
//! A failing document yields an `Err` in its own slot and never aborts
//! the batch. Results come back in input order whatever the scheduling.
//! The pool size bounds concurrent classifier calls.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;

use ttp_index_types::{Document, IndexError, IndexResult, Report};

use crate::pipeline::{CancellationToken, IndexPipeline};

/// Characters compared when flagging duplicate documents.
const DUPLICATE_PREFIX_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: String,
    pub text: String,
}

impl BatchItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug)]
pub struct BatchResult {
    pub id: String,
    pub outcome: IndexResult<Report>,
    /// Id of an earlier item with the same opening text.
    pub duplicate_of: Option<String>,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<BatchResult>,
    pub succeeded: usize,
    pub failed: usize,
    /// Failures a caller may retry (classifier errors and timeouts).
    pub retryable: usize,
    /// Ids flagged as duplicates. They are still analysed.
    pub duplicates: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct BatchAnalyzer {
    pipeline: Arc<IndexPipeline>,
    pool: ThreadPool,
    progress: Mutex<BatchProgress>,
    token: CancellationToken,
}

impl BatchAnalyzer {
    pub fn new(pipeline: Arc<IndexPipeline>, max_workers: usize) -> IndexResult<Self> {
        if max_workers == 0 {
            return Err(IndexError::Config(
                "max_workers must be at least 1".to_string(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("ttp-index-worker-{i}"))
            .build()
            .map_err(|e| IndexError::Config(format!("cannot build worker pool: {e}")))?;
        Ok(Self {
            pipeline,
            pool,
            progress: Mutex::new(BatchProgress::default()),
            token: CancellationToken::new(),
        })
    }

    /// Pool sized by the pipeline's `max_workers`.
    pub fn from_pipeline(pipeline: Arc<IndexPipeline>) -> IndexResult<Self> {
        let workers = pipeline.config().max_workers;
        Self::new(pipeline, workers)
    }

    /// Stop every in-flight and future document at its next stage boundary.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Snapshot of the current (or last) run.
    pub fn progress(&self) -> BatchProgress {
        *self.progress.lock()
    }

    pub fn run(&self, items: Vec<BatchItem>) -> BatchOutcome {
        let duplicate_of = flag_duplicates(&items);
        *self.progress.lock() = BatchProgress {
            total: items.len(),
            ..Default::default()
        };

        let outcomes: Vec<IndexResult<Report>> = self.pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    let document = Document::segment(item.text.as_str());
                    let outcome = self.pipeline.analyze_cancellable(&document, &self.token);
                    let mut progress = self.progress.lock();
                    progress.completed += 1;
                    if let Err(e) = &outcome {
                        progress.failed += 1;
                        log::warn!("Document '{}' failed: {e}", item.id);
                    }
                    outcome
                })
                .collect()
        });

        let mut batch = BatchOutcome::default();
        for ((item, outcome), duplicate_of) in items.into_iter().zip(outcomes).zip(duplicate_of) {
            match &outcome {
                Ok(_) => batch.succeeded += 1,
                Err(e) => {
                    batch.failed += 1;
                    if e.is_retryable() {
                        batch.retryable += 1;
                    }
                }
            }
            if duplicate_of.is_some() {
                batch.duplicates.push(item.id.clone());
            }
            batch.results.push(BatchResult {
                id: item.id,
                outcome,
                duplicate_of,
            });
        }
        log::info!(
            "Batch finished: {} succeeded, {} failed ({} retryable), {} duplicates",
            batch.succeeded,
            batch.failed,
            batch.retryable,
            batch.duplicates.len()
        );
        batch
    }
}

fn duplicate_key(text: &str) -> String {
    text.chars()
        .take(DUPLICATE_PREFIX_CHARS)
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// For each item, the id of the first earlier item sharing its key.
fn flag_duplicates(items: &[BatchItem]) -> Vec<Option<String>> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    items
        .iter()
        .map(|item| {
            let key = duplicate_key(&item.text);
            if key.is_empty() {
                return None;
            }
            match seen.get(&key) {
                Some(first) => {
                    log::warn!("Document '{}' duplicates '{first}'", item.id);
                    Some(first.to_string())
                }
                None => {
                    seen.insert(key, &item.id);
                    None
                }
            }
        })
        .collect()
}
