// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Scoring Benchmarks
// ─────────────────────────────────────────────────────────────────────
//! Criterion benchmarks for the per-document hot path: aggregation,
//! scoring, the full pipeline, and a parallel batch.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ttp_index_core::{
    BatchAnalyzer, BatchItem, FeatureAggregator, IndexPipeline, IndexScorer, KeywordClassifier,
    SaturatingScorer, TaxonomyRegistry,
};
use ttp_index_types::{IndexConfig, PatternDetection};

const LABELS: [&str; 6] = [
    "FUNDING_COVERT",
    "CULTIVATION_INTELLECTUAL",
    "WHATABOUTISM",
    "WESTERN_HYPOCRISY_FRAMING",
    "EMOTIONAL_MANIPULATION",
    "VICTIM_BLAMING",
];

fn detections(sentences: usize) -> Vec<PatternDetection> {
    (0..sentences)
        .flat_map(|i| {
            [LABELS[i % LABELS.len()], LABELS[(i * 7 + 3) % LABELS.len()]]
                .into_iter()
                .map(move |label| PatternDetection {
                    sentence_index: i,
                    label: label.to_string(),
                    confidence: 0.3 + (i % 7) as f64 * 0.1,
                    span: None,
                })
        })
        .collect()
}

fn article(sentences: usize) -> String {
    const LINES: [&str; 5] = [
        "The foundation received undisclosed funding through a think tank.",
        "What about the double standard of western hypocrisy?",
        "Think of the children, they say, as the victims brought it on themselves.",
        "The council met on Tuesday to discuss the budget.",
        "Critics say sanctions backfire and hurt ordinary families.",
    ];
    (0..sentences)
        .map(|i| LINES[i % LINES.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

fn pipeline() -> IndexPipeline {
    let registry = TaxonomyRegistry::builtin().expect("builtin taxonomy");
    IndexPipeline::new(
        IndexConfig::default(),
        Arc::new(registry),
        Arc::new(KeywordClassifier::builtin()),
    )
    .expect("default pipeline")
}

// ── FeatureAggregator.aggregate() ───────────────────────────────────

fn bench_aggregate_100_sentences(c: &mut Criterion) {
    let registry = TaxonomyRegistry::builtin().expect("builtin taxonomy");
    let aggregator = FeatureAggregator::new(&registry);
    let dets = detections(100);
    c.bench_function("aggregate_100s", |b| {
        b.iter(|| aggregator.aggregate(black_box(&dets), 100))
    });
}

fn bench_aggregate_1000_sentences(c: &mut Criterion) {
    let registry = TaxonomyRegistry::builtin().expect("builtin taxonomy");
    let aggregator = FeatureAggregator::new(&registry);
    let dets = detections(1000);
    c.bench_function("aggregate_1000s", |b| {
        b.iter(|| aggregator.aggregate(black_box(&dets), 1000))
    });
}

// ── SaturatingScorer.score() ────────────────────────────────────────

fn bench_score_dimensions(c: &mut Criterion) {
    let registry = TaxonomyRegistry::builtin().expect("builtin taxonomy");
    let vectors = FeatureAggregator::new(&registry)
        .aggregate(&detections(100), 100)
        .expect("vectors");
    let scorer = SaturatingScorer::default();
    c.bench_function("score_all_dimensions", |b| {
        b.iter(|| {
            for fv in &vectors {
                black_box(scorer.score(black_box(fv)));
            }
        })
    });
}

// ── IndexPipeline.analyze() ─────────────────────────────────────────

fn bench_full_pipeline(c: &mut Criterion) {
    let pipeline = pipeline();
    let text = article(50);
    c.bench_function("full_pipeline_50s", |b| {
        b.iter(|| pipeline.analyze(black_box(&text)))
    });
}

// ── BatchAnalyzer.run() ─────────────────────────────────────────────

fn bench_batch_32_documents(c: &mut Criterion) {
    let analyzer = BatchAnalyzer::new(Arc::new(pipeline()), 4).expect("analyzer");
    let items: Vec<BatchItem> = (0..32)
        .map(|i| BatchItem::new(format!("doc-{i}"), format!("Item {i}. {}", article(20))))
        .collect();
    c.bench_function("batch_32docs", |b| {
        b.iter(|| analyzer.run(black_box(items.clone())))
    });
}

criterion_group!(
    benches,
    bench_aggregate_100_sentences,
    bench_aggregate_1000_sentences,
    bench_score_dimensions,
    bench_full_pipeline,
    bench_batch_32_documents,
);
criterion_main!(benches);
