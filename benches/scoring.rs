//! Performance benchmarks for scoring, decay and prune planning

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use retention::decay::decay;
use retention::intelligence::ImportanceScorer;
use retention::pruning::{plan_prune, PruneLimits};
use retention::{
    ContentDigest, DecayMode, FeatureExtractor, MemoryKind, MemoryRecord, PruneOptions,
    ScoringContext, Visibility,
};

fn bench_feature_extraction(c: &mut Criterion) {
    let extractor = FeatureExtractor::default();
    let context = ScoringContext::default()
        .with_preference("dragons", 85.0)
        .with_affinity(0.7)
        .with_topic("crisis");
    let text = "EMERGENCY! There's a dragon attacking the village and I'm terrified. \
                Why did nobody warn us? Tell me what we should do, this is serious!";

    let mut group = c.benchmark_group("feature_extraction");
    group.throughput(Throughput::Bytes(text.len() as u64));

    group.bench_function("extract", |b| {
        b.iter(|| extractor.extract(black_box(text), &context))
    });
    group.bench_function("digest", |b| {
        b.iter(|| extractor.digest(black_box(text), &context))
    });

    group.finish();
}

fn bench_importance_scoring(c: &mut Criterion) {
    let extractor = FeatureExtractor::default();
    let scorer = ImportanceScorer::default();
    let features = extractor.extract(
        "I love tea, it reminds me of home!",
        &ScoringContext::default(),
    );

    c.bench_function("importance_score", |b| {
        b.iter(|| scorer.score(black_box(&features), MemoryKind::Secret))
    });
}

fn bench_decay_curves(c: &mut Criterion) {
    let mut group = c.benchmark_group("decay");
    for mode in [
        DecayMode::Linear,
        DecayMode::Exponential,
        DecayMode::Logarithmic,
        DecayMode::Step,
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(mode), &mode, |b, &mode| {
            b.iter(|| decay(mode, black_box(0.8), 0.1, black_box(10.0), 0.1, 1.0))
        });
    }
    group.finish();
}

fn owner(size: usize) -> Vec<MemoryRecord> {
    let base = Utc::now() - Duration::days(90);
    (0..size)
        .map(|i| {
            let created = base + Duration::minutes(i as i64);
            MemoryRecord {
                id: i as i64 + 1,
                owner_id: "aria".to_string(),
                content_digest: ContentDigest::default(),
                memory_kind: MemoryKind::Conversation,
                importance: ((i * 37) % 100) as f32 / 100.0,
                created_at: created,
                last_decay_at: created,
                last_accessed_at: (i % 3 == 0).then(|| created + Duration::hours(1)),
                access_count: (i % 3 == 0) as i64,
                visibility: Visibility::Private,
                topic_drift_count: 0,
            }
        })
        .collect()
}

fn bench_prune_planning(c: &mut Criterion) {
    let limits = PruneLimits {
        min_safe_count: 10,
        max_prune_percent: 0.25,
        default_threshold: 0.6,
    };

    let mut group = c.benchmark_group("plan_prune");
    for size in [100usize, 1_000, 10_000] {
        let records = owner(size);
        let options = PruneOptions::new(size / 5);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| plan_prune(black_box(records), &options, &limits))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_feature_extraction,
    bench_importance_scoring,
    bench_decay_curves,
    bench_prune_planning
);

criterion_main!(benches);
