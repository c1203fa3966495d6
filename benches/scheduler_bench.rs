//! Benchmark suite for tube-scheduler
//!
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tube_scheduler::{
    ChannelRotator, InMemoryStateStore, PositionMap, PositionStore, RepetitionScheduler,
    SchedulerConfig, SequentialTemplateProvider, SessionScore, SkipNumber, StitchId, TubeId,
};

/// `count` stitches spread evenly over a 10000-slot tube
fn sparse_tube(count: u32) -> PositionStore {
    let stride = (10_000 / count).max(1);
    let map: PositionMap = (0..count)
        .map(|i| (1 + i * stride, StitchId::new(format!("S{i:05}"))))
        .collect();
    PositionStore::from_map("bench", TubeId::Tube1, 10_000, map).unwrap()
}

fn dense_tube(count: u32) -> PositionStore {
    let map: PositionMap = (1..=count)
        .map(|p| (p, StitchId::new(format!("S{p:05}"))))
        .collect();
    PositionStore::from_map("bench", TubeId::Tube1, 10_000, map).unwrap()
}

fn bench_placement(c: &mut Criterion) {
    let scheduler = RepetitionScheduler::default();
    let store = dense_tube(2_000);
    let (active, _) = store.active_unit().unwrap();
    let mut group = c.benchmark_group("placement");

    for skip in [SkipNumber::Four, SkipNumber::Thirty, SkipNumber::Hundred] {
        group.bench_with_input(BenchmarkId::from_parameter(skip.value()), &skip, |b, &skip| {
            b.iter(|| {
                let mut tube = store.clone();
                let result = scheduler
                    .reposition(&mut tube, &active, skip, &SessionScore::perfect(20))
                    .unwrap();
                black_box(result)
            })
        });
    }
    group.finish();
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");

    for count in [100, 1_000, 5_000] {
        let store = sparse_tube(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &store, |b, store| {
            b.iter(|| {
                let mut tube = store.clone();
                black_box(tube.compress(false).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_physical_rank(c: &mut Criterion) {
    let store = sparse_tube(5_000);
    let last = store.high_water_mark().unwrap();

    c.bench_function("physical_of_last_5000", |b| {
        b.iter(|| black_box(store.physical_of(black_box(last)).unwrap()))
    });
}

fn bench_rotation(c: &mut Criterion) {
    let rotator = ChannelRotator::new(
        Arc::new(InMemoryStateStore::new()),
        Arc::new(SequentialTemplateProvider::new(200)),
        SchedulerConfig::default(),
    );
    rotator.initialize("bench").unwrap();

    c.bench_function("rotate_200_per_tube", |b| {
        b.iter(|| black_box(rotator.rotate("bench").unwrap()))
    });
}

criterion_group!(
    benches,
    bench_placement,
    bench_compress,
    bench_physical_rank,
    bench_rotation
);
criterion_main!(benches);
