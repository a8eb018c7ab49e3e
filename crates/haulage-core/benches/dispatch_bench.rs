//! Criterion benchmarks for the haulage dispatch engine.
//!
//! Four benchmark groups:
//! - `dispatch`: 500 mixed requests against a 40-truck, 8-DC fleet
//! - `drain`: draining a 2000-request backlog as trucks come back
//! - `advance`: ticking 1000 active shipments through their lifecycle
//! - `serialization`: snapshot round trip of a busy engine

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use haulage_core::engine::Engine;
use haulage_core::test_utils::*;
use haulage_core::time::{SimDuration, SimTime};

// ===========================================================================
// Fleet builders
// ===========================================================================

/// 8 DCs with 4 trucks each, plus an 8-truck pool.
fn build_fleet() -> Engine {
    let assigned: Vec<(u32, u32)> = (0..8u32)
        .flat_map(|d| (0..4u32).map(move |t| (d, d * 100 + t)))
        .collect();
    let pool: Vec<u32> = (0..8u32).map(|t| 9_000 + t).collect();
    engine_with_fleet(&assigned, &pool, 1_000)
}

/// Submit `count` requests spread over the DCs, one every five minutes.
fn load_requests(engine: &mut Engine, count: u32) {
    for i in 0..count {
        let at = SimTime::from_minutes(5 * i as u64);
        let items = lines(&[(i % 5, 200 + (i * 53) % 1_400), ((i + 1) % 5, 60)]);
        engine
            .request_shipment(dc(i % 8), store(i % 50), &items, at)
            .unwrap();
    }
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    group.sample_size(50);

    group.bench_function("500_requests_40_trucks", |b| {
        b.iter_batched(
            build_fleet,
            |mut engine| load_requests(&mut engine, 500),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");
    group.sample_size(20);

    let setup = || {
        let mut engine = build_fleet();
        load_requests(&mut engine, 2_000);
        engine
    };

    group.bench_function("2000_request_backlog", |b| {
        b.iter_batched(
            setup,
            |mut engine| {
                let mut now = SimTime::from_hours(6);
                while engine.queue_len() > 0 {
                    engine.drain_queue(now);
                    now += SimDuration::from_minutes(30);
                }
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("advance");
    group.sample_size(30);

    let setup = || {
        let assigned: Vec<(u32, u32)> = (0..1_000u32).map(|t| (t % 10, t)).collect();
        let mut engine = engine_with_fleet(&assigned, &[], 1_000);
        for i in 0..1_000u32 {
            engine
                .request_shipment(dc(i % 10), store(i % 100), &line(1, 500), SimTime::EPOCH)
                .unwrap();
        }
        engine
    };

    group.bench_function("1000_shipments_to_completion", |b| {
        b.iter_batched(
            setup,
            |mut engine| run_until_stable(&mut engine, SimTime::EPOCH, 100),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");
    group.sample_size(30);

    let mut engine = build_fleet();
    load_requests(&mut engine, 1_000);
    engine.tick(SimTime::from_hours(12));

    group.bench_function("serialize_busy_engine", |b| {
        b.iter(|| {
            engine.serialize().unwrap();
        });
    });

    let data = engine.serialize().unwrap();
    group.bench_function("deserialize_busy_engine", |b| {
        b.iter(|| {
            Engine::deserialize(&data).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_dispatch,
    bench_drain,
    bench_advance,
    bench_serialization
);
criterion_main!(benches);
