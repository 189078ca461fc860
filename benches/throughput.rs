//! Throughput benchmarks for the cache's hot paths.
//!
//! Each group measures one operation in isolation; the `churn` group runs a
//! mixed read/write workload with the background sweep ticking underneath,
//! which is the shape of real deployments.
//!
//! Run with:
//!     cargo bench --bench throughput

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use solo::{CacheBuilder, CancellationToken};
use std::time::Duration;

/// Number of entries each cache is pre-filled with.
const CAP: u64 = 10_000;

/// Operations executed per criterion iteration (hot-loop size).
const OPS: u64 = 1_000;

/// Long enough that nothing expires while a read benchmark runs.
const LONG_TTL: Duration = Duration::from_secs(3600);

fn prefilled() -> solo::Cache<u64, u64> {
    let cache: solo::Cache<u64, u64> = CacheBuilder::new(LONG_TTL).build();
    for i in 0..CAP {
        cache.set(i, i * 2);
    }
    cache
}

// ---------------------------------------------------------------------------
// Group 1: get_hit
// ---------------------------------------------------------------------------
// All keys are present and valid → pure read throughput.

fn bench_get_hit(c: &mut Criterion) {
    let cache = prefilled();

    let mut group = c.benchmark_group("get_hit");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function("solo", |b| {
        b.iter(|| {
            for i in 0..OPS {
                black_box(cache.get(black_box(&i)));
            }
        })
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Group 2: get_miss
// ---------------------------------------------------------------------------
// No key is ever present → index-lookup cost without an entry probe.

fn bench_get_miss(c: &mut Criterion) {
    let cache = prefilled();

    let mut group = c.benchmark_group("get_miss");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function("solo", |b| {
        b.iter(|| {
            for i in CAP..CAP + OPS {
                black_box(cache.get(black_box(&i)));
            }
        })
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Group 3: set
// ---------------------------------------------------------------------------
// Overwrites of existing keys: slot fill plus the tail move.

fn bench_set(c: &mut Criterion) {
    let cache = prefilled();

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function("solo", |b| {
        b.iter(|| {
            for i in 0..OPS {
                cache.set(black_box(i), black_box(i));
            }
        })
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Group 4: get_or_refresh_hit
// ---------------------------------------------------------------------------
// The singleflight fast path: a valid entry short-circuits the refresh, so
// this measures claim + entry-lock + validity check.

fn bench_get_or_refresh_hit(c: &mut Criterion) {
    let cache = prefilled();

    let mut group = c.benchmark_group("get_or_refresh_hit");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function("solo", |b| {
        b.iter(|| {
            for i in 0..OPS {
                let value = cache
                    .get_or_refresh(black_box(i), || Ok::<_, std::io::Error>(0))
                    .unwrap();
                black_box(value);
            }
        })
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Group 5: churn
// ---------------------------------------------------------------------------
// Short TTL, background sweep ticking, reads and writes interleaved.

fn bench_churn(c: &mut Criterion) {
    let cancel = CancellationToken::new();
    let cache: solo::Cache<u64, u64> = CacheBuilder::new(Duration::from_millis(5))
        .cancellation(cancel.clone())
        .build();
    let sweeper = cache.schedule_purge(Duration::from_millis(1));

    let mut group = c.benchmark_group("churn");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function("solo", |b| {
        b.iter(|| {
            for i in 0..OPS {
                let key = i % 256;
                if i % 4 == 0 {
                    cache.set(black_box(key), black_box(i));
                } else {
                    black_box(cache.get(black_box(&key)));
                }
            }
        })
    });
    group.finish();

    cancel.cancel();
    sweeper.join();
}

criterion_group!(
    benches,
    bench_get_hit,
    bench_get_miss,
    bench_set,
    bench_get_or_refresh_hit,
    bench_churn
);
criterion_main!(benches);
