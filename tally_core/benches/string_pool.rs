//! Constants Area Benchmarks
//!
//! Measures interning cost for the constants area of a compilation unit.
//!
//! # Key Metrics
//!
//! - Hit path (already interned): single hash lookup
//! - Miss path: append plus map insert

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tally_core::StringPool;

// =============================================================================
// Interning
// =============================================================================

fn bench_intern_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("intern_hit");

    group.bench_function("short_label", |b| {
        let mut pool = StringPool::new();
        pool.intern("customer_id").unwrap();
        b.iter(|| black_box(pool.intern(black_box("customer_id")).unwrap()))
    });

    group.bench_function("long_text", |b| {
        let mut pool = StringPool::new();
        let text = "x".repeat(512);
        pool.intern(&text).unwrap();
        b.iter(|| black_box(pool.intern(black_box(&text)).unwrap()))
    });

    group.finish();
}

fn bench_intern_fresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("intern_fresh");

    for count in [16usize, 256, 4096] {
        let labels: Vec<String> = (0..count).map(|i| format!("field_{i}")).collect();
        group.bench_with_input(BenchmarkId::new("labels", count), &labels, |b, labels| {
            b.iter(|| {
                let mut pool = StringPool::new();
                for label in labels {
                    black_box(pool.intern(label).unwrap());
                }
                black_box(pool.len())
            })
        });
    }

    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(string_pool_benches, bench_intern_hit, bench_intern_fresh);

criterion_main!(string_pool_benches);
