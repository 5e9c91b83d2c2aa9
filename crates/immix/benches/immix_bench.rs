//! Immix Benchmarks
//!
//! Region allocation, full-cycle tracing and inflated header churn.
//! Run with: `cargo bench --package immix`

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use immix::{Address, ImmixCollector, ImmixConfig, Memory, RuntimeState};
use std::sync::Arc;

fn create_collector() -> ImmixCollector {
    ImmixCollector::new(Arc::new(Memory::new(ImmixConfig::default()))).unwrap()
}

/// Linked list of `len` region objects rooted at its head
fn build_list(gc: &mut ImmixCollector, runtime: &mut RuntimeState, len: usize) {
    let mut prev = Address::null();
    for _ in 0..len {
        let node = gc.allocate(48).unwrap();
        if !prev.is_null() {
            gc.memory().push_field(node, prev).unwrap();
        }
        prev = node;
    }
    runtime.roots.push(prev);
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");

    for size in [16usize, 128, 1024] {
        group.throughput(Throughput::Elements(1_000));
        group.bench_function(format!("region_{}b_x1000", size), |b| {
            b.iter_batched(
                create_collector,
                |mut gc| {
                    for _ in 0..1_000 {
                        black_box(gc.allocate(size));
                    }
                    gc
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_full_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_cycle");

    for len in [1_000usize, 10_000] {
        group.throughput(Throughput::Elements(len as u64));
        group.bench_function(format!("live_list_{}", len), |b| {
            b.iter_batched(
                || {
                    let mut gc = create_collector();
                    let mut runtime = RuntimeState::new();
                    build_list(&mut gc, &mut runtime, len);
                    (gc, runtime)
                },
                |(mut gc, mut runtime)| {
                    gc.collect(&mut runtime.gc_data()).unwrap();
                    (gc, runtime)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.bench_function("all_garbage_10000", |b| {
        b.iter_batched(
            || {
                let mut gc = create_collector();
                for _ in 0..10_000 {
                    gc.allocate(64).unwrap();
                }
                (gc, RuntimeState::new())
            },
            |(mut gc, mut runtime)| {
                gc.collect(&mut runtime.gc_data()).unwrap();
                (gc, runtime)
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_inflated_headers(c: &mut Criterion) {
    let mut group = c.benchmark_group("inflated_headers");

    group.bench_function("inflate_and_sweep_1000", |b| {
        b.iter_batched(
            || {
                let mut gc = create_collector();
                let owners: Vec<Address> = (0..1_000).map(|_| gc.allocate(32).unwrap()).collect();
                (gc, owners)
            },
            |(gc, owners)| {
                for owner in &owners {
                    black_box(gc.memory().inflate_header(*owner).unwrap());
                }
                let mark = gc.memory().mark();
                black_box(gc.memory().deallocate_inflated_headers(mark));
                gc
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_allocation,
    bench_full_cycle,
    bench_inflated_headers
);
criterion_main!(benches);
