//! Trace arena benchmark.
//!
//! Measures allocation from the free list against growth, and the cost of a
//! full mark-and-sweep pass over long backpointer chains.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use wfst_decoder::search::{TraceArena, TraceMode};
use wfst_decoder::types::{Label, TraceRef};

fn add(arena: &mut TraceArena, pred: TraceRef, time: u32) -> TraceRef {
    arena.add_trace(
        TraceRef::INVALID,
        pred,
        Label::EPSILON,
        Label(1),
        time,
        time as f32,
        0.0,
        false,
    )
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Trace Allocation");

    for increment in [64, 512, 4096] {
        group.bench_with_input(
            BenchmarkId::new("Fresh Arena", increment),
            &increment,
            |b, &increment| {
                b.iter(|| {
                    let mut arena = TraceArena::new(increment, TraceMode::FirstBest);
                    let mut pred = TraceRef::INVALID;
                    for t in 0..10_000 {
                        pred = add(&mut arena, pred, t);
                    }
                    black_box(arena.capacity());
                });
            },
        );
    }

    // steady state: every slot comes from the free list
    group.bench_function("Free List Reuse", |b| {
        let mut arena = TraceArena::new(512, TraceMode::FirstBest);
        for t in 0..10_000 {
            add(&mut arena, TraceRef::INVALID, t);
        }
        arena.purge(std::iter::empty());
        b.iter(|| {
            for t in 0..10_000 {
                add(&mut arena, TraceRef::INVALID, t);
            }
            black_box(arena.purge(std::iter::empty()));
        });
    });

    group.finish();
}

fn bench_purge(c: &mut Criterion) {
    let mut group = c.benchmark_group("Trace Purge");

    for hypotheses in [10usize, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("Live Chains", hypotheses),
            &hypotheses,
            |b, &hypotheses| {
                let mut arena = TraceArena::new(512, TraceMode::Lattice);
                let root = add(&mut arena, TraceRef::INVALID, 0);
                let mut heads = vec![root; hypotheses];
                for t in 1..200 {
                    for head in heads.iter_mut() {
                        *head = add(&mut arena, *head, t);
                    }
                }
                b.iter(|| black_box(arena.purge(heads.iter().copied())));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_allocation, bench_purge);
criterion_main!(benches);
