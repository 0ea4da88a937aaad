//! # Contention Benchmark
//!
//! Measures:
//! 1. Uncontended acquire/release and down/up round trips
//! 2. Lock throughput with several threads hammering one segment
//! 3. Cost of the spin phase versus parking straight away

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use synch::{Lock, Sema, WaitConfig};

/// Single thread, no contention: pure atomic cost.
fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended");

    let lock = Lock::default();
    group.bench_function("lock_acquire_release", |b| {
        b.iter(|| {
            black_box(lock.acquire_blocking());
            black_box(lock.release());
        });
    });

    let sema = Sema::default();
    group.bench_function("sema_down_up", |b| {
        b.iter(|| {
            black_box(sema.down_blocking());
            black_box(sema.up());
        });
    });

    group.finish();
}

fn run_contended(config: WaitConfig, threads: usize, iterations: usize) {
    let lock = Lock::with_config(0, config).unwrap_or_default();
    let barrier = Arc::new(Barrier::new(threads));
    let workers: Vec<_> = (0..threads)
        .map(|_| {
            let segment = lock.segment().clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let Ok(lock) = Lock::attach(&segment, None) else {
                    return;
                };
                barrier.wait();
                for _ in 0..iterations {
                    if lock.acquire_blocking() {
                        black_box(lock.holder());
                        lock.release();
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        let _ = worker.join();
    }
}

/// N threads sharing one lock segment.
fn bench_contended_lock(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_lock");
    group.sample_size(10);

    for threads in [2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("spin_64", threads), &threads, |b, &threads| {
            b.iter(|| run_contended(WaitConfig::default(), threads, 1_000));
        });
        group.bench_with_input(BenchmarkId::new("no_spin", threads), &threads, |b, &threads| {
            b.iter(|| run_contended(WaitConfig::no_spin(), threads, 1_000));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_contended_lock);
criterion_main!(benches);
