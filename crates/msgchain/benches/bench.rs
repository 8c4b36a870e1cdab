use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use msgchain::{
    AtomicCorrelationIdAllocator, CorrelationIdAllocator, DecreaseStatus,
    LockCorrelationIdAllocator, MessageChainStore,
};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

// Number of IDs allocated per benchmark iteration (per-thread for
// multi-threaded).
const TOTAL_IDS: usize = 4096;

// Mobile requests registered per store benchmark iteration.
const TOTAL_REQUESTS: usize = 256;

/// Benchmarks an allocator on a single thread.
fn bench_allocator<A>(c: &mut Criterion, group_name: &str, allocator_fn: impl Fn() -> A)
where
    A: CorrelationIdAllocator,
{
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{}", TOTAL_IDS), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let allocator = allocator_fn();
                for _ in 0..TOTAL_IDS {
                    black_box(allocator.next_id());
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks a shared allocator across threads.
fn bench_allocator_contended<A>(c: &mut Criterion, group_name: &str, allocator_fn: impl Fn() -> A)
where
    A: CorrelationIdAllocator,
{
    let mut group = c.benchmark_group(group_name);

    for thread_count in [1, 2, 4, 8, 16] {
        let ids_per_thread = TOTAL_IDS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_IDS as u64));
        group.bench_function(
            format!("elems/{}/threads/{}", TOTAL_IDS, thread_count),
            |b| {
                b.iter_custom(|iters| {
                    let start = Instant::now();

                    for _ in 0..iters {
                        let allocator = Arc::new(allocator_fn());
                        let barrier = Arc::new(Barrier::new(thread_count + 1));
                        scope(|s| {
                            for _ in 0..thread_count {
                                let allocator = Arc::clone(&allocator);
                                let barrier = Arc::clone(&barrier);
                                s.spawn(move || {
                                    barrier.wait();
                                    for _ in 0..ids_per_thread {
                                        black_box(allocator.next_id());
                                    }
                                });
                            }
                            barrier.wait();
                        });
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

/// Benchmarks a full fan-out/fan-in cycle: every mobile request registers
/// `legs` HMI requests and then receives all of their responses.
fn bench_store_fan_out(c: &mut Criterion, group_name: &str, legs: usize) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements((TOTAL_REQUESTS * legs) as u64));

    group.bench_function(format!("requests/{}/legs/{}", TOTAL_REQUESTS, legs), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let store = MessageChainStore::<()>::new();
                let allocator = AtomicCorrelationIdAllocator::new();
                let mut ids = Vec::with_capacity(TOTAL_REQUESTS * legs);

                for mobile_id in 0..TOTAL_REQUESTS as u32 {
                    let first = allocator.next_id();
                    let Ok(chain) = store.add_message_chain(1, mobile_id, first, None, None)
                    else {
                        unreachable!()
                    };
                    ids.push(first);
                    for _ in 1..legs {
                        let id = allocator.next_id();
                        if store
                            .add_message_chain(1, mobile_id, id, Some(&chain), None)
                            .is_err()
                        {
                            unreachable!()
                        }
                        ids.push(id);
                    }
                }

                for id in ids {
                    match store.decrease_message_chain(id) {
                        DecreaseStatus::Unmatched => unreachable!(),
                        status => {
                            black_box(status);
                        }
                    }
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

fn benchmark_sequential_lock(c: &mut Criterion) {
    bench_allocator(c, "allocator/sequential/lock", LockCorrelationIdAllocator::new);
}

fn benchmark_sequential_atomic(c: &mut Criterion) {
    bench_allocator(c, "allocator/sequential/atomic", AtomicCorrelationIdAllocator::new);
}

fn benchmark_contended_lock(c: &mut Criterion) {
    bench_allocator_contended(c, "allocator/contended/lock", LockCorrelationIdAllocator::new);
}

fn benchmark_contended_atomic(c: &mut Criterion) {
    bench_allocator_contended(
        c,
        "allocator/contended/atomic",
        AtomicCorrelationIdAllocator::new,
    );
}

fn benchmark_store_single_leg(c: &mut Criterion) {
    bench_store_fan_out(c, "store/fan-out", 1);
}

fn benchmark_store_multi_leg(c: &mut Criterion) {
    bench_store_fan_out(c, "store/fan-out", 4);
}

criterion_group!(
    benches,
    // Allocators
    benchmark_sequential_lock,
    benchmark_sequential_atomic,
    benchmark_contended_lock,
    benchmark_contended_atomic,
    // Chain store
    benchmark_store_single_leg,
    benchmark_store_multi_leg,
);
criterion_main!(benches);
