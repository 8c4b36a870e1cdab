use crate::{
    AtomicCorrelationIdAllocator, CorrelationIdAllocator, HmiCorrelationId,
    LockCorrelationIdAllocator,
};
use std::collections::HashSet;
use std::sync::Mutex;
use std::thread::scope;

fn run_allocator_starts_at_one<A>(allocator: &A)
where
    A: CorrelationIdAllocator,
{
    assert_eq!(allocator.next_id(), 1);
    assert_eq!(allocator.next_id(), 2);
    assert_eq!(allocator.next_id(), 3);
}

fn run_allocator_wraps_exactly_once<A>(allocator: &A)
where
    A: CorrelationIdAllocator,
{
    let max = allocator.max_id();
    let calls = max as usize + 2;
    let ids: Vec<HmiCorrelationId> = (0..calls).map(|_| allocator.next_id()).collect();

    assert_eq!(ids.iter().filter(|&&id| id == 0).count(), 1);
    assert!(ids.iter().all(|&id| id <= max));
    assert_eq!(ids[max as usize - 1], max);
    assert_eq!(ids[max as usize], 0);
    assert_eq!(ids[max as usize + 1], 1);
}

fn run_allocator_unique_across_threads<A>(allocator: &A)
where
    A: CorrelationIdAllocator,
{
    const IDS_PER_THREAD: usize = 1024;
    let threads = num_cpus::get().clamp(2, 8);
    let seen = Mutex::new(HashSet::with_capacity(threads * IDS_PER_THREAD));

    scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                let local: Vec<_> = (0..IDS_PER_THREAD).map(|_| allocator.next_id()).collect();
                let mut seen = seen.lock().unwrap();
                for id in local {
                    assert!(seen.insert(id), "duplicate id {id}");
                }
            });
        }
    });

    assert_eq!(seen.lock().unwrap().len(), threads * IDS_PER_THREAD);
}

#[test]
fn atomic_allocator_starts_at_one() {
    run_allocator_starts_at_one(&AtomicCorrelationIdAllocator::new());
}

#[test]
fn lock_allocator_starts_at_one() {
    run_allocator_starts_at_one(&LockCorrelationIdAllocator::new());
}

#[test]
fn atomic_allocator_wraps_exactly_once() {
    run_allocator_wraps_exactly_once(&AtomicCorrelationIdAllocator::with_max(16));
}

#[test]
fn lock_allocator_wraps_exactly_once() {
    run_allocator_wraps_exactly_once(&LockCorrelationIdAllocator::with_max(16));
}

#[test]
fn atomic_allocator_unique_across_threads() {
    run_allocator_unique_across_threads(&AtomicCorrelationIdAllocator::new());
}

#[test]
fn lock_allocator_unique_across_threads() {
    run_allocator_unique_across_threads(&LockCorrelationIdAllocator::new());
}

#[test]
fn full_range_allocator_wraps_at_u32_max() {
    let allocator = AtomicCorrelationIdAllocator::from_current(u32::MAX - 1, u32::MAX);
    assert_eq!(allocator.next_id(), u32::MAX);
    assert_eq!(allocator.next_id(), 0);
    assert_eq!(allocator.next_id(), 1);

    let allocator = LockCorrelationIdAllocator::from_current(u32::MAX, u32::MAX);
    assert_eq!(allocator.next_id(), 0);
}

#[test]
fn from_current_clamps_to_ceiling() {
    let allocator = AtomicCorrelationIdAllocator::from_current(50, 10);
    assert_eq!(allocator.current(), 10);
    assert_eq!(allocator.next_id(), 0);

    let allocator = LockCorrelationIdAllocator::from_current(50, 10);
    assert_eq!(allocator.current(), 10);
    assert_eq!(allocator.next_id(), 0);
}

#[test]
fn zero_ceiling_always_returns_zero() {
    let allocator = AtomicCorrelationIdAllocator::with_max(0);
    assert_eq!(allocator.next_id(), 0);
    assert_eq!(allocator.next_id(), 0);
}
