//! # Sequence Tracker Benchmarks
//!
//! Classification cost for in-order streams, lossy streams that keep the
//! interval list full, and shuffled delivery.

use criterion::{black_box, BatchSize, Criterion, Throughput};
use gss_context::SequenceTracker;
use rand::seq::SliceRandom;
use rand::SeedableRng;

const STREAM_LEN: u32 = 10_000;

pub fn in_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence");
    group.throughput(Throughput::Elements(u64::from(STREAM_LEN)));

    group.bench_function("in_order", |b| {
        b.iter_batched(
            || SequenceTracker::new(1_000),
            |mut tracker| {
                for n in 1_000..1_000 + STREAM_LEN {
                    black_box(tracker.classify(n));
                }
                tracker
            },
            BatchSize::SmallInput,
        )
    });

    // Every other number lost: each arrival is a gap and evicts an interval
    group.bench_function("lossy", |b| {
        b.iter_batched(
            || SequenceTracker::new(0),
            |mut tracker| {
                for n in (0..STREAM_LEN * 2).step_by(2) {
                    black_box(tracker.classify(n));
                }
                tracker
            },
            BatchSize::SmallInput,
        )
    });

    let mut shuffled: Vec<u32> = (0..STREAM_LEN).collect();
    shuffled.shuffle(&mut rand::rngs::StdRng::seed_from_u64(7));
    group.bench_function("shuffled", |b| {
        b.iter_batched(
            || SequenceTracker::new(0),
            |mut tracker| {
                for &n in &shuffled {
                    black_box(tracker.classify(n));
                }
                tracker
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}
