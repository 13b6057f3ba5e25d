//! Performance benchmarks for the broadcast buffer.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pressroom::{
    BroadcastBuffer, BufferConfig, EventSink, FlowEvent, Item, Next, OverflowPolicy, StartFrom,
};
use std::sync::Arc;

/// Discards every event so the benchmarks measure the buffer only.
struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &FlowEvent) {}
}

fn buffer(config: BufferConfig) -> Arc<BroadcastBuffer> {
    BroadcastBuffer::new(config, Arc::new(NullSink)).unwrap()
}

/// Write then read, with a varying number of subscriptions keeping up.
fn bench_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_read");

    for subscribers in [1, 2, 8] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &n| {
                let buffer = buffer(BufferConfig::with_capacity(1024));
                let mut subs: Vec<_> = (0..n).map(|_| buffer.subscribe(StartFrom::Oldest)).collect();
                let mut value = 0u64;

                b.iter(|| {
                    value += 1;
                    buffer.write(Item(value)).unwrap();
                    for sub in subs.iter_mut() {
                        black_box(sub.try_next());
                    }
                });
            },
        );
    }

    group.finish();
}

/// Writes against a subscription that never reads, per overflow policy.
fn bench_saturated_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("saturated_write");

    for (name, policy) in [
        ("drop", OverflowPolicy::Drop),
        ("evict_oldest", OverflowPolicy::EvictOldest),
    ] {
        group.bench_function(name, |b| {
            let buffer = buffer(BufferConfig::with_capacity(64).overflow(policy));
            let _idle = buffer.subscribe(StartFrom::Oldest);
            let mut value = 0u64;

            b.iter(|| {
                value += 1;
                black_box(buffer.write(Item(value)).unwrap());
            });
        });
    }

    group.finish();
}

/// Late subscriber draining a full buffer.
fn bench_replay(c: &mut Criterion) {
    c.bench_function("replay_1024", |b| {
        let buffer = buffer(BufferConfig::with_capacity(1024));
        for i in 1..=1024 {
            buffer.write(Item(i)).unwrap();
        }
        buffer.complete();

        b.iter(|| {
            let mut sub = buffer.subscribe(StartFrom::Oldest);
            let mut count = 0;
            while let Next::Item { .. } = sub.next() {
                count += 1;
            }
            black_box(count)
        });
    });
}

criterion_group!(benches, bench_write_read, bench_saturated_write, bench_replay);
criterion_main!(benches);
