//! Property tests for buffer invariants, driven single-threaded.

use pressroom::{
    BroadcastBuffer, BufferConfig, DropReason, Item, MemorySink, Next, OverflowPolicy, StartFrom,
    Subscription, WriteOutcome,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Op {
    Write,
    Read(usize),
    Subscribe,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Write),
        3 => (0usize..3).prop_map(Op::Read),
        1 => Just(Op::Subscribe),
    ]
}

fn policy_strategy() -> impl Strategy<Value = OverflowPolicy> {
    prop_oneof![Just(OverflowPolicy::Drop), Just(OverflowPolicy::EvictOldest)]
}

struct Reader {
    sub: Subscription,
    delivered: Vec<Item>,
    /// Items retained when the subscription was opened.
    retained_at_start: HashSet<Item>,
    /// Last item written before the subscription was opened.
    written_before: u64,
}

proptest! {
    #[test]
    fn delivery_is_ordered_and_bounded(
        capacity in 1usize..6,
        policy in policy_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..80),
    ) {
        let sink = Arc::new(MemorySink::new());
        let buffer = BroadcastBuffer::new(
            BufferConfig::with_capacity(capacity).overflow(policy),
            sink.clone(),
        ).unwrap();

        let mut readers: Vec<Reader> = Vec::new();
        let mut next_value = 1u64;

        for op in ops {
            match op {
                Op::Write => {
                    buffer.write(Item(next_value)).unwrap();
                    next_value += 1;
                }
                Op::Read(i) => {
                    if let Some(reader) = readers.get_mut(i) {
                        if let Some(Next::Item { item, .. }) = reader.sub.try_next() {
                            reader.delivered.push(item);
                        }
                    }
                }
                Op::Subscribe => {
                    let retained_at_start = buffer.retained().into_iter().collect();
                    readers.push(Reader {
                        sub: buffer.subscribe(StartFrom::Oldest),
                        delivered: Vec::new(),
                        retained_at_start,
                        written_before: next_value - 1,
                    });
                }
            }
            prop_assert!(buffer.stats().retained <= capacity);
        }

        buffer.complete();
        for reader in readers.iter_mut() {
            loop {
                match reader.sub.next() {
                    Next::Item { item, .. } => reader.delivered.push(item),
                    _ => break,
                }
            }
        }

        for reader in &readers {
            // Strictly increasing: never reordered, never duplicated.
            prop_assert!(reader.delivered.windows(2).all(|w| w[0] < w[1]));
            // Nothing older than what was retained at subscribe time is replayed.
            for item in &reader.delivered {
                prop_assert!(
                    item.0 > reader.written_before || reader.retained_at_start.contains(item)
                );
            }
        }

        let drops = sink.drops();
        match policy {
            OverflowPolicy::Drop => {
                prop_assert!(drops.iter().all(|d| d.reason == DropReason::Overflow));
                let dropped: HashSet<Item> = drops.iter().map(|d| d.item).collect();
                for reader in &readers {
                    prop_assert!(reader.delivered.iter().all(|i| !dropped.contains(i)));
                }
            }
            _ => prop_assert!(drops.iter().all(|d| d.reason == DropReason::Evicted)),
        }
    }

    #[test]
    fn keeping_up_never_drops(
        capacity in 1usize..9,
        count in 1u64..60,
    ) {
        let sink = Arc::new(MemorySink::new());
        let buffer = BroadcastBuffer::new(BufferConfig::with_capacity(capacity), sink.clone()).unwrap();
        let mut sub = buffer.subscribe(StartFrom::Oldest);

        let mut delivered = Vec::new();
        for i in 1..=count {
            let outcome = buffer.write(Item(i)).unwrap();
            prop_assert!(matches!(outcome, WriteOutcome::Accepted(_)));
            if let Some(Next::Item { item, skipped }) = sub.try_next() {
                prop_assert_eq!(skipped, 0);
                delivered.push(item);
            }
        }

        prop_assert!(sink.drops().is_empty());
        prop_assert_eq!(delivered, (1..=count).map(Item).collect::<Vec<_>>());
    }

    #[test]
    fn drops_only_grow(
        capacity in 1usize..5,
        count in 5u64..40,
        read_every in 2u64..6,
    ) {
        let sink = Arc::new(MemorySink::new());
        let buffer = BroadcastBuffer::new(BufferConfig::with_capacity(capacity), sink.clone()).unwrap();
        let mut sub = buffer.subscribe(StartFrom::Oldest);

        let mut last = 0usize;
        for i in 1..=count {
            buffer.write(Item(i)).unwrap();
            if i % read_every == 0 {
                sub.try_next();
            }
            let now = sink.drops().len();
            prop_assert!(now >= last);
            last = now;
        }
        prop_assert_eq!(buffer.stats().dropped as usize, last);
    }
}
