//! Bounded broadcast buffer.
//!
//! A single producer writes items; every [`Subscription`] reads the same
//! sequence through its own cursor. Memory is bounded by a slot capacity and,
//! optionally, a retention window. When all slots hold unread data the
//! [`OverflowPolicy`] decides between dropping the new item, evicting the
//! oldest one or parking the producer.
//!
//! # Example
//!
//! ```
//! use pressroom::{BroadcastBuffer, BufferConfig, Item, Next, StartFrom};
//!
//! let buffer = BroadcastBuffer::with_tracing(BufferConfig::with_capacity(4)).unwrap();
//! let mut sub = buffer.subscribe(StartFrom::Oldest);
//!
//! buffer.write(Item(1)).unwrap();
//! buffer.complete();
//!
//! assert_eq!(sub.next(), Next::Item { item: Item(1), skipped: 0 });
//! assert_eq!(sub.next(), Next::Completed { skipped: 0 });
//! ```

mod broadcast;
mod config;
mod subscription;

pub use broadcast::{BroadcastBuffer, BufferStats, WriteOutcome};
pub use config::{
    BufferConfig, OverflowPolicy, Retention, StartFrom, DEFAULT_CAPACITY,
    DEFAULT_RETENTION_WINDOW,
};
pub use subscription::{Canceller, Next, Subscription};
