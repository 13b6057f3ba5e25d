//! # Pressroom
//!
//! A bounded broadcast buffer with per-subscriber cursors and explicit
//! backpressure policies: one producer, many subscribers consuming the same
//! sequence at different rates.
//!
//! ## Core Concepts
//!
//! - **Buffer**: bounded slots shared by all subscriptions, optional retention window
//! - **Overflow policy**: drop the new item, evict the oldest, or block the producer
//! - **Subscriptions**: forward-only cursors; pulling is the demand signal
//! - **Coordinator**: waits for every subscriber with a bounded grace period
//!
//! ## Example
//!
//! ```ignore
//! use pressroom::{Pipeline, PipelineConfig, SubscriberConfig};
//! use std::time::Duration;
//!
//! let config = PipelineConfig {
//!     producer_delay: Duration::from_millis(10),
//!     subscribers: vec![
//!         SubscriberConfig::new("jack", Duration::ZERO),
//!         SubscriberConfig::new("pete", Duration::from_millis(30)),
//!     ],
//!     ..Default::default()
//! };
//!
//! let report = Pipeline::new(config)?.run()?;
//! println!("pete missed {} magazines", report.subscriber("pete").unwrap().skipped);
//! ```

pub mod buffer;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod producer;
pub mod subscribers;
pub mod types;

// Re-exports
pub use buffer::{
    BroadcastBuffer, BufferConfig, BufferStats, Canceller, Next, OverflowPolicy, Retention,
    StartFrom, Subscription, WriteOutcome,
};
pub use coordinator::Coordinator;
pub use error::{FlowError, HandlerError, Result};
pub use events::{EventSink, FlowEvent, JsonLinesSink, MemorySink, TracingSink};
pub use pipeline::{Pipeline, PipelineConfig, RunReport};
pub use producer::{Emission, Producer, ProducerHandle, ProducerStats};
pub use subscribers::{
    spawn_subscriber, ErrorPolicy, GapPolicy, ItemHandler, LogHandler, SubscriberConfig,
    SubscriberHandle, SubscriberReport,
};
pub use types::*;
