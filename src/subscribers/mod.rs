//! Subscriber harness.
//!
//! A subscriber pulls from its [`Subscription`](crate::Subscription) at its own
//! pace on a dedicated thread:
//! - Gaps (evicted or expired items) are recorded, or fail the subscriber in
//!   strict mode
//! - Each item waits out the configured processing delay before the handler runs
//! - Handler failures are logged or end the subscriber, per [`ErrorPolicy`]
//!
//! # Example
//!
//! ```ignore
//! let (tx, rx) = crossbeam_channel::unbounded();
//! let subscription = buffer.subscribe(StartFrom::Oldest);
//! let handle = spawn_subscriber(
//!     SubscriberConfig::new("pete", Duration::from_millis(3000)),
//!     subscription,
//!     Box::new(LogHandler),
//!     ErrorPolicy::LogOnly,
//!     sink,
//!     tx,
//! )?;
//! let report = rx.recv()?;
//! ```

mod harness;
mod types;

pub use harness::{spawn_subscriber, SubscriberHandle};
pub use types::{
    ErrorPolicy, GapPolicy, ItemHandler, LogHandler, SubscriberConfig, SubscriberReport,
};
