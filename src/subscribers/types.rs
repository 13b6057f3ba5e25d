//! Subscriber configuration, handlers and reports.

use crate::buffer::StartFrom;
use crate::error::{FlowError, HandlerError, Result};
use crate::types::{Item, SubscriberState};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// What a subscriber does when its cursor skips evicted or expired items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Record the gap and carry on.
    #[default]
    Skip,
    /// Treat any gap as a subscriber error.
    Strict,
}

/// What a subscriber does when its handler fails on an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Record the failure and keep consuming.
    #[default]
    LogOnly,
    /// End the subscriber in the `Errored` state.
    Propagate,
}

/// Configuration for one subscriber.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Name used in logs, events and reports. Must be unique per pipeline.
    pub name: String,

    /// Simulated processing time per item.
    pub delay: Duration,

    #[serde(default)]
    pub gap_policy: GapPolicy,

    #[serde(default)]
    pub start: StartFrom,
}

impl SubscriberConfig {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            gap_policy: GapPolicy::Skip,
            start: StartFrom::Oldest,
        }
    }

    /// Fail on the first gap instead of skipping it.
    pub fn strict(mut self) -> Self {
        self.gap_policy = GapPolicy::Strict;
        self
    }

    pub fn start_from(mut self, start: StartFrom) -> Self {
        self.start = start;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FlowError::InvalidConfig(
                "subscriber name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Processes items on behalf of a subscriber.
pub trait ItemHandler: Send + 'static {
    fn on_item(&mut self, subscriber: &str, item: Item) -> std::result::Result<(), HandlerError>;
}

impl<F> ItemHandler for F
where
    F: FnMut(&str, Item) -> std::result::Result<(), HandlerError> + Send + 'static,
{
    fn on_item(&mut self, subscriber: &str, item: Item) -> std::result::Result<(), HandlerError> {
        self(subscriber, item)
    }
}

/// Default handler: logs each received item.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogHandler;

impl ItemHandler for LogHandler {
    fn on_item(&mut self, subscriber: &str, item: Item) -> std::result::Result<(), HandlerError> {
        info!("===========> {} got magazine {}", subscriber, item);
        Ok(())
    }
}

/// Final outcome of one subscriber.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubscriberReport {
    pub name: String,
    pub state: SubscriberState,
    /// Items handled successfully, in delivery order.
    pub delivered: Vec<Item>,
    /// Positions skipped because they were evicted or expired.
    pub skipped: u64,
    /// Handler failures that did not end the subscriber.
    pub failures: u64,
}

impl SubscriberReport {
    /// True when `delivered` is missing an integer between its first and last item.
    pub fn has_interior_gap(&self) -> bool {
        self.delivered.windows(2).any(|w| w[1].0 > w[0].0 + 1)
    }

    pub fn is_strictly_increasing(&self) -> bool {
        self.delivered.windows(2).all(|w| w[0] < w[1])
    }
}
