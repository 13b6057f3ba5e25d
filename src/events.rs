//! Observability events and sinks.
//!
//! The buffer, the subscriber harness and the coordinator report what happens
//! through a single capability, [`EventSink::record`]. Three sinks ship with
//! the crate:
//! - [`TracingSink`]: forwards every event to `tracing` (default)
//! - [`MemorySink`]: keeps events in memory for inspection
//! - [`JsonLinesSink`]: writes one JSON object per line to any writer

use crate::types::{DropRecord, Item};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Something worth reporting.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    /// A subscriber finished processing an item.
    ItemDelivered { subscriber: String, item: Item },

    /// The buffer discarded an item.
    ItemDropped { record: DropRecord },

    /// A subscription's cursor skipped positions lost to eviction or expiry.
    GapSkipped {
        subscriber: String,
        missed: u64,
        /// First item delivered after the gap, `None` at end-of-stream.
        resumed_with: Option<Item>,
    },

    /// A handler returned an error for an item.
    HandlerFailed {
        subscriber: String,
        item: Item,
        error: String,
    },

    SubscriberCompleted { subscriber: String, delivered: u64 },

    SubscriberErrored { subscriber: String, reason: String },

    SubscriberCancelled { subscriber: String, delivered: u64 },

    /// The coordinator gave up waiting.
    CompletionTimeout { pending: Vec<String>, grace: Duration },
}

/// Destination for [`FlowEvent`]s.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &FlowEvent);
}

/// Logs every event through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &FlowEvent) {
        match event {
            FlowEvent::ItemDelivered { subscriber, item } => {
                debug!(subscriber = %subscriber, item = %item, "delivered");
            }
            FlowEvent::ItemDropped { record } => {
                error!(item = %record.item, reason = %record.reason, "Dropped! {}", record.item);
            }
            FlowEvent::GapSkipped {
                subscriber,
                missed,
                resumed_with,
            } => {
                warn!(subscriber = %subscriber, missed, ?resumed_with, "cursor skipped evicted items");
            }
            FlowEvent::HandlerFailed {
                subscriber,
                item,
                error,
            } => {
                warn!(subscriber = %subscriber, item = %item, error = %error, "handler failed");
            }
            FlowEvent::SubscriberCompleted {
                subscriber,
                delivered,
            } => {
                info!(subscriber = %subscriber, delivered, "subscriber completed");
            }
            FlowEvent::SubscriberErrored { subscriber, reason } => {
                error!(subscriber = %subscriber, reason = %reason, "subscriber errored");
            }
            FlowEvent::SubscriberCancelled {
                subscriber,
                delivered,
            } => {
                warn!(subscriber = %subscriber, delivered, "subscriber cancelled");
            }
            FlowEvent::CompletionTimeout { pending, grace } => {
                error!(?pending, ?grace, "subscribers did not finish within grace period");
            }
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<FlowEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in recording order.
    pub fn events(&self) -> Vec<FlowEvent> {
        self.events.lock().clone()
    }

    /// Drop records, in recording order.
    pub fn drops(&self) -> Vec<DropRecord> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                FlowEvent::ItemDropped { record } => Some(*record),
                _ => None,
            })
            .collect()
    }

    /// Items delivered to one subscriber, in delivery order.
    pub fn delivered_to(&self, subscriber: &str) -> Vec<Item> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                FlowEvent::ItemDelivered {
                    subscriber: s,
                    item,
                } if s == subscriber => Some(*item),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &FlowEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Writes each event as one line of JSON.
///
/// Write failures are logged and otherwise ignored; observability must not
/// stall the pipeline.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> crate::Result<W> {
        let mut writer = self.writer.into_inner();
        writer.flush()?;
        Ok(writer)
    }

    fn write_event(&self, event: &FlowEvent) -> crate::Result<()> {
        let line = serde_json::to_string(event)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        Ok(())
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn record(&self, event: &FlowEvent) {
        if let Err(e) = self.write_event(event) {
            warn!(error = %e, "failed to write event line");
        }
    }
}

/// Fans one event out to several sinks.
impl<S: EventSink> EventSink for Vec<S> {
    fn record(&self, event: &FlowEvent) {
        for sink in self {
            sink.record(event);
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn record(&self, event: &FlowEvent) {
        (**self).record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DropReason, Position};

    #[test]
    fn test_memory_sink_filters() {
        let sink = MemorySink::new();
        sink.record(&FlowEvent::ItemDelivered {
            subscriber: "jack".to_string(),
            item: Item(1),
        });
        sink.record(&FlowEvent::ItemDelivered {
            subscriber: "pete".to_string(),
            item: Item(1),
        });
        sink.record(&FlowEvent::ItemDropped {
            record: DropRecord {
                item: Item(2),
                position: None,
                reason: DropReason::Overflow,
            },
        });
        sink.record(&FlowEvent::ItemDelivered {
            subscriber: "jack".to_string(),
            item: Item(3),
        });

        assert_eq!(sink.len(), 4);
        assert_eq!(sink.delivered_to("jack"), vec![Item(1), Item(3)]);
        assert_eq!(sink.delivered_to("pete"), vec![Item(1)]);
        assert_eq!(sink.drops().len(), 1);
        assert_eq!(sink.drops()[0].item, Item(2));
    }

    #[test]
    fn test_json_lines_format() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.record(&FlowEvent::ItemDropped {
            record: DropRecord {
                item: Item(7),
                position: Some(Position(3)),
                reason: DropReason::Expired,
            },
        });
        sink.record(&FlowEvent::SubscriberCompleted {
            subscriber: "jack".to_string(),
            delivered: 20,
        });

        let bytes = sink.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "item_dropped");
        assert_eq!(first["record"]["item"], 7);
        assert_eq!(first["record"]["reason"], "expired");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["type"], "subscriber_completed");
        assert_eq!(second["delivered"], 20);
    }

    #[test]
    fn test_fan_out_records_everywhere() {
        let sinks = vec![
            std::sync::Arc::new(MemorySink::new()),
            std::sync::Arc::new(MemorySink::new()),
        ];
        sinks.record(&FlowEvent::SubscriberCancelled {
            subscriber: "pete".to_string(),
            delivered: 2,
        });
        assert_eq!(sinks[0].len(), 1);
        assert_eq!(sinks[1].len(), 1);
    }
}
