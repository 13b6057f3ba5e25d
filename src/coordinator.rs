//! Completion coordinator.
//!
//! Every subscriber sends exactly one [`SubscriberReport`] when it reaches a
//! terminal state. The coordinator counts reports against the registered
//! names and gives up once the grace period elapses.

use crate::error::{FlowError, Result};
use crate::events::{EventSink, FlowEvent};
use crate::subscribers::SubscriberReport;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Waits for a fixed set of subscribers to finish.
pub struct Coordinator {
    expected: Vec<String>,
    sender: Sender<SubscriberReport>,
    receiver: Receiver<SubscriberReport>,
    sink: Arc<dyn EventSink>,
}

impl Coordinator {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            expected: Vec::new(),
            sender,
            receiver,
            sink,
        }
    }

    /// Register a subscriber and get the channel it reports on.
    pub fn register(&mut self, name: impl Into<String>) -> Sender<SubscriberReport> {
        self.expected.push(name.into());
        self.sender.clone()
    }

    pub fn expected(&self) -> &[String] {
        &self.expected
    }

    /// Block until every registered subscriber reported, or `grace` elapses.
    ///
    /// Reports come back in registration order. On timeout the error names the
    /// subscribers that are still active.
    pub fn wait(&self, grace: Duration) -> Result<Vec<SubscriberReport>> {
        // A grace period too large for an `Instant` deadline waits indefinitely.
        let deadline = Instant::now().checked_add(grace);
        let mut received: HashMap<String, SubscriberReport> = HashMap::new();

        while received.len() < self.expected.len() {
            let next = match deadline {
                Some(deadline) => self.receiver.recv_deadline(deadline),
                None => self
                    .receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match next {
                Ok(report) => {
                    if !self.expected.contains(&report.name) {
                        debug!(subscriber = %report.name, "report from unregistered subscriber");
                        continue;
                    }
                    debug!(subscriber = %report.name, state = ?report.state, "subscriber finished");
                    received.entry(report.name.clone()).or_insert(report);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    let pending: Vec<String> = self
                        .expected
                        .iter()
                        .filter(|name| !received.contains_key(*name))
                        .cloned()
                        .collect();
                    self.sink.record(&FlowEvent::CompletionTimeout {
                        pending: pending.clone(),
                        grace,
                    });
                    return Err(FlowError::CompletionTimeout { pending, grace });
                }
            }
        }

        info!(subscribers = self.expected.len(), "all subscribers finished");
        Ok(self
            .expected
            .iter()
            .filter_map(|name| received.remove(name))
            .collect())
    }
}
