//! Subscriber worker threads.
//!
//! Each subscriber runs on its own named thread:
//!
//! ```text
//! Subscription::next() ──► gap check ──► processing delay ──► handler.on_item()
//!        ▲                                                          │
//!        └──────────────────────── demand ◄─────────────────────────┘
//! ```
//!
//! The worker ends in exactly one terminal state and sends one
//! [`SubscriberReport`] to the coordinator.

use super::types::{ErrorPolicy, GapPolicy, ItemHandler, SubscriberConfig, SubscriberReport};
use crate::buffer::{Canceller, Next, Subscription};
use crate::error::Result;
use crate::events::{EventSink, FlowEvent};
use crate::types::{Item, SubscriberState};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Shared lifecycle state; leaves `Active` at most once.
#[derive(Clone, Debug)]
struct StateCell(Arc<Mutex<SubscriberState>>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(SubscriberState::Active)))
    }

    fn get(&self) -> SubscriberState {
        self.0.lock().clone()
    }

    /// Move to a terminal state. Returns false if already terminal.
    fn finish(&self, terminal: SubscriberState) -> bool {
        let mut state = self.0.lock();
        if state.is_terminal() {
            return false;
        }
        *state = terminal;
        true
    }
}

/// Handle to a running subscriber.
pub struct SubscriberHandle {
    name: String,
    state: StateCell,
    canceller: Canceller,
    cancel: Sender<()>,
    thread: JoinHandle<()>,
}

impl SubscriberHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SubscriberState {
        self.state.get()
    }

    /// Stop the subscriber. It wakes from any wait and ends `Cancelled`.
    pub fn cancel(&self) {
        let _ = self.cancel.try_send(());
        self.canceller.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) {
        if self.thread.join().is_err() {
            warn!(subscriber = %self.name, "subscriber thread panicked");
        }
    }
}

/// Start a subscriber thread consuming `subscription`.
///
/// Exactly one report is sent on `reports` when the subscriber terminates.
pub fn spawn_subscriber(
    config: SubscriberConfig,
    subscription: Subscription,
    handler: Box<dyn ItemHandler>,
    on_error: ErrorPolicy,
    sink: Arc<dyn EventSink>,
    reports: Sender<SubscriberReport>,
) -> Result<SubscriberHandle> {
    let (cancel_tx, cancel_rx) = bounded(1);
    let state = StateCell::new();
    let canceller = subscription.canceller();
    let name = config.name.clone();

    let worker = Worker {
        config,
        subscription,
        handler,
        on_error,
        sink,
        cancel: cancel_rx,
        state: state.clone(),
        delivered: Vec::new(),
        skipped: 0,
        failures: 0,
    };

    let thread = thread::Builder::new()
        .name(format!("subscriber-{}", name))
        .spawn(move || worker.run(reports))?;

    Ok(SubscriberHandle {
        name,
        state,
        canceller,
        cancel: cancel_tx,
        thread,
    })
}

struct Worker {
    config: SubscriberConfig,
    subscription: Subscription,
    handler: Box<dyn ItemHandler>,
    on_error: ErrorPolicy,
    sink: Arc<dyn EventSink>,
    cancel: Receiver<()>,
    state: StateCell,
    delivered: Vec<Item>,
    skipped: u64,
    failures: u64,
}

impl Worker {
    fn run(mut self, reports: Sender<SubscriberReport>) {
        let terminal = self.consume();
        self.state.finish(terminal.clone());

        let event = match &terminal {
            SubscriberState::Completed => FlowEvent::SubscriberCompleted {
                subscriber: self.config.name.clone(),
                delivered: self.delivered.len() as u64,
            },
            SubscriberState::Errored { reason } => FlowEvent::SubscriberErrored {
                subscriber: self.config.name.clone(),
                reason: reason.clone(),
            },
            SubscriberState::Cancelled | SubscriberState::Active => FlowEvent::SubscriberCancelled {
                subscriber: self.config.name.clone(),
                delivered: self.delivered.len() as u64,
            },
        };
        self.sink.record(&event);

        // Release the cursor before reporting so the buffer stops counting us.
        let Worker {
            config,
            subscription,
            delivered,
            skipped,
            failures,
            ..
        } = self;
        drop(subscription);

        let report = SubscriberReport {
            name: config.name,
            state: terminal,
            delivered,
            skipped,
            failures,
        };
        if reports.send(report).is_err() {
            debug!("coordinator gone, report discarded");
        }
    }

    fn consume(&mut self) -> SubscriberState {
        loop {
            match self.subscription.next() {
                Next::Cancelled => return SubscriberState::Cancelled,
                Next::Completed { skipped } => {
                    if let Err(reason) = self.on_gap(skipped, None) {
                        return SubscriberState::Errored { reason };
                    }
                    return SubscriberState::Completed;
                }
                Next::Item { item, skipped } => {
                    if let Err(reason) = self.on_gap(skipped, Some(item)) {
                        return SubscriberState::Errored { reason };
                    }
                    if !self.process_delay() {
                        return SubscriberState::Cancelled;
                    }
                    if let Err(reason) = self.handle(item) {
                        return SubscriberState::Errored { reason };
                    }
                }
            }
        }
    }

    fn on_gap(&mut self, skipped: u64, resumed_with: Option<Item>) -> std::result::Result<(), String> {
        if skipped == 0 {
            return Ok(());
        }
        self.skipped += skipped;
        self.sink.record(&FlowEvent::GapSkipped {
            subscriber: self.config.name.clone(),
            missed: skipped,
            resumed_with,
        });
        match self.config.gap_policy {
            GapPolicy::Skip => Ok(()),
            GapPolicy::Strict => Err(format!("{} item(s) evicted before delivery", skipped)),
        }
    }

    /// Simulated processing time. Returns false when cancelled meanwhile.
    fn process_delay(&mut self) -> bool {
        let delay = self.config.delay;
        if delay.is_zero() {
            return self.cancel.try_recv().is_err();
        }
        match self.cancel.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => true,
            Ok(()) => false,
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(delay);
                true
            }
        }
    }

    fn handle(&mut self, item: Item) -> std::result::Result<(), String> {
        let name = self.config.name.as_str();
        let handler = &mut self.handler;
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.on_item(name, item)));

        match outcome {
            Ok(Ok(())) => {
                self.delivered.push(item);
                self.sink.record(&FlowEvent::ItemDelivered {
                    subscriber: self.config.name.clone(),
                    item,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                self.failures += 1;
                self.sink.record(&FlowEvent::HandlerFailed {
                    subscriber: self.config.name.clone(),
                    item,
                    error: e.to_string(),
                });
                match self.on_error {
                    ErrorPolicy::LogOnly => Ok(()),
                    ErrorPolicy::Propagate => Err(format!("handler failed on item {}: {}", item, e)),
                }
            }
            Err(_) => Err(format!("handler panicked on item {}", item)),
        }
    }
}
