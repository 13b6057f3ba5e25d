//! Bounded broadcast buffer with per-subscription cursors.
//!
//! One producer writes, any number of subscriptions read the same logical
//! sequence at their own pace. Every accepted item gets a [`Position`]; each
//! subscription keeps the position of the next item it wants.
//!
//! Occupancy only counts *unread* slots, i.e. slots at or after the slowest
//! active cursor. Slots every active subscription already consumed are kept
//! for late subscribers and reclaimed silently when room is needed. Once all
//! slots hold unread data the [`OverflowPolicy`] decides what the write does.

use super::config::{BufferConfig, OverflowPolicy, StartFrom};
use super::subscription::{Next, Subscription};
use crate::error::{FlowError, Result};
use crate::events::{EventSink, FlowEvent, TracingSink};
use crate::types::{DropReason, DropRecord, Item, Position, SubscriptionId};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Result of a single write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Item retained at the given position.
    Accepted(Position),
    /// Item refused by the drop policy.
    Dropped,
}

/// Counters describing buffer activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    /// Calls to `write`.
    pub written: u64,
    /// Items that got a slot.
    pub accepted: u64,
    /// Drop records emitted, any reason.
    pub dropped: u64,
    /// Slots removed by the evict-oldest policy.
    pub evicted: u64,
    /// Slots aged out of the retention window.
    pub expired: u64,
    /// Slots currently held.
    pub retained: usize,
    /// Subscriptions not yet cancelled or released.
    pub subscriptions: usize,
}

struct Slot {
    position: Position,
    item: Item,
    written_at: Instant,
}

struct Cursor {
    next: Position,
    cancelled: bool,
}

struct BufferState {
    slots: VecDeque<Slot>,
    next_position: Position,
    cursors: HashMap<SubscriptionId, Cursor>,
    completed: bool,
    stats: BufferStats,
}

impl BufferState {
    /// Position of the slowest active cursor. Everything before it is consumed.
    fn min_cursor(&self) -> Position {
        self.cursors
            .values()
            .filter(|c| !c.cancelled)
            .map(|c| c.next)
            .min()
            .unwrap_or(self.next_position)
    }

    fn unread_count(&self) -> usize {
        let min = self.min_cursor();
        self.slots.iter().filter(|s| s.position >= min).count()
    }

    fn drop_record(&self, slot: &Slot, reason: DropReason) -> Option<DropRecord> {
        (slot.position >= self.min_cursor()).then_some(DropRecord {
            item: slot.item,
            position: Some(slot.position),
            reason,
        })
    }

    fn purge_expired(&mut self, window: Option<Duration>, now: Instant, drops: &mut Vec<DropRecord>) {
        let Some(window) = window else {
            return;
        };
        while let Some(front) = self.slots.front() {
            if now.saturating_duration_since(front.written_at) <= window {
                break;
            }
            if let Some(record) = self.drop_record(front, DropReason::Expired) {
                drops.push(record);
            }
            self.slots.pop_front();
            self.stats.expired += 1;
        }
    }

    /// Pop consumed slots from the front until there is room for one more.
    fn reclaim_consumed(&mut self, capacity: usize) {
        let min = self.min_cursor();
        while self.slots.len() >= capacity {
            match self.slots.front() {
                Some(front) if front.position < min => {
                    self.slots.pop_front();
                }
                _ => break,
            }
        }
    }

    fn evict_oldest(&mut self, drops: &mut Vec<DropRecord>) {
        if let Some(front) = self.slots.front() {
            if let Some(record) = self.drop_record(front, DropReason::Evicted) {
                drops.push(record);
            }
            self.slots.pop_front();
            self.stats.evicted += 1;
        }
    }

    /// Time until the oldest slot leaves the window.
    ///
    /// `None` when nothing is retained or the expiry lies beyond what
    /// `Instant` can represent.
    fn until_next_expiry(&self, window: Duration, now: Instant) -> Option<Duration> {
        let front = self.slots.front()?;
        let expiry = front.written_at.checked_add(window)?;
        Some(
            expiry
                .saturating_duration_since(now)
                .max(Duration::from_millis(1)),
        )
    }
}

/// A bounded, multi-subscriber replay buffer.
pub struct BroadcastBuffer {
    config: BufferConfig,
    state: Mutex<BufferState>,
    /// Signalled when an item arrives, on completion and on cancellation.
    readable: Condvar,
    /// Signalled when a cursor advances or a subscription leaves.
    writable: Condvar,
    sink: Arc<dyn EventSink>,
    next_id: AtomicU64,
}

impl BroadcastBuffer {
    /// Create a buffer reporting to the given sink.
    pub fn new(config: BufferConfig, sink: Arc<dyn EventSink>) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            state: Mutex::new(BufferState {
                slots: VecDeque::with_capacity(config.capacity),
                next_position: Position(0),
                cursors: HashMap::new(),
                completed: false,
                stats: BufferStats::default(),
            }),
            config,
            readable: Condvar::new(),
            writable: Condvar::new(),
            sink,
            next_id: AtomicU64::new(1),
        }))
    }

    /// Create a buffer that logs through `tracing`.
    pub fn with_tracing(config: BufferConfig) -> Result<Arc<Self>> {
        Self::new(config, Arc::new(TracingSink))
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Insert an item, applying the overflow policy when every slot is unread.
    ///
    /// Under [`OverflowPolicy::Block`] this parks the caller until a
    /// subscription advances or leaves.
    pub fn write(&self, item: Item) -> Result<WriteOutcome> {
        let capacity = self.config.capacity;
        let window = self.config.retention_window();
        let mut drops = Vec::new();

        let outcome = {
            let mut state = self.state.lock();
            if state.completed {
                return Err(FlowError::Closed);
            }
            state.stats.written += 1;

            let admitted = loop {
                state.purge_expired(window, Instant::now(), &mut drops);
                state.reclaim_consumed(capacity);
                if state.unread_count() < capacity {
                    break true;
                }
                match self.config.overflow {
                    OverflowPolicy::Drop => {
                        drops.push(DropRecord {
                            item,
                            position: None,
                            reason: DropReason::Overflow,
                        });
                        break false;
                    }
                    OverflowPolicy::EvictOldest => {
                        while state.unread_count() >= capacity {
                            state.evict_oldest(&mut drops);
                        }
                        state.reclaim_consumed(capacity);
                        break true;
                    }
                    OverflowPolicy::Block => {
                        trace!(item = %item, "buffer full, producer waiting");
                        self.wait_writable(&mut state, window);
                        if state.completed {
                            return Err(FlowError::Closed);
                        }
                    }
                }
            };

            state.stats.dropped += drops.len() as u64;
            if admitted {
                let position = state.next_position;
                state.slots.push_back(Slot {
                    position,
                    item,
                    written_at: Instant::now(),
                });
                state.next_position = position.next();
                state.stats.accepted += 1;
                debug!(item = %item, ?position, "accepted");
                WriteOutcome::Accepted(position)
            } else {
                WriteOutcome::Dropped
            }
        };

        if matches!(outcome, WriteOutcome::Accepted(_)) {
            self.readable.notify_all();
        }
        self.emit_drops(drops);
        Ok(outcome)
    }

    fn wait_writable(&self, state: &mut MutexGuard<'_, BufferState>, window: Option<Duration>) {
        match window.and_then(|w| state.until_next_expiry(w, Instant::now())) {
            Some(timeout) => {
                self.writable.wait_for(state, timeout);
            }
            None => self.writable.wait(state),
        }
    }

    /// Signal end-of-stream. Idempotent.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        if !state.completed {
            state.completed = true;
            debug!(accepted = state.stats.accepted, "buffer completed");
        }
        drop(state);
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    /// Open a subscription whose cursor starts at `start`.
    pub fn subscribe(self: &Arc<Self>, start: StartFrom) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut drops = Vec::new();
        {
            let mut state = self.state.lock();
            state.purge_expired(self.config.retention_window(), Instant::now(), &mut drops);
            let next = match start {
                StartFrom::Oldest => state
                    .slots
                    .front()
                    .map(|s| s.position)
                    .unwrap_or(state.next_position),
                StartFrom::Latest => state.next_position,
            };
            state.stats.dropped += drops.len() as u64;
            state.cursors.insert(
                id,
                Cursor {
                    next,
                    cancelled: false,
                },
            );
            debug!(%id, ?next, "subscribed");
        }
        self.emit_drops(drops);
        Subscription::new(id, Arc::clone(self))
    }

    /// Stop a subscription. Wakes its reader and any parked producer.
    pub fn cancel(&self, id: SubscriptionId) {
        let mut state = self.state.lock();
        if let Some(cursor) = state.cursors.get_mut(&id) {
            cursor.cancelled = true;
        }
        drop(state);
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub(crate) fn release(&self, id: SubscriptionId) {
        self.state.lock().cursors.remove(&id);
        self.writable.notify_all();
    }

    /// Deliver the next item for a subscription.
    ///
    /// `deadline` of `None` waits indefinitely; returns `None` only when the
    /// deadline passes first (or immediately when `block` is false).
    pub(crate) fn pull(
        &self,
        id: SubscriptionId,
        block: bool,
        deadline: Option<Instant>,
    ) -> Option<Next> {
        let window = self.config.retention_window();
        let mut drops = Vec::new();

        let next = {
            let mut state = self.state.lock();
            loop {
                state.purge_expired(window, Instant::now(), &mut drops);

                let (cursor_pos, cancelled) = match state.cursors.get(&id) {
                    Some(c) => (c.next, c.cancelled),
                    None => break Some(Next::Cancelled),
                };
                if cancelled {
                    break Some(Next::Cancelled);
                }

                let found = state
                    .slots
                    .iter()
                    .find(|s| s.position >= cursor_pos)
                    .map(|s| (s.position, s.item));

                if let Some((position, item)) = found {
                    let skipped = cursor_pos.distance_to(position);
                    if let Some(c) = state.cursors.get_mut(&id) {
                        c.next = position.next();
                    }
                    self.writable.notify_all();
                    break Some(Next::Item { item, skipped });
                }

                if state.completed {
                    let end = state.next_position;
                    let skipped = cursor_pos.distance_to(end);
                    if let Some(c) = state.cursors.get_mut(&id) {
                        c.next = end;
                    }
                    break Some(Next::Completed { skipped });
                }

                if !block {
                    break None;
                }
                match deadline {
                    Some(deadline) => {
                        if self.readable.wait_until(&mut state, deadline).timed_out() {
                            break None;
                        }
                    }
                    None => self.readable.wait(&mut state),
                }
            }
        };

        if !drops.is_empty() {
            self.state.lock().stats.dropped += drops.len() as u64;
        }
        self.emit_drops(drops);
        next
    }

    /// Current cursor of a subscription.
    pub fn cursor(&self, id: SubscriptionId) -> Option<Position> {
        self.state.lock().cursors.get(&id).map(|c| c.next)
    }

    /// Items currently held, oldest first.
    pub fn retained(&self) -> Vec<Item> {
        self.state.lock().slots.iter().map(|s| s.item).collect()
    }

    pub fn stats(&self) -> BufferStats {
        let state = self.state.lock();
        BufferStats {
            retained: state.slots.len(),
            subscriptions: state.cursors.values().filter(|c| !c.cancelled).count(),
            ..state.stats
        }
    }

    fn emit_drops(&self, drops: Vec<DropRecord>) {
        for record in drops {
            self.sink.record(&FlowEvent::ItemDropped { record });
        }
    }
}
