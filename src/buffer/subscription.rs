//! Read side of the broadcast buffer.

use super::broadcast::BroadcastBuffer;
use crate::types::{Item, Position, SubscriptionId};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a pull from a subscription yields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    /// The next item in order. `skipped` counts positions lost to eviction
    /// or expiry since the previous delivery.
    Item { item: Item, skipped: u64 },
    /// End-of-stream reached and everything reachable was delivered.
    Completed { skipped: u64 },
    /// The subscription was cancelled.
    Cancelled,
}

/// A forward-only cursor into a [`BroadcastBuffer`].
///
/// Pulling the next item is the demand signal: everything before the cursor
/// counts as consumed and may be reclaimed. Dropping the subscription releases
/// its cursor.
pub struct Subscription {
    id: SubscriptionId,
    buffer: Arc<BroadcastBuffer>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, buffer: Arc<BroadcastBuffer>) -> Self {
        Self { id, buffer }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Block until the next item, completion or cancellation.
    pub fn next(&mut self) -> Next {
        loop {
            if let Some(next) = self.buffer.pull(self.id, true, None) {
                return next;
            }
        }
    }

    /// Non-blocking pull; `None` when nothing is available yet.
    pub fn try_next(&mut self) -> Option<Next> {
        self.buffer.pull(self.id, false, None)
    }

    /// Pull, waiting at most `timeout`.
    ///
    /// A timeout too large to represent as a deadline waits indefinitely.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<Next> {
        let deadline = Instant::now().checked_add(timeout);
        self.buffer.pull(self.id, true, deadline)
    }

    /// Position of the next item this subscription will receive.
    pub fn cursor(&self) -> Option<Position> {
        self.buffer.cursor(self.id)
    }

    pub fn cancel(&self) {
        self.buffer.cancel(self.id);
    }

    /// A handle that can cancel this subscription from another thread.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            id: self.id,
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.buffer.release(self.id);
    }
}

/// Cancels a subscription owned by another thread.
#[derive(Clone)]
pub struct Canceller {
    id: SubscriptionId,
    buffer: Arc<BroadcastBuffer>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.buffer.cancel(self.id);
    }
}
