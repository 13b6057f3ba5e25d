//! Core types shared by the buffer, the producer and the subscribers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value emitted by the producer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Item(pub u64);

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item({})", self.0)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical index assigned by the buffer to every accepted item.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Position(pub u64);

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pos({})", self.0)
    }
}

impl Position {
    pub fn next(self) -> Self {
        Position(self.0 + 1)
    }

    /// Number of positions between `self` and a later position.
    pub fn distance_to(self, later: Position) -> u64 {
        later.0.saturating_sub(self.0)
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Lifecycle state of a subscriber.
///
/// `Active` is the only non-terminal state; a subscriber leaves it exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubscriberState {
    Active,
    Completed,
    Errored { reason: String },
    Cancelled,
}

impl SubscriberState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubscriberState::Active)
    }
}

/// Why an item was discarded before every subscription saw it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Incoming item refused because the buffer was full.
    Overflow,
    /// Retained item displaced to make room for a newer one.
    Evicted,
    /// Retained item aged out of the retention window.
    Expired,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::Overflow => "overflow",
            DropReason::Evicted => "evicted",
            DropReason::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Observability record for a discarded item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropRecord {
    pub item: Item,
    /// Position the item held, `None` when it was refused on write.
    pub position: Option<Position>,
    pub reason: DropReason,
}
