//! Buffer configuration.

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of slots.
pub const DEFAULT_CAPACITY: usize = 8;

/// Default retention window for [`Retention::Window`].
pub const DEFAULT_RETENTION_WINDOW: Duration = Duration::from_secs(4);

/// How long retained items stay available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Keep items until their slot is needed.
    ItemCount,
    /// Additionally expire items older than the window.
    Window(Duration),
}

/// What a write does when every slot holds unread data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the incoming item and record the drop.
    #[default]
    Drop,
    /// Displace the oldest retained items. Lagging cursors skip the gap.
    EvictOldest,
    /// Park the producer until a subscriber frees a slot.
    Block,
}

/// Where a new subscription's cursor starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartFrom {
    /// Replay everything still retained.
    #[default]
    Oldest,
    /// Only items written after subscribing.
    Latest,
}

/// Configuration for a [`BroadcastBuffer`](super::BroadcastBuffer).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Max retained items.
    /// Default: 8
    pub capacity: usize,

    /// Retention mode.
    /// Default: 4s window
    pub retention: Retention,

    /// Policy applied when all slots hold unread items.
    pub overflow: OverflowPolicy,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            retention: Retention::Window(DEFAULT_RETENTION_WINDOW),
            overflow: OverflowPolicy::Drop,
        }
    }
}

impl BufferConfig {
    /// Count-based retention with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            retention: Retention::ItemCount,
            ..Default::default()
        }
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.retention = Retention::Window(window);
        self
    }

    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    /// The retention window, if any.
    pub fn retention_window(&self) -> Option<Duration> {
        match self.retention {
            Retention::ItemCount => None,
            Retention::Window(w) => Some(w),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(FlowError::InvalidConfig(
                "buffer capacity must be at least 1".to_string(),
            ));
        }
        if let Retention::Window(w) = self.retention {
            if w.is_zero() {
                return Err(FlowError::InvalidConfig(
                    "retention window must be non-zero".to_string(),
                ));
            }
        }
        Ok(())
    }
}
