//! Scheduler event bus
//!
//! Random scheduler tasks report state transitions and batch outcomes on a
//! `tokio::sync::broadcast` channel. Status indicators, the live binary and
//! tests subscribe to it; emitting never blocks, and events are dropped when
//! nobody listens.
//!
//! # Example
//!
//! ```no_run
//! use libtgcf::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::NothingNew { source: -1001 });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::random::SchedulerState;

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

/// Broadcast bus shared by all scheduler tasks
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    ///
    /// A lagging subscriber loses the oldest events first.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers without waiting
    pub fn emit(&self, event: Event) {
        // Err only means there are no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Events emitted by random scheduler tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A source's scheduler moved to a new state
    StateChanged { source: i64, state: SchedulerState },

    /// A batch finished posting
    BatchPosted {
        source: i64,
        /// Messages delivered to at least one destination
        sent: usize,
        /// Messages dropped by the plugin chain
        filtered: usize,
        /// Messages no destination accepted
        failed: usize,
    },

    /// The daily limit blocked this cycle
    LimitReached { source: i64, count: u32, limit: u32 },

    /// No unposted message was available
    NothingNew { source: i64 },

    /// A cycle was aborted by an error
    CycleFailed { source: i64, error: String },

    /// The task for `source` exited
    Stopped { source: i64 },
}

impl Event {
    pub fn source(&self) -> i64 {
        match self {
            Event::StateChanged { source, .. }
            | Event::BatchPosted { source, .. }
            | Event::LimitReached { source, .. }
            | Event::NothingNew { source }
            | Event::CycleFailed { source, .. }
            | Event::Stopped { source } => *source,
        }
    }
}
