//! Progress events for publish requests
//!
//! The orchestrator emits events on a `tokio::sync::broadcast` channel. With
//! no subscribers, events are dropped; a lagging subscriber misses the
//! oldest events instead of blocking the publisher.
//!
//! # Example
//!
//! ```no_run
//! use libcrosspost::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::PublishStarted {
//!     post_id: "abc123".to_string(),
//!     platforms: vec!["twitter".to_string()],
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::PublishOutcome;

pub type EventReceiver = broadcast::Receiver<Event>;

/// Broadcast bus for publish progress
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before old events are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit to all current subscribers; never blocks
    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
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

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Validation passed and dispatch is starting
    PublishStarted {
        post_id: String,
        platforms: Vec<String>,
    },

    /// One platform finished, successfully or not
    PlatformCompleted {
        post_id: String,
        outcome: PublishOutcome,
    },

    /// Every platform finished
    PublishCompleted {
        post_id: String,
        succeeded: usize,
        total: usize,
    },

    /// The request was rejected before dispatch
    PublishRejected { reason: String },
}
