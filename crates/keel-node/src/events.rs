//! Event bus.
//!
//! Feeds and the controller publish [`ProtocolEvent`]s into the bus; the
//! RPC layer forwards them to the client as JSON-RPC notifications while a
//! subscription is active.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use keel_types::events::{EventSink, ProtocolEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A protocol event stamped with its position in the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 1-based emission order.
    pub sequence: u64,
    #[serde(flatten)]
    pub event: ProtocolEvent,
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Category filter: "oracle", "incentives". `None` matches everything.
    pub categories: Option<Vec<String>>,
}

/// Broadcast bus shared by every event producer in the node.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: ProtocolEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(sequence, ?event, "event");
        // No subscribers is fine
        let _ = self.sender.send(Event { sequence, event });
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        match self.categories {
            Some(ref categories) => {
                let category = categorize_event(&event.event);
                categories.iter().any(|c| c == category)
            }
            None => true,
        }
    }
}

fn categorize_event(event: &ProtocolEvent) -> &'static str {
    match event {
        ProtocolEvent::PriceFeedStatusChanged { .. } | ProtocolEvent::LastGoodPriceUpdated { .. } => {
            "oracle"
        }
        _ => "incentives",
    }
}
