//! Domain event system — decoupled communication between bounded contexts.
//!
//! The cache and the pipeline publish events when slots come and go or a
//! message is relayed. Other components (CLI status output, tests) can
//! subscribe without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A new slot was created on the platform
    SlotProvisioned {
        name: String,
        is_animated: bool,
        timestamp: DateTime<Utc>,
    },

    /// A slot was evicted to make room for another
    SlotEvicted {
        name: String,
        use_count: u64,
        for_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A slot was removed by an operator command
    SlotRemoved {
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// A rewritten message was relayed under its author's identity
    MessageRelayed {
        channel: String,
        substituted: usize,
        unresolved: usize,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::SlotEvicted {
            name: "Kappa".into(),
            use_count: 5,
            for_name: "PogChamp".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::SlotEvicted { name, use_count, .. } => {
                assert_eq!(name, "Kappa");
                assert_eq!(*use_count, 5);
            }
            _ => panic!("Expected SlotEvicted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ErrorOccurred {
            context: "test".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
