//! # Event Bus
//!
//! Single in-process broker fanning typed events out to subscribed
//! clients (the HTTP boundary bridges subscriptions onto its event
//! stream).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         FAN-OUT POLICY                              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  producer ──► try_send per subscriber (bounded channel, cap ≥ 16)   │
//! │                                                                     │
//! │  channel full    → drop the event for that subscriber only         │
//! │  channel closed  → subscriber is pruned, no further writes         │
//! │                                                                     │
//! │  Delivery is ordered per subscriber, unordered across subscribers. │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A slow consumer loses events rather than stalling the producer; the
//! stream carries live notifications, not durable state.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::time::now_timestamp_millis;

/// Minimum per-subscriber channel capacity
pub const MIN_CAPACITY: usize = 16;

/// Default per-subscriber channel capacity
pub const DEFAULT_CAPACITY: usize = 64;

/// Event type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// A user completed registration
    Registration,
    /// A credential was routed into spaces
    CredentialReceived,
    /// A space was created, recovered, or its ACL changed
    SpaceUpdated,
}

impl EventType {
    /// Wire name of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::CredentialReceived => "credential-received",
            Self::SpaceUpdated => "space-updated",
        }
    }
}

/// A broadcast event: type tag plus opaque JSON payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Type tag
    pub event_type: EventType,
    /// Opaque payload
    pub payload: serde_json::Value,
    /// Producer-side timestamp (Unix millis)
    pub timestamp: i64,
}

impl Event {
    /// Build an event stamped now
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            payload,
            timestamp: now_timestamp_millis(),
        }
    }
}

/// A live subscription handed to one consumer
pub struct Subscription {
    /// Subscriber id, used to unsubscribe explicitly
    pub id: Uuid,
    /// Receiving end of the bounded channel
    pub receiver: mpsc::Receiver<Event>,
}

/// Single-producer-many-subscriber broker
pub struct EventBus {
    subscribers: Mutex<HashMap<Uuid, mpsc::Sender<Event>>>,
    capacity: usize,
}

impl EventBus {
    /// Broker with the default per-subscriber capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Broker with a custom capacity, clamped to the minimum
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            capacity: capacity.max(MIN_CAPACITY),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        self.subscribers.lock().insert(id, tx);

        tracing::debug!(subscriber = %id, "Event subscriber added");
        Subscription { id, receiver: rx }
    }

    /// Remove a subscriber; no further writes occur
    pub fn unsubscribe(&self, id: Uuid) {
        if self.subscribers.lock().remove(&id).is_some() {
            tracing::debug!(subscriber = %id, "Event subscriber removed");
        }
    }

    /// Fan an event out to every live subscriber.
    ///
    /// Full channels drop the event for that subscriber; closed channels
    /// are pruned. Returns the number of subscribers that received it.
    pub fn broadcast(&self, event: Event) -> usize {
        let mut subscribers = self.subscribers.lock();
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(subscriber = %id, "Slow consumer, event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
            }
        }

        for id in dead {
            subscribers.remove(&id);
        }
        delivered
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let delivered = bus.broadcast(Event::new(
            EventType::CredentialReceived,
            json!({"said": "ESAID001"}),
        ));
        assert_eq!(delivered, 2);

        assert_eq!(
            a.receiver.recv().await.unwrap().event_type,
            EventType::CredentialReceived
        );
        assert_eq!(
            b.receiver.recv().await.unwrap().payload["said"],
            "ESAID001"
        );
    }

    #[tokio::test]
    async fn test_per_subscriber_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.broadcast(Event::new(EventType::SpaceUpdated, json!({ "seq": i })));
        }

        for i in 0..5 {
            assert_eq!(sub.receiver.recv().await.unwrap().payload["seq"], i);
        }
    }

    #[tokio::test]
    async fn test_full_channel_drops_for_that_subscriber_only() {
        let bus = EventBus::with_capacity(MIN_CAPACITY);
        let slow = bus.subscribe();
        let mut fast = bus.subscribe();

        // Overflow the slow subscriber's channel without draining it
        for i in 0..(MIN_CAPACITY + 4) {
            bus.broadcast(Event::new(EventType::SpaceUpdated, json!({ "seq": i })));
        }

        // Fast subscriber still got everything its channel holds, in order
        let first = fast.receiver.recv().await.unwrap();
        assert_eq!(first.payload["seq"], 0);

        // Slow subscriber's channel holds exactly its capacity
        drop(fast);
        let mut slow_rx = slow.receiver;
        let mut count = 0;
        while slow_rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, MIN_CAPACITY);
    }

    #[tokio::test]
    async fn test_closed_subscriber_pruned() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub.receiver);
        bus.broadcast(Event::new(EventType::Registration, json!({})));

        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_channel() {
        let bus = EventBus::new();
        let sub = bus.subscribe();

        bus.unsubscribe(sub.id);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(
            bus.broadcast(Event::new(EventType::Registration, json!({}))),
            0
        );
    }

    #[test]
    fn test_capacity_clamped_to_minimum() {
        let bus = EventBus::with_capacity(2);
        assert_eq!(bus.capacity, MIN_CAPACITY);
    }
}
