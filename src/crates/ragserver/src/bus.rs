//! Progress & Cancellation Bus (spec.md §4.8): a keyed publish/subscribe
//! channel used two ways — document ids carry ingestion progress events,
//! session ids carry generation cancellation signals. Last-writer-wins for
//! polled state, at-least-once delivery in publish order for subscribers,
//! no ordering guarantee across keys. Grounded on the mpsc-channel/active-flag
//! shape of the teacher's execution-event stream handler, generalized from a
//! single stream to a keyed registry of `tokio::sync::broadcast` channels.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_TTL_HOURS: i64 = 24;
const CHANNEL_CAPACITY: usize = 64;

struct Slot<T> {
    sender: broadcast::Sender<T>,
    last_value: T,
    last_write: DateTime<Utc>,
}

/// A keyed pub/sub bus over a single event type. `ragserver` instantiates
/// one for ingestion progress (`EventBus<IngestionEvent>`, keyed by document
/// id) and one for generation cancellation (`EventBus<bool>`, keyed by
/// session id).
pub struct EventBus<T: Clone + Send + Sync + Default + 'static> {
    slots: DashMap<String, Slot<T>>,
}

impl<T: Clone + Send + Sync + Default + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self { slots: DashMap::new() }
    }

    /// Publishes `event` under `key`. Creates the key's channel on first use.
    /// Subscribers attached before this call receive it; polling callers see
    /// it as the new last-writer-wins value.
    pub fn publish(&self, key: &str, event: T) {
        self.prune_expired();
        match self.slots.get_mut(key) {
            Some(mut slot) => {
                slot.last_value = event.clone();
                slot.last_write = Utc::now();
                let _ = slot.sender.send(event);
            }
            None => {
                let (sender, _rx) = broadcast::channel(CHANNEL_CAPACITY);
                let _ = sender.send(event.clone());
                self.slots.insert(
                    key.to_string(),
                    Slot { sender, last_value: event, last_write: Utc::now() },
                );
            }
        }
    }

    /// Subscribes to future publishes under `key`. Does not replay past
    /// events; callers that need the current state should also call [`poll`].
    pub fn subscribe(&self, key: &str) -> broadcast::Receiver<T> {
        if let Some(slot) = self.slots.get(key) {
            return slot.sender.subscribe();
        }
        let (sender, rx) = broadcast::channel(CHANNEL_CAPACITY);
        self.slots.insert(
            key.to_string(),
            Slot { sender, last_value: T::default(), last_write: Utc::now() },
        );
        rx
    }

    /// Returns the most recently published value for `key`, if any and not
    /// expired.
    pub fn poll(&self, key: &str) -> Option<T> {
        let slot = self.slots.get(key)?;
        if Utc::now().signed_duration_since(slot.last_write).num_hours() >= EVENT_TTL_HOURS {
            return None;
        }
        Some(slot.last_value.clone())
    }

    fn prune_expired(&self) {
        self.slots.retain(|_, slot| Utc::now().signed_duration_since(slot.last_write).num_hours() < EVENT_TTL_HOURS);
    }
}

impl<T: Clone + Send + Sync + Default + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type CancellationBus = Arc<EventBus<bool>>;

pub fn new_cancellation_bus() -> CancellationBus {
    Arc::new(EventBus::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_returns_last_published_value() {
        let bus: EventBus<i32> = EventBus::new();
        bus.publish("doc-1", 10);
        bus.publish("doc-1", 30);
        assert_eq!(bus.poll("doc-1"), Some(30));
    }

    #[test]
    fn poll_unknown_key_returns_none() {
        let bus: EventBus<i32> = EventBus::new();
        assert_eq!(bus.poll("missing"), None);
    }

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let bus: EventBus<i32> = EventBus::new();
        let mut rx = bus.subscribe("session-1");
        bus.publish("session-1", 1);
        bus.publish("session-1", 2);
        assert_eq!(rx.recv().await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), 2);
    }

    #[test]
    fn independent_keys_do_not_interfere() {
        let bus: EventBus<i32> = EventBus::new();
        bus.publish("a", 1);
        bus.publish("b", 2);
        assert_eq!(bus.poll("a"), Some(1));
        assert_eq!(bus.poll("b"), Some(2));
    }
}
