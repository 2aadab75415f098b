//! Event bus with named subscriptions.

use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// Default per-subscriber buffer.
const DEFAULT_CAPACITY: usize = 1024;

/// A message delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was broadcast under, e.g. `change-event`.
    pub topic: String,
    /// Payload, usually JSON.
    pub data: String,
}

/// Subscription handle for receiving messages.
pub struct Subscription {
    name: String,
    receiver: broadcast::Receiver<BusMessage>,
}

impl Subscription {
    /// Name the subscription was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive the next message.
    ///
    /// Messages dropped because this subscriber fell behind are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ChannelClosed`] once the subscription was removed
    /// from the bus or the bus was dropped.
    pub async fn recv(&mut self) -> Result<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Ok(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(subscriber = %self.name, skipped, "Subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(StoreError::channel_closed(&self.name));
                }
            }
        }
    }

    /// Try to receive a message without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ChannelClosed`] when nothing is available.
    pub fn try_recv(&mut self) -> Result<BusMessage> {
        self.receiver
            .try_recv()
            .map_err(|_| StoreError::channel_closed(&self.name))
    }
}

/// Event bus for broadcasting messages to named subscribers.
///
/// Subscribing twice under the same name replaces the first subscription.
pub struct EventBus {
    subscribers: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with a per-subscriber buffer of `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe under `name`.
    pub async fn subscribe(&self, name: impl Into<String>) -> Subscription {
        let name = name.into();
        let (sender, receiver) = broadcast::channel(self.capacity);

        let mut subscribers = self.subscribers.write().await;
        if subscribers.insert(name.clone(), sender).is_some() {
            debug!(subscriber = %name, "Replaced existing subscription");
        }

        Subscription { name, receiver }
    }

    /// Remove the subscription registered under `name`.
    ///
    /// The subscriber's `recv` returns an error once buffered messages are drained.
    pub async fn unsubscribe(&self, name: &str) -> bool {
        self.subscribers.write().await.remove(name).is_some()
    }

    /// Broadcast `data` under `topic` to every subscriber.
    ///
    /// Never waits for subscribers; returns the number of deliveries.
    pub async fn broadcast(&self, topic: &str, data: impl Into<String>) -> usize {
        let message = BusMessage {
            topic: topic.to_string(),
            data: data.into(),
        };

        let subscribers = self.subscribers.read().await;
        let delivered = subscribers
            .iter()
            .filter(|(name, sender)| match sender.send(message.clone()) {
                Ok(_) => true,
                Err(_) => {
                    debug!(subscriber = %name, topic, "Subscriber gone, message dropped");
                    false
                }
            })
            .count();

        debug!(topic, delivered, "Broadcast message");
        delivered
    }

    /// Number of registered subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_deliver_to_every_subscriber() {
        let bus = EventBus::new();
        let mut first = bus.subscribe("first").await;
        let mut second = bus.subscribe("second").await;

        let delivered = bus.broadcast("change-event", "{}").await;

        assert_eq!(delivered, 2);
        assert_eq!(first.recv().await.unwrap().topic, "change-event");
        assert_eq!(second.recv().await.unwrap().data, "{}");
    }

    #[tokio::test]
    async fn should_close_subscription_on_unsubscribe() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("watcher").await;

        assert!(bus.unsubscribe("watcher").await);
        assert!(!bus.unsubscribe("watcher").await);

        let result = sub.recv().await;
        assert_eq!(result, Err(StoreError::channel_closed("watcher")));
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn should_replace_subscription_with_same_name() {
        let bus = EventBus::new();
        let mut old = bus.subscribe("watcher").await;
        let mut new = bus.subscribe("watcher").await;

        bus.broadcast("topic", "payload").await;

        assert!(old.recv().await.is_err(), "Replaced subscription should close");
        assert_eq!(new.recv().await.unwrap().data, "payload");
        assert_eq!(bus.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn should_skip_lagged_messages() {
        let bus = EventBus::with_capacity(2);
        let mut sub = bus.subscribe("slow").await;

        for i in 0..5 {
            bus.broadcast("topic", format!("{i}")).await;
        }

        let message = sub.recv().await.unwrap();
        assert_eq!(message.data, "3");
    }

    #[tokio::test]
    async fn should_not_fail_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.broadcast("topic", "payload").await, 0);
    }
}
