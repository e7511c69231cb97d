//! In-memory `Channel` for tests.
//!
//! Records every publish and subscription for assertion, and — via
//! `MockBroker` — can fan published bytes out to every other `MockChannel`
//! connected to the same broker, so two in-process `CommunicationManager`s
//! can exchange events without a real MQTT broker.

use std::sync::Mutex;

use async_trait::async_trait;
use rumqttc::QoS;
use tokio::sync::broadcast;

use crate::channel::Channel;
use crate::error::CommunicationResult;

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// A shared in-memory bus standing in for a broker. Every `MockChannel`
/// connected via `MockBroker::connect` receives every publish made by any
/// other channel on the same broker, including its own.
pub struct MockBroker {
    bus: broadcast::Sender<(String, Vec<u8>)>,
}

impl MockBroker {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(4096);
        Self { bus }
    }

    pub fn connect(&self) -> MockChannel {
        MockChannel::new(self.bus.clone())
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MockChannel {
    bus: broadcast::Sender<(String, Vec<u8>)>,
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<String>>,
}

impl MockChannel {
    fn new(bus: broadcast::Sender<(String, Vec<u8>)>) -> Self {
        Self {
            bus,
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// A standalone channel with no broker peers — publishes are recorded
    /// but never delivered anywhere. Useful for unit tests that only
    /// assert on outbound behavior.
    pub fn standalone() -> Self {
        let (bus, _) = broadcast::channel(4096);
        Self::new(bus)
    }

    /// Subscribe to every publish made on this channel's broker, own and
    /// peers' alike. A test driver loop reads this and forwards matching
    /// topics into `CommunicationManager::deliver_incoming`.
    pub fn incoming(&self) -> broadcast::Receiver<(String, Vec<u8>)> {
        self.bus.subscribe()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.published.lock().unwrap().last().cloned()
    }

    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.subscriptions.lock().unwrap().iter().any(|f| f == filter)
    }

    pub fn reset(&self) {
        self.published.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> CommunicationResult<()> {
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        // No peers subscribed is not an error — mirrors a real broker
        // with zero matching subscribers.
        let _ = self.bus.send((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, filter: &str, _qos: QoS) -> CommunicationResult<()> {
        self.subscriptions.lock().unwrap().push(filter.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> CommunicationResult<()> {
        self.subscriptions.lock().unwrap().retain(|f| f != filter);
        Ok(())
    }
}
