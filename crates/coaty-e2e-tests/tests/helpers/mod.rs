//! Shared test harness for end-to-end integration tests.
//!
//! Bridges two `CommunicationManager`s through a shared `MockBroker`,
//! exercising real wire encoding/decoding across crate boundaries without
//! a real MQTT broker.

use coaty_communication::{CommunicationManager, CommunicationOptions, MockBroker, MockChannel};
use coaty_model::Identity;

/// Two containers sharing one in-memory bus, standing in for two agents
/// on the same broker/namespace.
pub struct TwoContainerHarness {
    pub broker: MockBroker,
    pub a: CommunicationManager<MockChannel>,
    pub b: CommunicationManager<MockChannel>,
}

impl TwoContainerHarness {
    pub async fn new() -> Self {
        let broker = MockBroker::new();
        let a = CommunicationManager::new(broker.connect(), Identity::new("container-a"), CommunicationOptions::default());
        let b = CommunicationManager::new(broker.connect(), Identity::new("container-b"), CommunicationOptions::default());
        a.start().await.unwrap();
        b.start().await.unwrap();
        Self { broker, a, b }
    }
}
