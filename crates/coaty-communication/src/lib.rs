//! Communication Manager: MQTT binding, topic grammar, event correlation,
//! subscription lifecycle, and offline buffering.

pub mod channel;
pub mod config;
pub mod error;
pub mod manager;
pub mod mock;
pub mod tls;

pub use channel::{Channel, MqttChannel};
pub use config::BrokerOptions;
pub use error::{CommunicationError, CommunicationResult};
pub use manager::{
    identity_deadvertise_last_will, CallRequest, CommunicationManager, CommunicationOptions,
    CommunicationState, DiscoverRequest, EventStream, IoState, IoValuePayload,
};
pub use mock::{MockBroker, MockChannel};
