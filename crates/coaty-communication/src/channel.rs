//! The broker-binding abstraction: outbound publish/subscribe over raw
//! bytes. Inbound delivery is driven separately by whoever owns the
//! transport's event loop, via `CommunicationManager::deliver_incoming` —
//! this mirrors `rumqttc`'s own `AsyncClient`/`EventLoop` split, where the
//! loop is polled by the caller rather than owned by the client handle.

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, QoS};

use crate::config::BrokerOptions;
use crate::error::{CommunicationError, CommunicationResult};
use crate::tls;

/// Abstraction over the broker connection, mockable for tests.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> CommunicationResult<()>;
    async fn subscribe(&self, filter: &str, qos: QoS) -> CommunicationResult<()>;
    async fn unsubscribe(&self, filter: &str) -> CommunicationResult<()>;
}

/// A `Channel` backed by a real MQTT broker connection.
pub struct MqttChannel {
    client: AsyncClient,
}

impl MqttChannel {
    /// Connect using `options`, with TLS if `options.use_tls`. `last_will`
    /// is the container's Identity Deadvertise topic and payload (see
    /// `crate::manager::identity_deadvertise_last_will`) — registered with
    /// the broker as the native MQTT last-will so a crash or ungraceful
    /// disconnect deadvertises this identity the same way a clean `stop`
    /// would, without relying on any client-side shutdown code running.
    ///
    /// Returns `(channel, event_loop)` — the caller must drive the event
    /// loop by polling it and forwarding `Event::Incoming(Packet::Publish(_))`
    /// to `CommunicationManager::deliver_incoming`.
    pub fn new(options: &BrokerOptions, last_will: (String, Vec<u8>)) -> CommunicationResult<(Self, EventLoop)> {
        let mut mqtt_options = MqttOptions::new(&options.client_id, &options.host, options.port);
        mqtt_options.set_keep_alive(std::time::Duration::from_secs(options.keepalive_secs.into()));

        let (will_topic, will_payload) = last_will;
        mqtt_options.set_last_will(LastWill::new(will_topic, will_payload, QoS::AtLeastOnce, false));

        let transport = if options.use_tls {
            tls::load_tls_transport(options)?
        } else {
            tls::plaintext_transport()
        };
        mqtt_options.set_transport(transport);

        let (client, event_loop) = AsyncClient::new(mqtt_options, 256);
        Ok((Self { client }, event_loop))
    }
}

#[async_trait]
impl Channel for MqttChannel {
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> CommunicationResult<()> {
        self.client
            .publish(topic, qos, false, payload)
            .await
            .map_err(|e| CommunicationError::Publish(e.to_string()))
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> CommunicationResult<()> {
        self.client
            .subscribe(filter, qos)
            .await
            .map_err(|e| CommunicationError::Subscribe(e.to_string()))
    }

    async fn unsubscribe(&self, filter: &str) -> CommunicationResult<()> {
        self.client
            .unsubscribe(filter)
            .await
            .map_err(|e| CommunicationError::Subscribe(e.to_string()))
    }
}
