//! Broker connection configuration (`communication.brokerOptions`).

use serde::Deserialize;

/// MQTT broker connection options, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerOptions {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub client_id: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub client_cert_path: String,
    #[serde(default)]
    pub client_key_path: String,
    #[serde(default)]
    pub ca_cert_path: String,
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
}

fn default_port() -> u16 {
    1883
}

fn default_keepalive() -> u16 {
    30
}
