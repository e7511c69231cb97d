//! Container configuration, loadable from TOML per the recognized option
//! keys: `common.*`, `communication.*`, `controllers.<name>.*`,
//! `databases.<key>`.

use std::collections::HashMap;

use coaty_communication::BrokerOptions;
use coaty_model::{CoatyObject, Identity};
use serde::Deserialize;

/// `common.*` — metadata shared across every controller in the container.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommonOptions {
    /// Attach `AgentInfo` (package/build/host metadata) to Log events.
    #[serde(default)]
    pub attach_agent_info: bool,
    /// `common.associatedUser` — scopes IO-router device discovery to one
    /// user.
    #[serde(default)]
    pub associated_user: Option<CoatyObject>,
}

/// `communication.*` — everything the `CommunicationManager` needs plus
/// the container-level identity name and auto-start flag.
#[derive(Debug, Clone, Deserialize)]
pub struct CommunicationConfig {
    /// Name of this container's `Identity`, also used as the readable-
    /// topics debug name when `use_readable_topics` is set.
    pub identity_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub use_readable_topics: bool,
    #[serde(default = "default_true")]
    pub should_auto_start: bool,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    pub broker: BrokerOptions,
}

fn default_namespace() -> String {
    coaty_model::DEFAULT_NAMESPACE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_buffer_capacity() -> usize {
    1000
}

/// Top-level container configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    #[serde(default)]
    pub common: CommonOptions,
    pub communication: CommunicationConfig,
    /// `controllers.<Name>.<opt>` — per-controller option bags, looked up
    /// by controller name and deserialized by the controller itself.
    #[serde(default)]
    pub controllers: HashMap<String, toml::Value>,
    /// `databases.<key>` — connection info consumed by storage adapters.
    #[serde(default)]
    pub databases: HashMap<String, toml::Value>,
}

impl ContainerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Look up and deserialize `controllers.<name>` into `T`, if present.
    pub fn controller_options<T: serde::de::DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        match self.controllers.get(name) {
            Some(value) => Ok(Some(value.clone().try_into()?)),
            None => Ok(None),
        }
    }

    /// Build this container's `Identity` from `communication.identityName`.
    /// Exposed separately from `Container::resolve` so a caller that needs
    /// the identity before the channel exists (to seed an MQTT last-will,
    /// for instance) can build it once and pass the same value to both.
    pub fn identity(&self) -> Identity {
        Identity::new(self.communication.identity_name.clone())
    }
}
