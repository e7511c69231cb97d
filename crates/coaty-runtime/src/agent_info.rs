//! `common.agentInfo`: package/build/host metadata attached to Log events,
//! the runtime counterpart of the teacher's `env!("CARGO_PKG_VERSION")` +
//! `DeviceShadowState` build-metadata convention.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub package_name: String,
    pub package_version: String,
    pub host_name: Option<String>,
}

impl AgentInfo {
    /// Build from this binary's own Cargo package metadata plus the local
    /// hostname, if resolvable.
    pub fn from_env() -> Self {
        Self {
            package_name: env!("CARGO_PKG_NAME").to_string(),
            package_version: env!("CARGO_PKG_VERSION").to_string(),
            host_name: hostname(),
        }
    }
}

fn hostname() -> Option<String> {
    std::env::var("HOSTNAME").ok().filter(|s| !s.is_empty())
}
