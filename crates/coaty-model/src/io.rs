//! IO routing domain types: sources, actors, nodes, and contexts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::object::{CoatyObject, CoreType};

/// How an `IoSource` paces its own publication rate when associated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum UpdateStrategy {
    /// Behaves as `Sample` when a rate is negotiated.
    #[default]
    Default,
    /// No pacing — every published value is forwarded.
    None,
    /// Emit the latest value at most once per negotiated-rate interval.
    Sample,
    /// Emit only after the negotiated-rate interval has elapsed with no
    /// further input (quiescence).
    Throttle,
}

/// Fields shared by `IoSource` and `IoActor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoPointCommon {
    /// Namespaced semantic value type, e.g. `"coaty.sensor.Temperature"`.
    pub value_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_rate: Option<u64>,
    /// Binding-native topic, bypassing Coaty-routed flows entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_route: Option<String>,
    #[serde(default)]
    pub use_raw_io_values: bool,
}

/// A producer of IO values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoSource {
    #[serde(flatten)]
    pub base: CoatyObject,
    #[serde(flatten)]
    pub io: IoPointCommon,
    #[serde(default)]
    pub update_strategy: UpdateStrategy,
}

impl IoSource {
    pub fn new(name: impl Into<String>, value_type: impl Into<String>) -> Self {
        Self {
            base: CoatyObject::new(CoreType::IoSource, name),
            io: IoPointCommon {
                value_type: value_type.into(),
                update_rate: None,
                external_route: None,
                use_raw_io_values: false,
            },
            update_strategy: UpdateStrategy::default(),
        }
    }
}

/// A consumer of IO values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoActor {
    #[serde(flatten)]
    pub base: CoatyObject,
    #[serde(flatten)]
    pub io: IoPointCommon,
}

impl IoActor {
    pub fn new(name: impl Into<String>, value_type: impl Into<String>) -> Self {
        Self {
            base: CoatyObject::new(CoreType::IoActor, name),
            io: IoPointCommon {
                value_type: value_type.into(),
                update_rate: None,
                external_route: None,
                use_raw_io_values: false,
            },
        }
    }

    /// Whether a source and an actor are compatible for association, per
    /// the router's matching rule: same `valueType` and same raw-payload
    /// convention.
    pub fn is_compatible_with(source: &IoSource, actor: &IoActor) -> bool {
        source.io.value_type == actor.io.value_type
            && source.io.use_raw_io_values == actor.io.use_raw_io_values
    }
}

/// One agent's bundle of IO sources and actors, plus free-form
/// characteristics used by routers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoNode {
    #[serde(flatten)]
    pub base: CoatyObject,
    /// The object IDs of the identity this node belongs to.
    pub io_sources: Vec<IoSource>,
    pub io_actors: Vec<IoActor>,
    #[serde(default)]
    pub characteristics: HashMap<String, serde_json::Value>,
}

impl IoNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: CoatyObject::new(CoreType::IoNode, name),
            io_sources: Vec::new(),
            io_actors: Vec::new(),
            characteristics: HashMap::new(),
        }
    }
}

/// The node-set for which a single IO router evaluates rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoContext {
    #[serde(flatten)]
    pub base: CoatyObject,
}

impl IoContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: CoatyObject::new(CoreType::CoatyObject, name),
        }
    }
}

/// A stable key identifying one source-actor pairing, independent of the
/// currently-negotiated rate or topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssociationKey {
    pub source_id: Uuid,
    pub actor_id: Uuid,
}

impl AssociationKey {
    pub fn new(source_id: Uuid, actor_id: Uuid) -> Self {
        Self {
            source_id,
            actor_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_requires_matching_value_type_and_raw_flag() {
        let mut source = IoSource::new("s", "coaty.Temp");
        let mut actor = IoActor::new("a", "coaty.Temp");
        assert!(IoActor::is_compatible_with(&source, &actor));

        actor.io.value_type = "coaty.Humidity".into();
        assert!(!IoActor::is_compatible_with(&source, &actor));

        actor.io.value_type = "coaty.Temp".into();
        source.io.use_raw_io_values = true;
        assert!(!IoActor::is_compatible_with(&source, &actor));
    }

    #[test]
    fn update_strategy_defaults_to_default_variant() {
        let source = IoSource::new("s", "coaty.Temp");
        assert_eq!(source.update_strategy, UpdateStrategy::Default);
    }

    #[test]
    fn io_node_round_trips_sources_and_actors() {
        let mut node = IoNode::new("edge-1");
        node.io_sources.push(IoSource::new("s1", "coaty.Temp"));
        node.io_actors.push(IoActor::new("a1", "coaty.Temp"));
        let json = serde_json::to_string(&node).unwrap();
        let back: IoNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back.io_sources.len(), 1);
        assert_eq!(back.io_actors.len(), 1);
    }
}
