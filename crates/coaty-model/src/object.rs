//! The Coaty object model: `CoatyObject` and the closed core-type tag set.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of core object types known to the framework.
///
/// `Unknown` is the forward-compatibility fallback named in the design
/// notes: an object advertised with a `coreType` tag this build doesn't
/// recognize deserializes successfully, carrying the original tag string
/// rather than failing the whole payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CoreType {
    CoatyObject,
    User,
    Device,
    Annotation,
    Task,
    IoSource,
    IoActor,
    Identity,
    IoNode,
    Location,
    Log,
    Snapshot,
    Unknown(String),
}

impl CoreType {
    /// The exact tag string used on the wire and in `coaty.<CoreType>`.
    pub fn as_str(&self) -> &str {
        match self {
            CoreType::CoatyObject => "CoatyObject",
            CoreType::User => "User",
            CoreType::Device => "Device",
            CoreType::Annotation => "Annotation",
            CoreType::Task => "Task",
            CoreType::IoSource => "IoSource",
            CoreType::IoActor => "IoActor",
            CoreType::Identity => "Identity",
            CoreType::IoNode => "IoNode",
            CoreType::Location => "Location",
            CoreType::Log => "Log",
            CoreType::Snapshot => "Snapshot",
            CoreType::Unknown(tag) => tag,
        }
    }

    /// The `coaty.<CoreType>` namespaced object type for this core type.
    pub fn default_object_type(&self) -> String {
        format!("coaty.{}", self.as_str())
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            "CoatyObject" => CoreType::CoatyObject,
            "User" => CoreType::User,
            "Device" => CoreType::Device,
            "Annotation" => CoreType::Annotation,
            "Task" => CoreType::Task,
            "IoSource" => CoreType::IoSource,
            "IoActor" => CoreType::IoActor,
            "Identity" => CoreType::Identity,
            "IoNode" => CoreType::IoNode,
            "Location" => CoreType::Location,
            "Log" => CoreType::Log,
            "Snapshot" => CoreType::Snapshot,
            other => CoreType::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for CoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for CoreType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CoreType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(CoreType::from_tag(&tag))
    }
}

/// Error returned when constructing a `CoatyObject` with inconsistent tags.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("objectType '{object_type}' does not match coreType '{core_type}' (expected '{expected}')")]
    TypeMismatch {
        object_type: String,
        core_type: String,
        expected: String,
    },
}

/// The root record every Coaty domain object shares.
///
/// Identity invariant: `object_id` uniquely identifies the object across
/// the fleet forever. The core never mutates a received object except via
/// an explicit Update operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoatyObject {
    pub object_id: Uuid,
    pub core_type: CoreType,
    pub object_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_object_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_deactivated: Option<bool>,
}

impl CoatyObject {
    /// Construct a new object with a freshly generated `object_id` and the
    /// canonical `coaty.<CoreType>` object type.
    pub fn new(core_type: CoreType, name: impl Into<String>) -> Self {
        let object_type = core_type.default_object_type();
        Self {
            object_id: Uuid::new_v4(),
            core_type,
            object_type,
            name: name.into(),
            parent_object_id: None,
            external_id: None,
            location_id: None,
            is_deactivated: None,
        }
    }

    /// Construct with an explicit, possibly-namespaced `object_type`,
    /// validating it agrees with `core_type` when the core type is one of
    /// the closed set (custom `objectType`s are allowed for `Unknown`).
    pub fn with_object_type(
        core_type: CoreType,
        object_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, ObjectError> {
        let object_type = object_type.into();
        if !matches!(core_type, CoreType::Unknown(_)) {
            let expected = core_type.default_object_type();
            if object_type != expected {
                return Err(ObjectError::TypeMismatch {
                    object_type,
                    core_type: core_type.as_str().to_string(),
                    expected,
                });
            }
        }
        Ok(Self {
            object_id: Uuid::new_v4(),
            core_type,
            object_type,
            name: name.into(),
            parent_object_id: None,
            external_id: None,
            location_id: None,
            is_deactivated: None,
        })
    }
}

/// The per-container self-identifier, advertised on container start and
/// deadvertised on clean stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(flatten)]
    pub base: CoatyObject,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: CoatyObject::new(CoreType::Identity, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_type_roundtrips_known_tag() {
        let json = serde_json::to_string(&CoreType::Task).unwrap();
        assert_eq!(json, "\"Task\"");
        let back: CoreType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CoreType::Task);
    }

    #[test]
    fn core_type_falls_back_to_unknown_for_unrecognized_tags() {
        let back: CoreType = serde_json::from_str("\"CustomWidget\"").unwrap();
        assert_eq!(back, CoreType::Unknown("CustomWidget".to_string()));
        assert_eq!(back.as_str(), "CustomWidget");
    }

    #[test]
    fn default_object_type_is_namespaced() {
        assert_eq!(CoreType::User.default_object_type(), "coaty.User");
    }

    #[test]
    fn new_object_gets_fresh_id_and_matching_object_type() {
        let obj = CoatyObject::new(CoreType::Device, "thermostat-1");
        assert_eq!(obj.object_type, "coaty.Device");
        assert_eq!(obj.name, "thermostat-1");
        assert!(obj.parent_object_id.is_none());
    }

    #[test]
    fn with_object_type_rejects_mismatch() {
        let err = CoatyObject::with_object_type(CoreType::Device, "coaty.User", "x").unwrap_err();
        assert!(matches!(err, ObjectError::TypeMismatch { .. }));
    }

    #[test]
    fn with_object_type_allows_custom_namespace_for_unknown_core_type() {
        let obj = CoatyObject::with_object_type(
            CoreType::Unknown("Widget".into()),
            "com.example.Widget",
            "w1",
        )
        .unwrap();
        assert_eq!(obj.object_type, "com.example.Widget");
    }

    #[test]
    fn two_objects_never_share_an_id() {
        let a = CoatyObject::new(CoreType::Task, "a");
        let b = CoatyObject::new(CoreType::Task, "b");
        assert_ne!(a.object_id, b.object_id);
    }

    #[test]
    fn identity_serializes_flattened() {
        let identity = Identity::new("agent-1");
        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["name"], "agent-1");
        assert_eq!(value["coreType"], "Identity");
    }
}
