//! Typed event envelopes for the nine Coaty communication event patterns.
//!
//! An envelope carries an `event_type` tag, the publishing `Identity`'s
//! `source_id`, an optional `correlation_id`, and typed `data`. Responses to
//! Discover/Query/Update/Call MUST echo the request's `correlation_id` —
//! enforced by the Communication Manager when it builds the response
//! envelope, not by this type.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::ContextFilter;
use crate::object::CoatyObject;

/// Fixed short tag used as topic segment 2 for each event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    Advertise,
    Deadvertise,
    Channel,
    Discover,
    Resolve,
    Query,
    Retrieve,
    Update,
    Complete,
    Call,
    Return,
    IoValue,
    Raw,
}

impl EventType {
    /// The short topic-segment tag for this event kind.
    pub fn topic_tag(self) -> &'static str {
        match self {
            EventType::Advertise => "ADV",
            EventType::Deadvertise => "DAD",
            EventType::Channel => "CHN",
            EventType::Discover => "DSC",
            EventType::Resolve => "RSV",
            EventType::Query => "QRY",
            EventType::Retrieve => "RTV",
            EventType::Update => "UPD",
            EventType::Complete => "CPL",
            EventType::Call => "CLL",
            EventType::Return => "RTN",
            EventType::IoValue => "IOV",
            EventType::Raw => "RAW",
        }
    }

    /// Parse a topic-segment tag back into an event type.
    pub fn from_topic_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "ADV" => EventType::Advertise,
            "DAD" => EventType::Deadvertise,
            "CHN" => EventType::Channel,
            "DSC" => EventType::Discover,
            "RSV" => EventType::Resolve,
            "QRY" => EventType::Query,
            "RTV" => EventType::Retrieve,
            "UPD" => EventType::Update,
            "CPL" => EventType::Complete,
            "CLL" => EventType::Call,
            "RTN" => EventType::Return,
            "IOV" => EventType::IoValue,
            "RAW" => EventType::Raw,
            _ => return None,
        })
    }

    /// Whether this event kind is a correlated response to another event
    /// (carries a `correlationId` topic segment).
    pub fn is_response(self) -> bool {
        matches!(
            self,
            EventType::Resolve | EventType::Retrieve | EventType::Complete | EventType::Return
        )
    }
}

/// A generic event envelope. `T` is the event-kind-specific payload type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event<T> {
    pub event_type: EventType,
    /// The publishing container's `Identity.objectId`.
    pub source_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub data: T,
}

impl<T> Event<T> {
    pub fn new(event_type: EventType, source_id: Uuid, data: T) -> Self {
        Self {
            event_type,
            source_id,
            correlation_id: None,
            data,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// Deadvertise payload — the set of object ids no longer alive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadvertiseData {
    pub object_ids: Vec<Uuid>,
}

/// Discover payload — at least one of `object_id`/`external_id`/the type
/// filters must be set for the request to be satisfiable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub core_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_types: Vec<String>,
}

impl DiscoverData {
    pub fn by_object_id(object_id: Uuid) -> Self {
        Self {
            object_id: Some(object_id),
            ..Default::default()
        }
    }
}

/// Query payload — an `ObjectFilter` scoped by optional type filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub core_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_types: Vec<String>,
    pub filter: ContextFilter,
}

/// Call payload — an operation name plus JSON-encoded parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallData {
    pub operation: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Return payload — either a successful result or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum ReturnData {
    Result { value: serde_json::Value },
    Error { code: i32, message: String },
}

pub type AdvertiseEvent<T = CoatyObject> = Event<T>;
pub type DeadvertiseEvent = Event<DeadvertiseData>;
pub type ChannelEvent<T = CoatyObject> = Event<T>;
pub type DiscoverEvent = Event<DiscoverData>;
pub type ResolveEvent<T = CoatyObject> = Event<T>;
pub type QueryEvent = Event<QueryData>;
pub type RetrieveEvent = Event<Vec<CoatyObject>>;
pub type UpdateEvent<T = CoatyObject> = Event<T>;
pub type CompleteEvent<T = CoatyObject> = Event<T>;
pub type CallEvent = Event<CallData>;
pub type ReturnEvent = Event<ReturnData>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::CoreType;

    #[test]
    fn event_type_topic_tags_round_trip() {
        for et in [
            EventType::Advertise,
            EventType::Deadvertise,
            EventType::Channel,
            EventType::Discover,
            EventType::Resolve,
            EventType::Query,
            EventType::Retrieve,
            EventType::Update,
            EventType::Complete,
            EventType::Call,
            EventType::Return,
            EventType::IoValue,
            EventType::Raw,
        ] {
            let tag = et.topic_tag();
            assert_eq!(EventType::from_topic_tag(tag), Some(et));
        }
    }

    #[test]
    fn response_kinds_are_flagged() {
        assert!(EventType::Resolve.is_response());
        assert!(EventType::Retrieve.is_response());
        assert!(EventType::Complete.is_response());
        assert!(EventType::Return.is_response());
        assert!(!EventType::Advertise.is_response());
        assert!(!EventType::Discover.is_response());
    }

    #[test]
    fn advertise_event_round_trips_a_coaty_object() {
        let obj = CoatyObject::new(CoreType::Task, "task-1");
        let evt: AdvertiseEvent = Event::new(EventType::Advertise, Uuid::new_v4(), obj.clone());
        let json = serde_json::to_string(&evt).unwrap();
        let back: AdvertiseEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, obj);
        assert!(back.correlation_id.is_none());
    }

    #[test]
    fn discover_by_object_id_round_trips_with_correlation() {
        let id = Uuid::new_v4();
        let evt = DiscoverEvent::new(EventType::Discover, Uuid::new_v4(), DiscoverData::by_object_id(id))
            .with_correlation_id(Uuid::new_v4());
        assert!(evt.correlation_id.is_some());
        assert_eq!(evt.data.object_id, Some(id));
    }
}
