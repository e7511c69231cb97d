//! MQTT topic grammar for the Coaty event-pattern protocol.
//!
//! ```text
//! coaty/<namespace>/<eventTypeTag>/<source-id>[/<correlation-id>][/<filter-tag>]
//! ```
//!
//! - Segment 0: literal `coaty`.
//! - Segment 1: namespace (configurable; default `-`).
//! - Segment 2: event-type tag (`EventType::topic_tag`).
//! - Segment 3: publisher identity UUID.
//! - Segment 4: correlationId — present on correlated *response* events only
//!   (Resolve, Retrieve, Complete, Return).
//! - Segment 5: channel-id / operation-name / `<coreType>:<objectType>` —
//!   present on Channel, Call, and type-scoped Advertise publications.
//!
//! Subscriptions use the broker's `+`/`#` wildcards only ever at a whole
//! topic level (MQTT has no partial-segment wildcard), so finer filtering
//! — e.g. "advertise of this specific objectType" — is done by the
//! Communication Manager against the decoded envelope, not the topic
//! string, once a coarse per-event-type subscription delivers the message.

use uuid::Uuid;

use crate::event::EventType;

const PREFIX: &str = "coaty";

/// The default namespace used when no `communication.namespace` is
/// configured.
pub const DEFAULT_NAMESPACE: &str = "-";

/// Build the publish topic for a one-shot or request event (Advertise,
/// Deadvertise, Discover, Query, Update, Call, IoValue, Raw) that carries
/// no correlation segment.
pub fn request_topic(namespace: &str, event_type: EventType, source_id: Uuid) -> String {
    format!("{PREFIX}/{namespace}/{}/{source_id}", event_type.topic_tag())
}

/// Build the publish topic for a request event that also carries a
/// segment-5 filter tag (Channel id, Call operation name, or
/// `<coreType>:<objectType>` for a type-scoped Advertise).
pub fn request_topic_with_filter(
    namespace: &str,
    event_type: EventType,
    source_id: Uuid,
    filter_tag: &str,
) -> String {
    format!(
        "{PREFIX}/{namespace}/{}/{source_id}/{filter_tag}",
        event_type.topic_tag()
    )
}

/// Build the publish topic for a correlated response event (Resolve,
/// Retrieve, Complete, Return).
pub fn response_topic(
    namespace: &str,
    event_type: EventType,
    source_id: Uuid,
    correlation_id: Uuid,
) -> String {
    debug_assert!(event_type.is_response(), "not a response event type");
    format!(
        "{PREFIX}/{namespace}/{}/{source_id}/{correlation_id}",
        event_type.topic_tag()
    )
}

/// The `<coreType>:<objectType>` segment-5 filter tag for a type-scoped
/// Advertise publication.
pub fn advertise_filter_tag(core_type: &str, object_type: &str) -> String {
    format!("{core_type}:{object_type}")
}

/// A coarse subscription pattern for every publication of one event type
/// within a namespace, regardless of source, correlation, or filter tag.
/// Installed once per event type on first observer; finer matching against
/// correlationId / coreType / objectType / channel id / operation name is
/// done against the decoded envelope by the Communication Manager.
pub fn subscribe_pattern(namespace: &str, event_type: EventType) -> String {
    format!("{PREFIX}/{namespace}/{}/#", event_type.topic_tag())
}

/// Parsed components of an inbound topic string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic {
    pub namespace: String,
    pub event_type: EventType,
    pub source_id: Uuid,
    pub correlation_id: Option<Uuid>,
    pub filter_tag: Option<String>,
}

/// Parse an inbound topic string into its grammar components. Returns
/// `None` if the topic doesn't match the Coaty grammar at all (prefix,
/// segment count, or an unrecognized event-type tag).
pub fn parse_topic(topic: &str) -> Option<ParsedTopic> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() < 4 || parts[0] != PREFIX {
        return None;
    }

    let namespace = parts[1].to_string();
    let event_type = EventType::from_topic_tag(parts[2])?;
    let source_id = Uuid::parse_str(parts[3]).ok()?;

    // Segment 4 is a correlationId only for response event kinds; for
    // request kinds with a filter tag it's the filter tag itself.
    let (correlation_id, filter_tag) = if event_type.is_response() {
        let correlation_id = parts.get(4).and_then(|s| Uuid::parse_str(s).ok());
        (correlation_id, None)
    } else {
        let filter_tag = parts.get(4).map(|s| s.to_string());
        (None, filter_tag)
    };

    Some(ParsedTopic {
        namespace,
        event_type,
        source_id,
        correlation_id,
        filter_tag,
    })
}
