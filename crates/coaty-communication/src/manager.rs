//! `CommunicationManager`: the online/offline state machine, topic
//! encode/decode, correlation, subscription lifecycle, and offline
//! buffering sitting on top of a [`Channel`].
//!
//! One manager owns exactly one container's [`Identity`] and one broker
//! connection. Every typed publish/observe operation funnels through
//! [`CommunicationManager::raw_publish`] and [`CommunicationManager::deliver_incoming`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use rumqttc::QoS;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use coaty_model::{
    AdvertiseEvent, CallData, CallEvent, ChannelEvent, CoatyObject, DeadvertiseData,
    DeadvertiseEvent, DiscoverData, DiscoverEvent, Event, EventType, Identity, QueryData,
    QueryEvent, ResolveEvent, RetrieveEvent, ReturnData, ReturnEvent, UpdateEvent,
};

use crate::channel::Channel;
use crate::error::{CommunicationError, CommunicationResult};

/// Lifecycle state of a [`CommunicationManager`]. Transitions:
/// `Initial -> Starting -> Online <-> Offline -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunicationState {
    Initial,
    Starting,
    Online,
    Offline,
    Stopping,
    Stopped,
}

/// Tuning knobs independent of the broker connection itself.
#[derive(Debug, Clone)]
pub struct CommunicationOptions {
    /// Namespace used as topic segment 1. Defaults to `-`.
    pub namespace: String,
    /// Maximum number of envelopes held while offline before the oldest is
    /// dropped. Default 1,000.
    pub buffer_capacity: usize,
    /// Debug convenience: substitute the container's `Identity.name` for
    /// its `objectId` in topic segment 3. Off by default — see
    /// `check_readable_name_collision`.
    pub readable_topics: bool,
}

impl Default for CommunicationOptions {
    fn default() -> Self {
        Self {
            namespace: coaty_model::DEFAULT_NAMESPACE.to_string(),
            buffer_capacity: 1000,
            readable_topics: false,
        }
    }
}

/// Current association state of one IO endpoint, as observed by an IO
/// actor or source controller via `observe_io_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoState {
    pub has_associations: bool,
    pub update_rate: Option<u64>,
}

/// An IO value's payload, either JSON-encoded or opaque raw bytes
/// depending on the source/actor's `useRawIoValues` flag.
#[derive(Debug, Clone, PartialEq)]
pub enum IoValuePayload {
    Json(serde_json::Value),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone)]
struct RawEnvelope {
    source_id: Uuid,
    filter_tag: Option<String>,
    payload: Vec<u8>,
}

struct SubscriptionEntry {
    pattern: String,
    refcount: usize,
    sender: broadcast::Sender<RawEnvelope>,
}

struct CorrelatorEntry {
    sender: mpsc::UnboundedSender<RawEnvelope>,
    delivered_senders: HashSet<Uuid>,
}

struct QueuedPublish {
    topic: String,
    payload: Vec<u8>,
    qos: QoS,
}

struct Inner<C: Channel> {
    channel: C,
    namespace: String,
    identity: Identity,
    readable_topics: bool,
    buffer_capacity: usize,
    state_tx: watch::Sender<CommunicationState>,
    subs: Mutex<HashMap<EventType, SubscriptionEntry>>,
    io_value_subs: Mutex<HashMap<Uuid, SubscriptionEntry>>,
    io_state: Mutex<HashMap<String, watch::Sender<IoState>>>,
    correlators: Mutex<HashMap<Uuid, CorrelatorEntry>>,
    outbound_buffer: Mutex<VecDeque<QueuedPublish>>,
}

/// Owns the container's broker connection, correlator table, and
/// subscription reference counts. Cheap to clone — clones share the same
/// underlying state via `Arc`.
pub struct CommunicationManager<C: Channel> {
    inner: std::sync::Arc<Inner<C>>,
}

impl<C: Channel> Clone for CommunicationManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Names used with `readable_topics` are meant for humans reading broker
/// logs during development, not for routing correctness — two different
/// containers sharing a name is a configuration smell, not a protocol
/// violation, so this only warns once per colliding name rather than
/// refusing to start.
static READABLE_NAME_REGISTRY: OnceLock<Mutex<HashMap<String, Uuid>>> = OnceLock::new();

fn check_readable_name_collision(name: &str, object_id: Uuid) {
    let registry = READABLE_NAME_REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = registry.lock().unwrap();
    match map.get(name) {
        Some(existing) if *existing != object_id => {
            tracing::warn!(
                name,
                existing = %existing,
                new = %object_id,
                "readable-topics name collision: two identities share a debug topic name"
            );
        }
        _ => {
            map.insert(name.to_string(), object_id);
        }
    }
}

fn decode_event<T: DeserializeOwned>(topic_hint: &str, env: RawEnvelope) -> Option<Event<T>> {
    match serde_json::from_slice(&env.payload) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::warn!(topic_kind = topic_hint, error = %err, "dropping malformed event payload");
            None
        }
    }
}

/// Render the Deadvertise event announcing `identity`'s own object as no
/// longer available, on the same topic a graceful
/// `CommunicationManager::stop` publishes it on. Computed ahead of the
/// channel's own construction so it can be installed as the broker's MQTT
/// last-will — the one case `stop`'s own Deadvertise publish can't cover,
/// since a crash or ungraceful disconnect never runs the client's own
/// shutdown code.
pub fn identity_deadvertise_last_will(
    identity: &Identity,
    namespace: &str,
    readable_topics: bool,
) -> CommunicationResult<(String, Vec<u8>)> {
    let source_segment = if readable_topics {
        identity.base.name.clone()
    } else {
        identity.base.object_id.to_string()
    };
    let topic = format!(
        "coaty/{namespace}/{}/{source_segment}",
        EventType::Deadvertise.topic_tag()
    );
    let event: DeadvertiseEvent = Event::new(
        EventType::Deadvertise,
        identity.base.object_id,
        DeadvertiseData {
            object_ids: vec![identity.base.object_id],
        },
    );
    let payload = serde_json::to_vec(&event).map_err(|e| CommunicationError::Serialization(e.to_string()))?;
    Ok((topic, payload))
}

impl<C: Channel> CommunicationManager<C> {
    pub fn new(channel: C, identity: Identity, options: CommunicationOptions) -> Self {
        if options.readable_topics {
            check_readable_name_collision(&identity.base.name, identity.base.object_id);
        }
        let (state_tx, _) = watch::channel(CommunicationState::Initial);
        Self {
            inner: std::sync::Arc::new(Inner {
                channel,
                namespace: options.namespace,
                identity,
                readable_topics: options.readable_topics,
                buffer_capacity: options.buffer_capacity,
                state_tx,
                subs: Mutex::new(HashMap::new()),
                io_value_subs: Mutex::new(HashMap::new()),
                io_state: Mutex::new(HashMap::new()),
                correlators: Mutex::new(HashMap::new()),
                outbound_buffer: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn state(&self) -> CommunicationState {
        *self.inner.state_tx.borrow()
    }

    pub fn observe_state(&self) -> watch::Receiver<CommunicationState> {
        self.inner.state_tx.subscribe()
    }

    fn source_id(&self) -> Uuid {
        self.inner.identity.base.object_id
    }

    fn source_segment(&self) -> String {
        if self.inner.readable_topics {
            self.inner.identity.base.name.clone()
        } else {
            self.inner.identity.base.object_id.to_string()
        }
    }

    fn build_request_topic(&self, event_type: EventType, filter_tag: Option<&str>) -> String {
        let base = format!(
            "coaty/{}/{}/{}",
            self.inner.namespace,
            event_type.topic_tag(),
            self.source_segment()
        );
        match filter_tag {
            Some(tag) => format!("{base}/{tag}"),
            None => base,
        }
    }

    fn build_response_topic(&self, event_type: EventType, correlation_id: Uuid) -> String {
        format!(
            "coaty/{}/{}/{}/{correlation_id}",
            self.inner.namespace,
            event_type.topic_tag(),
            self.source_segment()
        )
    }

    /// Publish idempotently, respecting online/offline state: while
    /// offline the envelope is queued (oldest dropped with a warning once
    /// `buffer_capacity` is exceeded) rather than handed to the channel.
    async fn raw_publish(&self, topic: String, payload: Vec<u8>, qos: QoS) -> CommunicationResult<()> {
        if self.state() != CommunicationState::Online {
            let mut buffer = self.inner.outbound_buffer.lock().unwrap();
            if buffer.len() >= self.inner.buffer_capacity {
                buffer.pop_front();
                tracing::warn!(
                    capacity = self.inner.buffer_capacity,
                    "offline publish buffer full, dropping oldest queued envelope"
                );
            }
            buffer.push_back(QueuedPublish { topic, payload, qos });
            return Ok(());
        }
        self.inner.channel.publish(&topic, &payload, qos).await
    }

    async fn publish_json<T: Serialize>(&self, topic: String, event: &T) -> CommunicationResult<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| CommunicationError::Serialization(e.to_string()))?;
        self.raw_publish(topic, payload, QoS::AtLeastOnce).await
    }

    async fn flush_outbound_buffer(&self) {
        let queued: Vec<QueuedPublish> = {
            let mut buffer = self.inner.outbound_buffer.lock().unwrap();
            buffer.drain(..).collect()
        };
        for item in queued {
            if let Err(err) = self.inner.channel.publish(&item.topic, &item.payload, item.qos).await {
                tracing::warn!(error = %err, topic = %item.topic, "failed to flush buffered publish on reconnect");
            }
        }
    }

    /// Start (or resume) publishing/subscribing. Idempotent: calling
    /// `start` while already `Online` or `Starting` is a no-op.
    pub async fn start(&self) -> CommunicationResult<()> {
        if matches!(self.state(), CommunicationState::Online | CommunicationState::Starting) {
            return Ok(());
        }
        self.inner.state_tx.send_replace(CommunicationState::Starting);

        let patterns: Vec<String> = {
            let subs = self.inner.subs.lock().unwrap();
            subs.values().map(|e| e.pattern.clone()).collect()
        };
        for pattern in patterns {
            if let Err(err) = self.inner.channel.subscribe(&pattern, QoS::AtLeastOnce).await {
                tracing::warn!(error = %err, pattern = %pattern, "resubscribe failed on start");
            }
        }

        self.inner.state_tx.send_replace(CommunicationState::Online);
        self.flush_outbound_buffer().await;
        self.publish_advertise(&self.inner.identity.base.clone()).await?;
        Ok(())
    }

    /// Transition to `Offline` — the broker connection dropped out from
    /// under the manager but the caller intends to reconnect and call
    /// `start` again. Outbound publishes are buffered rather than failing.
    pub fn mark_offline(&self) {
        if self.state() == CommunicationState::Online {
            self.inner.state_tx.send_replace(CommunicationState::Offline);
        }
    }

    /// Deadvertise this container's identity, unsubscribe everything, and
    /// stop. Idempotent: calling `stop` while already `Stopping` or
    /// `Stopped` is a no-op.
    pub async fn stop(&self) -> CommunicationResult<()> {
        if matches!(self.state(), CommunicationState::Stopping | CommunicationState::Stopped) {
            return Ok(());
        }
        self.inner.state_tx.send_replace(CommunicationState::Stopping);

        let _ = self
            .publish_deadvertise(vec![self.inner.identity.base.object_id])
            .await;

        let patterns: Vec<String> = {
            let subs = self.inner.subs.lock().unwrap();
            subs.values().map(|e| e.pattern.clone()).collect()
        };
        for pattern in patterns {
            let _ = self.inner.channel.unsubscribe(&pattern).await;
        }

        self.inner.state_tx.send_replace(CommunicationState::Stopped);
        Ok(())
    }

    /// Entry point for whoever drives the transport's event loop (a real
    /// `rumqttc::EventLoop`, or a `MockBroker` bridge in tests). Decodes
    /// the topic, then either routes the response through its correlator
    /// or broadcasts it to every observer of that event type.
    pub async fn deliver_incoming(&self, topic: &str, payload: &[u8]) {
        let Some(parsed) = coaty_model::parse_topic(topic) else {
            tracing::warn!(topic, "dropping message on unparseable topic");
            return;
        };

        if parsed.event_type.is_response() {
            let Some(correlation_id) = parsed.correlation_id else {
                tracing::warn!(topic, "response event missing correlationId segment");
                return;
            };
            let mut correlators = self.inner.correlators.lock().unwrap();
            if let Some(entry) = correlators.get_mut(&correlation_id) {
                if entry.delivered_senders.insert(parsed.source_id) {
                    let _ = entry.sender.send(RawEnvelope {
                        source_id: parsed.source_id,
                        filter_tag: None,
                        payload: payload.to_vec(),
                    });
                } else {
                    tracing::debug!(
                        %correlation_id,
                        sender = %parsed.source_id,
                        "dropping duplicate correlated reply from a sender already heard from"
                    );
                }
            }
            return;
        }

        if parsed.event_type == EventType::IoValue {
            let sender = {
                let subs = self.inner.io_value_subs.lock().unwrap();
                subs.get(&parsed.source_id).map(|e| e.sender.clone())
            };
            if let Some(sender) = sender {
                let _ = sender.send(RawEnvelope {
                    source_id: parsed.source_id,
                    filter_tag: None,
                    payload: payload.to_vec(),
                });
            }
            return;
        }

        let sender = {
            let subs = self.inner.subs.lock().unwrap();
            subs.get(&parsed.event_type).map(|e| e.sender.clone())
        };
        if let Some(sender) = sender {
            let _ = sender.send(RawEnvelope {
                source_id: parsed.source_id,
                filter_tag: parsed.filter_tag,
                payload: payload.to_vec(),
            });
        }
    }

    async fn subscribe_event_type(&self, event_type: EventType) -> broadcast::Receiver<RawEnvelope> {
        let (need_broker_subscribe, pattern, receiver) = {
            let mut subs = self.inner.subs.lock().unwrap();
            match subs.get_mut(&event_type) {
                Some(entry) => {
                    entry.refcount += 1;
                    (false, entry.pattern.clone(), entry.sender.subscribe())
                }
                None => {
                    let pattern = coaty_model::subscribe_pattern(&self.inner.namespace, event_type);
                    let (tx, rx) = broadcast::channel(1024);
                    subs.insert(
                        event_type,
                        SubscriptionEntry {
                            pattern: pattern.clone(),
                            refcount: 1,
                            sender: tx,
                        },
                    );
                    (true, pattern, rx)
                }
            }
        };
        if need_broker_subscribe && self.state() != CommunicationState::Initial {
            if let Err(err) = self.inner.channel.subscribe(&pattern, QoS::AtLeastOnce).await {
                tracing::warn!(error = %err, pattern = %pattern, "subscribe failed");
            }
        }
        receiver
    }

    fn release_event_type(&self, event_type: EventType) {
        let pattern_to_drop = {
            let mut subs = self.inner.subs.lock().unwrap();
            match subs.get_mut(&event_type) {
                Some(entry) => {
                    entry.refcount -= 1;
                    if entry.refcount == 0 {
                        let pattern = entry.pattern.clone();
                        subs.remove(&event_type);
                        Some(pattern)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(pattern) = pattern_to_drop {
            let manager = self.clone();
            tokio::spawn(async move {
                if let Err(err) = manager.inner.channel.unsubscribe(&pattern).await {
                    tracing::warn!(error = %err, pattern = %pattern, "unsubscribe failed on last detach");
                }
            });
        }
    }

    async fn subscribe_io_value(&self, source_id: Uuid) -> broadcast::Receiver<RawEnvelope> {
        let (need_broker_subscribe, pattern, receiver) = {
            let mut subs = self.inner.io_value_subs.lock().unwrap();
            match subs.get_mut(&source_id) {
                Some(entry) => {
                    entry.refcount += 1;
                    (false, entry.pattern.clone(), entry.sender.subscribe())
                }
                None => {
                    let pattern = format!(
                        "coaty/{}/{}/{}",
                        self.inner.namespace,
                        EventType::IoValue.topic_tag(),
                        source_id
                    );
                    let (tx, rx) = broadcast::channel(1024);
                    subs.insert(
                        source_id,
                        SubscriptionEntry {
                            pattern: pattern.clone(),
                            refcount: 1,
                            sender: tx,
                        },
                    );
                    (true, pattern, rx)
                }
            }
        };
        if need_broker_subscribe && self.state() != CommunicationState::Initial {
            if let Err(err) = self.inner.channel.subscribe(&pattern, QoS::AtMostOnce).await {
                tracing::warn!(error = %err, pattern = %pattern, "io value subscribe failed");
            }
        }
        receiver
    }

    fn release_io_value(&self, source_id: Uuid) {
        let pattern_to_drop = {
            let mut subs = self.inner.io_value_subs.lock().unwrap();
            match subs.get_mut(&source_id) {
                Some(entry) => {
                    entry.refcount -= 1;
                    if entry.refcount == 0 {
                        let pattern = entry.pattern.clone();
                        subs.remove(&source_id);
                        Some(pattern)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(pattern) = pattern_to_drop {
            let manager = self.clone();
            tokio::spawn(async move {
                let _ = manager.inner.channel.unsubscribe(&pattern).await;
            });
        }
    }

    fn register_correlator(&self) -> (Uuid, mpsc::UnboundedReceiver<RawEnvelope>) {
        let correlation_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.correlators.lock().unwrap().insert(
            correlation_id,
            CorrelatorEntry {
                sender: tx,
                delivered_senders: HashSet::new(),
            },
        );
        (correlation_id, rx)
    }

    fn unregister_correlator(&self, correlation_id: Uuid) {
        self.inner.correlators.lock().unwrap().remove(&correlation_id);
    }

    fn build_event_stream<T: Send + 'static>(
        &self,
        event_type: EventType,
        rx: broadcast::Receiver<RawEnvelope>,
        decode: impl Fn(RawEnvelope) -> Option<T> + Send + Sync + 'static,
    ) -> EventStream<T> {
        let stream = BroadcastStream::new(rx).filter_map(move |item| match item {
            Ok(env) => decode(env),
            Err(_) => None,
        });
        let manager = self.clone();
        EventStream {
            inner: Box::pin(stream),
            on_drop: Some(Box::new(move || manager.release_event_type(event_type))),
        }
    }

    fn build_io_value_stream<T: Send + 'static>(
        &self,
        source_id: Uuid,
        rx: broadcast::Receiver<RawEnvelope>,
        decode: impl Fn(RawEnvelope) -> Option<T> + Send + Sync + 'static,
    ) -> EventStream<T> {
        let stream = BroadcastStream::new(rx).filter_map(move |item| match item {
            Ok(env) => decode(env),
            Err(_) => None,
        });
        let manager = self.clone();
        EventStream {
            inner: Box::pin(stream),
            on_drop: Some(Box::new(move || manager.release_io_value(source_id))),
        }
    }

    fn build_correlated_stream<T: Send + 'static>(
        &self,
        correlation_id: Uuid,
        rx: mpsc::UnboundedReceiver<RawEnvelope>,
        decode: impl Fn(RawEnvelope) -> Option<T> + Send + Sync + 'static,
    ) -> EventStream<T> {
        let stream = UnboundedReceiverStream::new(rx).filter_map(decode);
        let manager = self.clone();
        EventStream {
            inner: Box::pin(stream),
            on_drop: Some(Box::new(move || manager.unregister_correlator(correlation_id))),
        }
    }

    // ---- Advertise / Deadvertise ----------------------------------------

    pub async fn publish_advertise(&self, object: &CoatyObject) -> CommunicationResult<()> {
        let event: AdvertiseEvent = Event::new(EventType::Advertise, self.source_id(), object.clone());
        let filter_tag = coaty_model::advertise_filter_tag(object.core_type.as_str(), &object.object_type);
        let topic = self.build_request_topic(EventType::Advertise, Some(&filter_tag));
        self.publish_json(topic, &event).await
    }

    pub async fn publish_deadvertise(&self, object_ids: Vec<Uuid>) -> CommunicationResult<()> {
        let event: DeadvertiseEvent = Event::new(
            EventType::Deadvertise,
            self.source_id(),
            DeadvertiseData { object_ids },
        );
        let topic = self.build_request_topic(EventType::Deadvertise, None);
        self.publish_json(topic, &event).await
    }

    pub async fn observe_advertise_with_core_type(&self, core_type: &str) -> EventStream<AdvertiseEvent> {
        let rx = self.subscribe_event_type(EventType::Advertise).await;
        let core_type = core_type.to_string();
        self.build_event_stream(EventType::Advertise, rx, move |env| {
            let tag = env.filter_tag.as_deref()?;
            let (tag_core, _) = tag.split_once(':')?;
            if tag_core != core_type {
                return None;
            }
            decode_event("Advertise", env)
        })
    }

    pub async fn observe_advertise_with_object_type(&self, object_type: &str) -> EventStream<AdvertiseEvent> {
        let rx = self.subscribe_event_type(EventType::Advertise).await;
        let object_type = object_type.to_string();
        self.build_event_stream(EventType::Advertise, rx, move |env| {
            let tag = env.filter_tag.as_deref()?;
            let (_, tag_object) = tag.split_once(':')?;
            if tag_object != object_type {
                return None;
            }
            decode_event("Advertise", env)
        })
    }

    // ---- Channel ---------------------------------------------------------

    pub async fn publish_channel(&self, channel_id: &str, object: &CoatyObject) -> CommunicationResult<()> {
        let event: ChannelEvent = Event::new(EventType::Channel, self.source_id(), object.clone());
        let topic = self.build_request_topic(EventType::Channel, Some(channel_id));
        self.publish_json(topic, &event).await
    }

    pub async fn observe_channel(&self, channel_id: &str) -> EventStream<ChannelEvent> {
        let rx = self.subscribe_event_type(EventType::Channel).await;
        let channel_id = channel_id.to_string();
        self.build_event_stream(EventType::Channel, rx, move |env| {
            if env.filter_tag.as_deref() != Some(channel_id.as_str()) {
                return None;
            }
            decode_event("Channel", env)
        })
    }

    // ---- Discover / Resolve ------------------------------------------------

    pub async fn publish_discover(&self, data: DiscoverData) -> CommunicationResult<EventStream<ResolveEvent>> {
        let (correlation_id, rx) = self.register_correlator();
        let event = DiscoverEvent::new(EventType::Discover, self.source_id(), data)
            .with_correlation_id(correlation_id);
        let topic = self.build_request_topic(EventType::Discover, None);
        self.publish_json(topic, &event).await?;
        Ok(self.build_correlated_stream(correlation_id, rx, |env| decode_event("Resolve", env)))
    }

    pub async fn observe_discover(&self) -> EventStream<DiscoverRequest<C>> {
        let rx = self.subscribe_event_type(EventType::Discover).await;
        let manager = self.clone();
        self.build_event_stream(EventType::Discover, rx, move |env| {
            let event: DiscoverEvent = decode_event("Discover", env)?;
            Some(DiscoverRequest {
                event,
                manager: manager.clone(),
                used: std::sync::Arc::new(AtomicBool::new(false)),
            })
        })
    }

    // ---- Query / Retrieve --------------------------------------------------

    pub async fn publish_query(&self, data: QueryData) -> CommunicationResult<EventStream<RetrieveEvent>> {
        let (correlation_id, rx) = self.register_correlator();
        let event = QueryEvent::new(EventType::Query, self.source_id(), data).with_correlation_id(correlation_id);
        let topic = self.build_request_topic(EventType::Query, None);
        self.publish_json(topic, &event).await?;
        Ok(self.build_correlated_stream(correlation_id, rx, |env| decode_event("Retrieve", env)))
    }

    // ---- Update / Complete --------------------------------------------------

    pub async fn publish_update(&self, object: &CoatyObject) -> CommunicationResult<EventStream<UpdateEvent>> {
        let (correlation_id, rx) = self.register_correlator();
        let event: UpdateEvent = Event::new(EventType::Update, self.source_id(), object.clone())
            .with_correlation_id(correlation_id);
        let topic = self.build_request_topic(EventType::Update, None);
        self.publish_json(topic, &event).await?;
        Ok(self.build_correlated_stream(correlation_id, rx, |env| decode_event("Complete", env)))
    }

    // ---- Call / Return ------------------------------------------------------

    pub async fn publish_call(
        &self,
        operation: &str,
        parameters: serde_json::Value,
    ) -> CommunicationResult<EventStream<ReturnEvent>> {
        let (correlation_id, rx) = self.register_correlator();
        let event: CallEvent = Event::new(
            EventType::Call,
            self.source_id(),
            CallData {
                operation: operation.to_string(),
                parameters,
            },
        )
        .with_correlation_id(correlation_id);
        let topic = self.build_request_topic(EventType::Call, Some(operation));
        self.publish_json(topic, &event).await?;
        Ok(self.build_correlated_stream(correlation_id, rx, |env| decode_event("Return", env)))
    }

    pub async fn observe_call(&self, operation: &str) -> EventStream<CallRequest<C>> {
        let rx = self.subscribe_event_type(EventType::Call).await;
        let manager = self.clone();
        let operation = operation.to_string();
        self.build_event_stream(EventType::Call, rx, move |env| {
            if env.filter_tag.as_deref() != Some(operation.as_str()) {
                return None;
            }
            let event: CallEvent = decode_event("Call", env)?;
            Some(CallRequest {
                event,
                manager: manager.clone(),
                used: std::sync::Arc::new(AtomicBool::new(false)),
            })
        })
    }

    // ---- IoValue / IoState --------------------------------------------------

    pub async fn publish_io_value(&self, source_id: Uuid, payload: IoValuePayload) -> CommunicationResult<()> {
        let bytes = match payload {
            IoValuePayload::Json(value) => {
                serde_json::to_vec(&value).map_err(|e| CommunicationError::Serialization(e.to_string()))?
            }
            IoValuePayload::Raw(bytes) => bytes,
        };
        let topic = format!(
            "coaty/{}/{}/{}",
            self.inner.namespace,
            EventType::IoValue.topic_tag(),
            source_id
        );
        self.raw_publish(topic, bytes, QoS::AtMostOnce).await
    }

    pub async fn observe_io_value(&self, source_id: Uuid, use_raw: bool) -> EventStream<IoValuePayload> {
        let rx = self.subscribe_io_value(source_id).await;
        self.build_io_value_stream(source_id, rx, move |env| {
            if use_raw {
                Some(IoValuePayload::Raw(env.payload))
            } else {
                match serde_json::from_slice(&env.payload) {
                    Ok(value) => Some(IoValuePayload::Json(value)),
                    Err(err) => {
                        tracing::warn!(error = %err, "dropping malformed IO value payload");
                        None
                    }
                }
            }
        })
    }

    pub fn observe_io_state(&self, endpoint: &str) -> watch::Receiver<IoState> {
        let mut map = self.inner.io_state.lock().unwrap();
        map.entry(endpoint.to_string())
            .or_insert_with(|| watch::channel(IoState::default()).0)
            .subscribe()
    }

    /// Push a new association/rate state for `endpoint` — called by the IO
    /// router (or an IO actor/source controller) when associations change.
    pub fn set_io_state(&self, endpoint: &str, state: IoState) {
        let mut map = self.inner.io_state.lock().unwrap();
        match map.get(endpoint) {
            Some(tx) => {
                let _ = tx.send(state);
            }
            None => {
                map.insert(endpoint.to_string(), watch::channel(state).0);
            }
        }
    }
}

/// A received Discover event, awaiting exactly one `resolve` call.
pub struct DiscoverRequest<C: Channel> {
    pub event: DiscoverEvent,
    manager: CommunicationManager<C>,
    used: std::sync::Arc<AtomicBool>,
}

impl<C: Channel> DiscoverRequest<C> {
    /// Publish `object` as the Resolve response. Fails with
    /// `CommunicationError::AlreadyResolved` on a second call — a Discover
    /// request is answered at most once.
    pub async fn resolve(&self, object: CoatyObject) -> CommunicationResult<()> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(CommunicationError::AlreadyResolved);
        }
        let correlation_id = self
            .event
            .correlation_id
            .ok_or_else(|| CommunicationError::Other("discover event is missing its correlationId".into()))?;
        let response: ResolveEvent =
            Event::new(EventType::Resolve, self.manager.source_id(), object).with_correlation_id(correlation_id);
        let topic = self.manager.build_response_topic(EventType::Resolve, correlation_id);
        self.manager.publish_json(topic, &response).await
    }
}

/// A received Call event, awaiting exactly one `resolve` call.
pub struct CallRequest<C: Channel> {
    pub event: CallEvent,
    manager: CommunicationManager<C>,
    used: std::sync::Arc<AtomicBool>,
}

impl<C: Channel> CallRequest<C> {
    /// Publish `result` as a successful Return response.
    pub async fn resolve_ok(&self, result: serde_json::Value) -> CommunicationResult<()> {
        self.respond(ReturnData::Result { value: result }).await
    }

    /// Publish an error Return response.
    pub async fn resolve_err(&self, code: i32, message: impl Into<String>) -> CommunicationResult<()> {
        self.respond(ReturnData::Error {
            code,
            message: message.into(),
        })
        .await
    }

    async fn respond(&self, data: ReturnData) -> CommunicationResult<()> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(CommunicationError::AlreadyResolved);
        }
        let correlation_id = self
            .event
            .correlation_id
            .ok_or_else(|| CommunicationError::Other("call event is missing its correlationId".into()))?;
        let response: ReturnEvent =
            Event::new(EventType::Return, self.manager.source_id(), data).with_correlation_id(correlation_id);
        let topic = self.manager.build_response_topic(EventType::Return, correlation_id);
        self.manager.publish_json(topic, &response).await
    }
}

/// A decoded observer stream. Dropping it tears down its subscription (or
/// correlator) — subscriptions are reference-counted, so the broker
/// `unsubscribe` only fires once the last `EventStream` for an event type
/// is dropped.
pub struct EventStream<T> {
    inner: Pin<Box<dyn Stream<Item = T> + Send>>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<T>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

impl<T> EventStream<T> {
    /// Disassemble into its parts without running `Drop` (and thus without
    /// tearing down the subscription the parts still represent).
    fn into_parts(self) -> (Pin<Box<dyn Stream<Item = T> + Send>>, Option<Box<dyn FnOnce() + Send>>) {
        let this = std::mem::ManuallyDrop::new(self);
        let inner = unsafe { std::ptr::read(&this.inner) };
        let on_drop = unsafe { std::ptr::read(&this.on_drop) };
        (inner, on_drop)
    }
}

struct TerminatingTimeout<S> {
    inner: Pin<Box<tokio_stream::Timeout<S>>>,
    done: bool,
}

impl<S: Stream> Stream for TerminatingTimeout<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<S::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(item))) => Poll::Ready(Some(item)),
            Poll::Ready(Some(Err(_elapsed))) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Send + 'static> EventStream<T> {
    /// Wrap this stream so it ends — disposing its subscription via the
    /// usual `Drop` path — the first time more than `duration` elapses
    /// between items (or since creation, for the first item).
    pub fn with_timeout(self, duration: Duration) -> EventStream<T> {
        let (inner, on_drop) = self.into_parts();
        let timed = TerminatingTimeout {
            inner: Box::pin(tokio_stream::StreamExt::timeout(inner, duration)),
            done: false,
        };
        EventStream {
            inner: Box::pin(timed),
            on_drop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBroker, MockChannel};
    use coaty_model::CoreType;

    fn test_manager(channel: MockChannel, name: &str) -> CommunicationManager<MockChannel> {
        CommunicationManager::new(channel, Identity::new(name), CommunicationOptions::default())
    }

    #[tokio::test]
    async fn start_is_idempotent_and_advertises_identity() {
        let broker = MockBroker::new();
        let manager = test_manager(broker.connect(), "agent-1");
        manager.start().await.unwrap();
        manager.start().await.unwrap();
        assert_eq!(manager.state(), CommunicationState::Online);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_deadvertises() {
        let broker = MockBroker::new();
        let manager = test_manager(broker.connect(), "agent-1");
        manager.start().await.unwrap();
        manager.stop().await.unwrap();
        manager.stop().await.unwrap();
        assert_eq!(manager.state(), CommunicationState::Stopped);
    }

    #[tokio::test]
    async fn publishes_are_buffered_while_offline_and_flushed_on_start() {
        let broker = MockBroker::new();
        let manager = test_manager(broker.connect(), "agent-1");
        let bridge = broker.connect();
        let mut bridge_rx = bridge.incoming();
        assert_eq!(manager.state(), CommunicationState::Initial);

        let obj = CoatyObject::new(CoreType::Task, "t1");
        manager.publish_advertise(&obj).await.unwrap();
        assert!(manager.inner.outbound_buffer.lock().unwrap().len() == 1);

        manager.start().await.unwrap();
        assert!(manager.inner.outbound_buffer.lock().unwrap().is_empty());

        // the buffered advertise plus the identity-advertise from start()
        // should both have gone out once online.
        let mut seen = 0;
        for _ in 0..5 {
            if tokio::time::timeout(Duration::from_millis(20), bridge_rx.recv())
                .await
                .is_ok()
            {
                seen += 1;
            } else {
                break;
            }
        }
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn offline_buffer_drops_oldest_when_full() {
        let channel = MockChannel::standalone();
        let mut options = CommunicationOptions::default();
        options.buffer_capacity = 2;
        let manager = CommunicationManager::new(channel, Identity::new("agent-1"), options);

        for i in 0..3 {
            let obj = CoatyObject::new(CoreType::Task, format!("t{i}"));
            manager.publish_advertise(&obj).await.unwrap();
        }
        let buffered = manager.inner.outbound_buffer.lock().unwrap();
        assert_eq!(buffered.len(), 2);
    }

    #[tokio::test]
    async fn advertise_round_trips_between_two_managers_over_a_shared_broker() {
        let broker = MockBroker::new();
        let publisher = test_manager(broker.connect(), "publisher");
        let observer = test_manager(broker.connect(), "observer");
        let bridge = broker.connect();
        let mut bridge_rx = bridge.incoming();

        observer.start().await.unwrap();
        let mut stream = observer.observe_advertise_with_core_type("Task").await;

        publisher.start().await.unwrap();
        let task = CoatyObject::new(CoreType::Task, "pump-status");
        publisher.publish_advertise(&task).await.unwrap();

        // drain everything published on the shared bus into `observer`
        for _ in 0..8 {
            match tokio::time::timeout(Duration::from_millis(50), bridge_rx.recv()).await {
                Ok(Ok((topic, payload))) => observer.deliver_incoming(&topic, &payload).await,
                _ => break,
            }
        }

        let received = tokio::time::timeout(Duration::from_millis(50), stream.next())
            .await
            .expect("should receive before timing out")
            .expect("stream should yield an item");
        assert_eq!(received.data.object_id, task.object_id);
    }

    #[tokio::test]
    async fn discover_resolve_round_trip_and_duplicate_responder_is_deduplicated() {
        let broker = MockBroker::new();
        let requester = test_manager(broker.connect(), "requester");
        let responder = test_manager(broker.connect(), "responder");
        let bridge = broker.connect();
        let mut bridge_rx = bridge.incoming();

        requester.start().await.unwrap();
        responder.start().await.unwrap();

        let mut discover_requests = responder.observe_discover().await;
        let target_id = Uuid::new_v4();
        let mut resolve_stream = requester
            .publish_discover(DiscoverData::by_object_id(target_id))
            .await
            .unwrap();

        for _ in 0..4 {
            match tokio::time::timeout(Duration::from_millis(50), bridge_rx.recv()).await {
                Ok(Ok((topic, payload))) => {
                    requester.deliver_incoming(&topic, &payload).await;
                    responder.deliver_incoming(&topic, &payload).await;
                }
                _ => break,
            }
        }

        let request = tokio::time::timeout(Duration::from_millis(50), discover_requests.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.event.data.object_id, Some(target_id));

        let found = CoatyObject::new(CoreType::Task, "found");
        request.resolve(found.clone()).await.unwrap();
        // resolving twice is rejected
        assert!(request.resolve(found.clone()).await.is_err());

        for _ in 0..4 {
            match tokio::time::timeout(Duration::from_millis(50), bridge_rx.recv()).await {
                Ok(Ok((topic, payload))) => requester.deliver_incoming(&topic, &payload).await,
                _ => break,
            }
        }

        let resolved = tokio::time::timeout(Duration::from_millis(50), resolve_stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.data.object_id, found.object_id);
    }

    #[tokio::test]
    async fn channel_observer_only_sees_its_own_channel_id() {
        let broker = MockBroker::new();
        let publisher = test_manager(broker.connect(), "publisher");
        let observer = test_manager(broker.connect(), "observer");
        let bridge = broker.connect();
        let mut bridge_rx = bridge.incoming();

        observer.start().await.unwrap();
        let mut matching = observer.observe_channel("temps").await;
        let mut other = observer.observe_channel("humidity").await;

        publisher.start().await.unwrap();
        let obj = CoatyObject::new(CoreType::Task, "reading");
        publisher.publish_channel("temps", &obj).await.unwrap();

        for _ in 0..8 {
            match tokio::time::timeout(Duration::from_millis(50), bridge_rx.recv()).await {
                Ok(Ok((topic, payload))) => observer.deliver_incoming(&topic, &payload).await,
                _ => break,
            }
        }

        let received = tokio::time::timeout(Duration::from_millis(50), matching.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.data.object_id, obj.object_id);
        assert!(tokio::time::timeout(Duration::from_millis(20), other.next())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn subscription_is_torn_down_once_the_last_observer_drops() {
        let broker = MockBroker::new();
        let manager = test_manager(broker.connect(), "agent-1");
        manager.start().await.unwrap();

        let first = manager.observe_channel("c1").await;
        let second = manager.observe_channel("c1").await;
        assert_eq!(manager.inner.subs.lock().unwrap().get(&EventType::Channel).unwrap().refcount, 2);

        drop(first);
        assert_eq!(manager.inner.subs.lock().unwrap().get(&EventType::Channel).unwrap().refcount, 1);

        drop(second);
        // refcount hits zero synchronously; the broker unsubscribe itself
        // is spawned, so just assert the bookkeeping entry is gone.
        assert!(manager.inner.subs.lock().unwrap().get(&EventType::Channel).is_none());
    }

    #[tokio::test]
    async fn io_value_observers_are_scoped_per_source_id() {
        let broker = MockBroker::new();
        let publisher = test_manager(broker.connect(), "publisher");
        let observer = test_manager(broker.connect(), "observer");
        let bridge = broker.connect();
        let mut bridge_rx = bridge.incoming();

        observer.start().await.unwrap();
        let source_a = Uuid::new_v4();
        let source_b = Uuid::new_v4();
        let mut stream_a = observer.observe_io_value(source_a, false).await;

        publisher.start().await.unwrap();
        publisher
            .publish_io_value(source_b, IoValuePayload::Json(serde_json::json!(42)))
            .await
            .unwrap();
        publisher
            .publish_io_value(source_a, IoValuePayload::Json(serde_json::json!(7)))
            .await
            .unwrap();

        for _ in 0..8 {
            match tokio::time::timeout(Duration::from_millis(50), bridge_rx.recv()).await {
                Ok(Ok((topic, payload))) => observer.deliver_incoming(&topic, &payload).await,
                _ => break,
            }
        }

        let value = tokio::time::timeout(Duration::from_millis(50), stream_a.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, IoValuePayload::Json(serde_json::json!(7)));
    }

    #[test]
    fn identity_last_will_matches_the_deadvertise_topic_and_payload() {
        let identity = Identity::new("agent-1");
        let (topic, payload) = identity_deadvertise_last_will(&identity, "-", false).unwrap();
        assert_eq!(topic, format!("coaty/-/{}/{}", EventType::Deadvertise.topic_tag(), identity.base.object_id));

        let event: DeadvertiseEvent = serde_json::from_slice(&payload).unwrap();
        assert_eq!(event.data.object_ids, vec![identity.base.object_id]);
    }

    #[test]
    fn identity_last_will_uses_the_readable_name_when_enabled() {
        let identity = Identity::new("agent-readable");
        let (topic, _) = identity_deadvertise_last_will(&identity, "-", true).unwrap();
        assert_eq!(topic, format!("coaty/-/{}/agent-readable", EventType::Deadvertise.topic_tag()));
    }

    #[tokio::test]
    async fn io_state_starts_at_default_and_reflects_updates() {
        let channel = MockChannel::standalone();
        let manager = test_manager(channel, "agent-1");
        let mut rx = manager.observe_io_state("edge-1/temp");
        assert_eq!(*rx.borrow(), IoState::default());

        manager.set_io_state(
            "edge-1/temp",
            IoState {
                has_associations: true,
                update_rate: Some(500),
            },
        );
        rx.changed().await.unwrap();
        assert!(rx.borrow().has_associations);
    }
}
