//! coaty-agent — demo binary wiring a container, an IO router, and one
//! IO source/actor pair against a real MQTT broker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coaty_communication::{Channel, CommunicationManager, MqttChannel};
use coaty_io_router::{IoRouter, Rule};
use coaty_model::{IoActor, IoContext, IoNode, IoSource};
use coaty_runtime::{io::sync_io_state, Container, ContainerConfig, Controller, ControllerContext, IoActorController, IoSourceController};
use rumqttc::{Event, Packet};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Advertises this process's own IO node and reacts to network topology
/// churn by recomputing associations. Driven entirely through the
/// `CommunicationManager`'s Advertise observer, since there is no
/// Deadvertise observer to subscribe to symmetrically.
struct IoRoutingController {
    router: Mutex<IoRouter>,
    node: IoNode,
}

#[async_trait]
impl<C: Channel> Controller<C> for IoRoutingController {
    fn name(&self) -> &str {
        "IoRouting"
    }

    async fn on_container_started(&self, manager: &CommunicationManager<C>, _context: &ControllerContext) {
        let mut router = self.router.lock().await;
        match router.advertise_node(self.node.clone()) {
            Ok(events) => sync_io_state(manager, &router, &events),
            Err(err) => tracing::error!(error = %err, "failed to advertise IO node"),
        }

        drop(router);
        let mut advertisements = manager.observe_advertise_with_core_type("IoNode").await;
        let manager = manager.clone();
        let router = &self.router;
        loop {
            use tokio_stream::StreamExt;
            match advertisements.next().await {
                Some(event) => {
                    if let Ok(node) = serde_json::from_value::<IoNode>(serde_json::to_value(&event.data).unwrap_or_default()) {
                        let mut router = router.lock().await;
                        if let Ok(events) = router.advertise_node(node) {
                            sync_io_state(&manager, &router, &events);
                        }
                    }
                }
                None => return,
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).json().init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "coaty-agent starting");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "/etc/coaty/agent.toml".to_string());
    let config = ContainerConfig::from_file(&config_path)?;

    let identity = config.identity();
    let last_will = coaty_communication::identity_deadvertise_last_will(
        &identity,
        &config.communication.namespace,
        config.communication.use_readable_topics,
    )?;
    let (channel, mut event_loop) = MqttChannel::new(&config.communication.broker, last_will)?;

    let mut source = IoSource::new("engine-temp", "celsius");
    source.update_strategy = coaty_model::UpdateStrategy::Sample;
    source.io.update_rate = Some(1000);
    let actor = IoActor::new("dashboard-temp", "celsius");
    let actor_source_id = source.base.object_id;

    let mut node = IoNode::new("coaty-agent-node");
    node.io_sources.push(source.clone());
    node.io_actors.push(actor.clone());

    let router = IoRouter::new(&config.communication.namespace, IoContext::new("default"), vec![Rule::always("accept-all", "")]);
    let routing_controller = Arc::new(IoRoutingController { router: Mutex::new(router), node });

    let controllers: Vec<Arc<dyn Controller<MqttChannel>>> = vec![routing_controller];
    let container = Container::resolve_with_identity(&config, identity, channel, controllers).await?;

    let source_controller = IoSourceController::new(&source, container.manager().clone());
    let _actor_controller = IoActorController::new(&actor, actor_source_id, container.manager().clone());

    tracing::info!("coaty-agent ready");

    let manager = container.manager().clone();
    tokio::select! {
        _ = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        manager.deliver_incoming(&publish.topic, &publish.payload).await;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(error = %err, "MQTT event loop error, retrying in 5s");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        } => {
            tracing::error!("MQTT loop exited unexpectedly");
        }
        _ = async {
            let mut tick = tokio::time::interval(Duration::from_millis(500));
            loop {
                tick.tick().await;
                source_controller.publish(coaty_communication::IoValuePayload::Json(serde_json::json!(42.0)));
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    container.stop().await?;
    tracing::info!("coaty-agent stopped");
    Ok(())
}
