//! Container: resolves a `ContainerConfig` into a running communication
//! manager plus a fixed set of controllers, and drives their lifecycle
//! hooks in registration / reverse-registration order.

use std::sync::Arc;

use coaty_communication::{Channel, CommunicationManager, CommunicationOptions};
use coaty_model::Identity;

use crate::agent_info::AgentInfo;
use crate::config::ContainerConfig;
use crate::controller::{Controller, ControllerContext};
use crate::error::RuntimeResult;

/// A resolved set of cooperating controllers sharing one communication
/// manager and one `ControllerContext`.
pub struct Container<C: Channel> {
    manager: CommunicationManager<C>,
    controllers: Vec<Arc<dyn Controller<C>>>,
    context: ControllerContext,
}

impl<C: Channel> Container<C> {
    /// Build a container from `config`: an `Identity` named after
    /// `communication.identity_name`, a `CommunicationManager` wired to
    /// `channel`, and the given controllers in registration order. Starts
    /// communication and every controller immediately unless
    /// `communication.should_auto_start` is `false`.
    pub async fn resolve(
        config: &ContainerConfig,
        channel: C,
        controllers: Vec<Arc<dyn Controller<C>>>,
    ) -> RuntimeResult<Self> {
        Self::resolve_with_identity(config, config.identity(), channel, controllers).await
    }

    /// Same as `resolve`, but with an `Identity` built by the caller ahead
    /// of `channel`'s own construction — needed when the channel itself
    /// (e.g. an MQTT last-will) depends on the identity it will end up
    /// wrapped around.
    pub async fn resolve_with_identity(
        config: &ContainerConfig,
        identity: Identity,
        channel: C,
        controllers: Vec<Arc<dyn Controller<C>>>,
    ) -> RuntimeResult<Self> {
        let options = CommunicationOptions {
            namespace: config.communication.namespace.clone(),
            buffer_capacity: config.communication.buffer_capacity,
            readable_topics: config.communication.use_readable_topics,
        };
        let manager = CommunicationManager::new(channel, identity.clone(), options);

        let agent_info = if config.common.attach_agent_info {
            Some(Arc::new(AgentInfo::from_env()))
        } else {
            None
        };
        let context = ControllerContext {
            identity,
            associated_user: config.common.associated_user.clone(),
            agent_info,
        };

        let container = Self { manager, controllers, context };
        if config.communication.should_auto_start {
            container.start().await?;
        }
        Ok(container)
    }

    pub fn manager(&self) -> &CommunicationManager<C> {
        &self.manager
    }

    pub fn context(&self) -> &ControllerContext {
        &self.context
    }

    /// Bring communication online, then notify every controller in
    /// registration order.
    pub async fn start(&self) -> RuntimeResult<()> {
        self.manager.start().await?;
        for controller in &self.controllers {
            controller.on_container_started(&self.manager, &self.context).await;
        }
        Ok(())
    }

    /// Notify every controller in reverse registration order, then take
    /// communication offline (publishing Deadvertise).
    pub async fn stop(&self) -> RuntimeResult<()> {
        for controller in self.controllers.iter().rev() {
            controller.on_container_stopping(&self.manager, &self.context).await;
        }
        self.manager.stop().await?;
        Ok(())
    }
}
