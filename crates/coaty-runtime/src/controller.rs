//! The `Controller` trait and the context threaded to every controller on
//! construction.

use std::sync::Arc;

use async_trait::async_trait;
use coaty_communication::CommunicationManager;
use coaty_model::{CoatyObject, Identity};

use crate::agent_info::AgentInfo;

/// Read-only context shared by every controller in a container: the
/// container's own `Identity`, the optional `common.associatedUser`, and
/// `common.agentInfo` metadata for Log events.
#[derive(Clone)]
pub struct ControllerContext {
    pub identity: Identity,
    pub associated_user: Option<CoatyObject>,
    pub agent_info: Option<Arc<AgentInfo>>,
}

/// A unit of behavior hung off a container's lifecycle. Controllers
/// publish/observe events through the `CommunicationManager` handed to
/// them at construction; the container only calls the two lifecycle
/// hooks, in start/stop order.
#[async_trait]
pub trait Controller<C: coaty_communication::Channel>: Send + Sync {
    fn name(&self) -> &str;

    /// Called once communication is online, in container registration
    /// order. Controllers that subscribe to events do so here.
    async fn on_container_started(&self, _manager: &CommunicationManager<C>, _context: &ControllerContext) {}

    /// Called before communication stops, in reverse registration order.
    async fn on_container_stopping(&self, _manager: &CommunicationManager<C>, _context: &ControllerContext) {}
}
