//! IO actor/source controllers and the router-to-communication bridge.
//!
//! `coaty-io-router` computes association diffs in isolation; this module
//! pushes that diff into the `CommunicationManager`'s `IoState` slots
//! (`observe_io_state`/`set_io_state`) that the controllers below react
//! to, and owns the per-source backpressure regulator. Wiring the router
//! itself to network Advertise/Deadvertise traffic is left to the
//! application (the demo binary does this directly): `CommunicationManager`
//! only exposes an Advertise observer, not a Deadvertise one, so an
//! always-on "IoRouter controller" that auto-subscribes to topology churn
//! isn't expressible without extending that contract.

mod actor;
mod source;

use std::collections::HashSet;

use coaty_communication::{Channel, CommunicationManager, IoState};
use coaty_io_router::{IoRouter, RouterEvent};
use uuid::Uuid;

pub use actor::IoActorController;
pub use source::IoSourceController;

/// Recompute and push `IoState` for every source/actor touched by `events`,
/// straight from the router's current association set rather than
/// incrementally — this is what gives observers the "consistent snapshot"
/// guarantee even though events and state pushes are two separate steps.
pub fn sync_io_state<C: Channel>(manager: &CommunicationManager<C>, router: &IoRouter, events: &[RouterEvent]) {
    let mut affected: HashSet<Uuid> = HashSet::new();
    for event in events {
        match event {
            RouterEvent::Associate { key, .. } => {
                affected.insert(key.source_id);
                affected.insert(key.actor_id);
            }
            RouterEvent::Disassociate { key } => {
                affected.insert(key.source_id);
                affected.insert(key.actor_id);
            }
        }
    }
    for id in affected {
        let mut has_associations = false;
        let mut rate: Option<u64> = None;
        for (key, association) in router.associations() {
            if key.source_id == id || key.actor_id == id {
                has_associations = true;
                rate = match (rate, association.rate) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (Some(a), None) => Some(a),
                    (None, b) => b,
                };
            }
        }
        manager.set_io_state(&id.to_string(), IoState { has_associations, update_rate: rate });
    }
}
