//! The rule-based IO router: maintains `(source, actor, rate)` associations
//! for one `IoContext`, per the six-step matching algorithm.

use std::collections::HashMap;

use coaty_model::{AssociationKey, IoActor, IoContext, IoNode, IoSource};
use uuid::Uuid;

use crate::error::{RouterError, RouterResult};
use crate::rule::Rule;

/// One resolved source/actor pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub rate: Option<u64>,
    pub topic: String,
}

/// A change to the association set, emitted by [`IoRouter::reevaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    Associate {
        key: AssociationKey,
        rate: Option<u64>,
        topic: String,
    },
    Disassociate {
        key: AssociationKey,
    },
}

/// Rules grouped by `valueType`, in first-registration order. The empty
/// string group (if present) is the global fallback, consulted only when a
/// pair's own `valueType` group is absent.
struct RuleGroup {
    value_type: String,
    rules: Vec<Rule>,
}

pub struct IoRouter {
    namespace: String,
    rule_groups: Vec<RuleGroup>,
    context: IoContext,
    managed_nodes: HashMap<Uuid, IoNode>,
    associations: HashMap<AssociationKey, Association>,
    external_routes: HashMap<String, Uuid>,
}

impl IoRouter {
    pub fn new(namespace: impl Into<String>, context: IoContext, rules: Vec<Rule>) -> Self {
        let mut rule_groups: Vec<RuleGroup> = Vec::new();
        for rule in rules {
            match rule_groups.iter_mut().find(|g| g.value_type == rule.value_type) {
                Some(group) => group.rules.push(rule),
                None => rule_groups.push(RuleGroup {
                    value_type: rule.value_type.clone(),
                    rules: vec![rule],
                }),
            }
        }
        Self {
            namespace: namespace.into(),
            rule_groups,
            context,
            managed_nodes: HashMap::new(),
            associations: HashMap::new(),
            external_routes: HashMap::new(),
        }
    }

    pub fn context(&self) -> &IoContext {
        &self.context
    }

    pub fn managed_node(&self, node_id: Uuid) -> Option<&IoNode> {
        self.managed_nodes.get(&node_id)
    }

    pub fn associations(&self) -> &HashMap<AssociationKey, Association> {
        &self.associations
    }

    pub fn is_associated(&self, key: AssociationKey) -> bool {
        self.associations.contains_key(&key)
    }

    /// Begin managing `node` (from its Advertise) and recompute
    /// associations. On failure (e.g. a topic collision) the node set is
    /// rolled back along with the association diff, leaving the router
    /// exactly as it was before the call.
    pub fn advertise_node(&mut self, node: IoNode) -> RouterResult<Vec<RouterEvent>> {
        let node_id = node.base.object_id;
        let previous = self.managed_nodes.insert(node_id, node);
        self.reevaluate().inspect_err(|_| {
            match previous {
                Some(previous) => {
                    self.managed_nodes.insert(node_id, previous);
                }
                None => {
                    self.managed_nodes.remove(&node_id);
                }
            }
        })
    }

    /// Stop managing the node (its Deadvertise, or its container going
    /// offline) and recompute associations.
    pub fn deadvertise_node(&mut self, node_id: Uuid) -> RouterResult<Vec<RouterEvent>> {
        let previous = self.managed_nodes.remove(&node_id);
        self.reevaluate().inspect_err(|_| {
            if let Some(previous) = previous {
                self.managed_nodes.insert(node_id, previous);
            }
        })
    }

    /// Handle an Update-Complete on the router's `IoContext` and recompute
    /// associations against the new context.
    pub fn on_io_context_changed(&mut self, context: IoContext) -> RouterResult<Vec<RouterEvent>> {
        self.context = context;
        self.reevaluate()
    }

    fn rules_for(&self, value_type: &str) -> Option<&[Rule]> {
        self.rule_groups
            .iter()
            .find(|g| g.value_type == value_type)
            .map(|g| g.rules.as_slice())
            .filter(|rules| !rules.is_empty())
            .or_else(|| {
                self.rule_groups
                    .iter()
                    .find(|g| g.value_type.is_empty())
                    .map(|g| g.rules.as_slice())
            })
    }

    /// Recompute the association set from scratch against the currently
    /// managed nodes and rules, then apply the result atomically: either
    /// the whole new set and its events replace the old ones, or (on a
    /// topic collision) nothing changes at all.
    pub fn reevaluate(&mut self) -> RouterResult<Vec<RouterEvent>> {
        let (new_associations, new_routes, events) = self.compute()?;
        self.associations = new_associations;
        self.external_routes = new_routes;
        Ok(events)
    }

    fn topic_for_source(
        &self,
        source_id: Uuid,
        external_route: Option<&str>,
        routes: &mut HashMap<String, Uuid>,
    ) -> RouterResult<String> {
        match external_route {
            Some(route) => {
                match routes.get(route) {
                    Some(owner) if *owner != source_id => {
                        return Err(RouterError::TopicCollision {
                            route: route.to_string(),
                            existing_source: *owner,
                            new_source: source_id,
                        })
                    }
                    _ => {
                        routes.insert(route.to_string(), source_id);
                    }
                }
                Ok(route.to_string())
            }
            None => Ok(format!("coaty/{}/IOV/{source_id}", self.namespace)),
        }
    }

    #[allow(clippy::type_complexity)]
    fn compute(
        &self,
    ) -> RouterResult<(
        HashMap<AssociationKey, Association>,
        HashMap<String, Uuid>,
        Vec<RouterEvent>,
    )> {
        // Step 1: collect all currently-managed sources and actors, each
        // paired with the node that owns it.
        let sources: Vec<(&IoNode, &IoSource)> = self
            .managed_nodes
            .values()
            .flat_map(|node| node.io_sources.iter().map(move |s| (node, s)))
            .collect();
        let actors: Vec<(&IoNode, &IoActor)> = self
            .managed_nodes
            .values()
            .flat_map(|node| node.io_actors.iter().map(move |a| (node, a)))
            .collect();

        // Step 2 + 3: compatible pairs, filtered by rule evaluation.
        let mut candidates_by_source: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (source_node, source) in &sources {
            for (actor_node, actor) in &actors {
                if !IoActor::is_compatible_with(source, actor) {
                    continue;
                }
                let Some(rules) = self.rules_for(&source.io.value_type) else {
                    continue;
                };
                let matched = rules
                    .iter()
                    .any(|rule| rule.evaluate(source, source_node, actor, actor_node, &self.context, self));
                if matched {
                    candidates_by_source
                        .entry(source.base.object_id)
                        .or_default()
                        .push(actor.base.object_id);
                }
            }
        }

        let sources_by_id: HashMap<Uuid, &IoSource> =
            sources.iter().map(|(_, s)| (s.base.object_id, *s)).collect();
        let actors_by_id: HashMap<Uuid, &IoActor> =
            actors.iter().map(|(_, a)| (a.base.object_id, *a)).collect();

        // Step 4: rate resolution, one cumulated rate per candidate source.
        let mut new_associations: HashMap<AssociationKey, Association> = HashMap::new();
        let mut routes = self.external_routes.clone();
        let mut events = Vec::new();

        for (source_id, actor_ids) in &candidates_by_source {
            let source = sources_by_id[source_id];
            // Undefined (None) stands for an unbounded rate, so it dominates
            // the max: one undefined participant collapses the whole group
            // to undefined rather than being dropped from consideration.
            let cumulated_rate = source.io.update_rate.and_then(|source_rate| {
                actor_ids.iter().try_fold(source_rate, |acc, actor_id| {
                    actors_by_id[actor_id].io.update_rate.map(|rate| acc.max(rate))
                })
            });

            // Step 6: stable per-source topic allocation.
            let topic = self.topic_for_source(*source_id, source.io.external_route.as_deref(), &mut routes)?;

            for actor_id in actor_ids {
                let key = AssociationKey::new(*source_id, *actor_id);
                new_associations.insert(
                    key,
                    Association {
                        rate: cumulated_rate,
                        topic: topic.clone(),
                    },
                );
            }
        }

        // Step 5: diff against the previous association set.
        for (key, new_assoc) in &new_associations {
            match self.associations.get(key) {
                None => events.push(RouterEvent::Associate {
                    key: *key,
                    rate: new_assoc.rate,
                    topic: new_assoc.topic.clone(),
                }),
                Some(old_assoc) if old_assoc.rate != new_assoc.rate => events.push(RouterEvent::Associate {
                    key: *key,
                    rate: new_assoc.rate,
                    topic: new_assoc.topic.clone(),
                }),
                Some(_) => {}
            }
        }
        for key in self.associations.keys() {
            if !new_associations.contains_key(key) {
                events.push(RouterEvent::Disassociate { key: *key });
            }
        }

        Ok((new_associations, routes, events))
    }
}
