//! User-defined association rules.

use coaty_model::{IoActor, IoContext, IoNode, IoSource};

use crate::router::IoRouter;

/// A synchronous predicate deciding whether a compatible source/actor pair
/// should be associated. `value_type` of `""` marks a global fallback rule,
/// consulted only when no rule registered for the pair's own `valueType`
/// exists.
pub struct Rule {
    pub name: String,
    pub value_type: String,
    #[allow(clippy::type_complexity)]
    condition: Box<dyn Fn(&IoSource, &IoNode, &IoActor, &IoNode, &IoContext, &IoRouter) -> bool + Send + Sync>,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        value_type: impl Into<String>,
        condition: impl Fn(&IoSource, &IoNode, &IoActor, &IoNode, &IoContext, &IoRouter) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            value_type: value_type.into(),
            condition: Box::new(condition),
        }
    }

    /// A rule that matches every compatible pair unconditionally.
    pub fn always(name: impl Into<String>, value_type: impl Into<String>) -> Self {
        Self::new(name, value_type, |_, _, _, _, _, _| true)
    }

    /// Evaluate the predicate, catching panics per the "rule evaluation
    /// exception -> catch, log, treat pair as non-matching" error policy.
    pub(crate) fn evaluate(
        &self,
        source: &IoSource,
        source_node: &IoNode,
        actor: &IoActor,
        actor_node: &IoNode,
        context: &IoContext,
        router: &IoRouter,
    ) -> bool {
        let condition = &self.condition;
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            condition(source, source_node, actor, actor_node, context, router)
        }));
        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(rule = %self.name, "rule evaluation panicked; treating pair as non-matching");
                false
            }
        }
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .finish_non_exhaustive()
    }
}
