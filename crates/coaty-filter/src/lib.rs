//! Context-filter query and matching core.
//!
//! `coaty-model` defines the `ContextFilter`/`Condition`/`FilterOperator`
//! shapes; this crate evaluates them against `serde_json::Value`-shaped
//! data, independent of any particular storage backend.

pub mod collator;
pub mod like;
pub mod matcher;
pub mod order;
pub mod utils;

pub use collator::{default_collator, Collator, OrdinalCollator};
pub use matcher::{matches, matches_with_collator, negate, resolve_property};
