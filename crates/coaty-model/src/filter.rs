//! The `ContextFilter`/`ObjectFilter` condition-tree DSL types.
//!
//! This module holds the data shapes only; evaluation semantics (the
//! normative operator behavior) live in the `coaty-filter` crate, which
//! depends on these types.

use serde::{Deserialize, Serialize};

/// A property path into an object. The array form is authoritative — it
/// admits property names that themselves contain `.`. Dot-notation strings
/// are normalized into this form on ingress (see `PropertyPath::parse`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyPath(pub Vec<String>);

impl PropertyPath {
    /// Parse a dot-notation string into a path. An explicit array should be
    /// constructed directly via `PropertyPath(vec![...])` instead — this
    /// constructor exists for the dot-notation convenience form only.
    pub fn parse(dotted: &str) -> Self {
        PropertyPath(dotted.split('.').map(|s| s.to_string()).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for PropertyPath {
    fn from(value: &str) -> Self {
        PropertyPath::parse(value)
    }
}

impl From<Vec<String>> for PropertyPath {
    fn from(value: Vec<String>) -> Self {
        PropertyPath(value)
    }
}

/// Comparison/containment/LIKE operators, per the normative semantics in
/// the matcher specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "camelCase")]
pub enum FilterOperator {
    LessThan(serde_json::Value),
    LessThanOrEqual(serde_json::Value),
    GreaterThan(serde_json::Value),
    GreaterThanOrEqual(serde_json::Value),
    Between(serde_json::Value, serde_json::Value),
    NotBetween(serde_json::Value, serde_json::Value),
    Like(String),
    NotLike(String),
    Equals(serde_json::Value),
    NotEquals(serde_json::Value),
    Exists,
    NotExists,
    Contains(serde_json::Value),
    NotContains(serde_json::Value),
    In(Vec<serde_json::Value>),
    NotIn(Vec<serde_json::Value>),
}

/// One leaf condition: a property path paired with an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub path: PropertyPath,
    pub operator: FilterOperator,
}

impl FilterCondition {
    pub fn new(path: impl Into<PropertyPath>, operator: FilterOperator) -> Self {
        Self {
            path: path.into(),
            operator,
        }
    }
}

/// A condition tree node. A node is a single condition, an `And` of child
/// nodes, or an `Or` of child nodes — never both kinds of compounding in
/// the same node. An empty `And`/`Or` list matches everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    Single(FilterCondition),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn single(path: impl Into<PropertyPath>, operator: FilterOperator) -> Self {
        Condition::Single(FilterCondition::new(path, operator))
    }
}

/// Sort direction for `orderByProperties`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A condition tree plus optional ordering, skip, and take — evaluated by
/// `coaty-filter` against one object or over a query result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContextFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by_properties: Vec<(PropertyPath, SortDirection)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<u64>,
}

/// `ObjectFilter` is the same shape as `ContextFilter`, applied to
/// `CoatyObject`-shaped values rather than arbitrary context values.
pub type ObjectFilter = ContextFilter;
