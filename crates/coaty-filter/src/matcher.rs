//! Condition-tree evaluation against a single JSON-value-compatible
//! object: property resolution, the normative operator semantics, and
//! `negate`, the structural negation used to test the
//! `matches(o, f) == !matches(o, negate(f))` property.

use std::cmp::Ordering;

use coaty_model::{Condition, ContextFilter, FilterCondition, FilterOperator};
use serde_json::Value;

use crate::collator::{default_collator, Collator};
use crate::like;
use crate::utils::{contains, deep_equals};

/// Resolve a property path against a JSON value. Traversal through `null`
/// or any non-object value yields "absent" (`None`), matching the spec's
/// plain-property-lookup semantics — there is no array indexing or
/// wildcard expansion in a path segment.
pub fn resolve_property<'a>(object: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = object;
    for segment in path {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Evaluate a full `ContextFilter`'s condition tree against one object,
/// using the default ordinal string collator. A filter with no condition
/// matches everything.
pub fn matches(object: &Value, filter: &ContextFilter) -> bool {
    matches_with_collator(object, filter, &default_collator())
}

/// Same as [`matches`] but with an explicit collator, for callers that
/// need locale-aware string ordering.
pub fn matches_with_collator(object: &Value, filter: &ContextFilter, collator: &dyn Collator) -> bool {
    match &filter.condition {
        None => true,
        Some(condition) => eval_condition(object, condition, collator),
    }
}

fn eval_condition(object: &Value, condition: &Condition, collator: &dyn Collator) -> bool {
    match condition {
        Condition::Single(fc) => eval_leaf(object, fc, collator),
        // Empty And/Or lists match everything, per spec.
        Condition::And(children) => children.iter().all(|c| eval_condition(object, c, collator)),
        Condition::Or(children) => children.iter().any(|c| eval_condition(object, c, collator)),
    }
}

fn eval_leaf(object: &Value, fc: &FilterCondition, collator: &dyn Collator) -> bool {
    let resolved = resolve_property(object, fc.path.as_slice());
    eval_operator(resolved, &fc.operator, collator)
}

fn eval_operator(resolved: Option<&Value>, op: &FilterOperator, collator: &dyn Collator) -> bool {
    use FilterOperator::*;
    match op {
        LessThan(rhs) => order(resolved, rhs, collator).is_some_and(|o| o == Ordering::Less),
        LessThanOrEqual(rhs) => order(resolved, rhs, collator).is_some_and(|o| o != Ordering::Greater),
        GreaterThan(rhs) => order(resolved, rhs, collator).is_some_and(|o| o == Ordering::Greater),
        GreaterThanOrEqual(rhs) => order(resolved, rhs, collator).is_some_and(|o| o != Ordering::Less),

        Between(a, b) => in_range(resolved, a, b, collator),
        NotBetween(a, b) => !in_range(resolved, a, b, collator),

        Like(pattern) => match resolved {
            Some(Value::String(s)) => like::matches(s, pattern).unwrap_or(false),
            _ => false,
        },
        NotLike(pattern) => match resolved {
            Some(Value::String(s)) => !like::matches(s, pattern).unwrap_or(false),
            // Non-strings always fail Like, so NotLike of a non-string is true.
            _ => true,
        },

        Equals(rhs) => resolved.is_some_and(|v| deep_equals(v, rhs)),
        NotEquals(rhs) => match resolved {
            Some(v) => !deep_equals(v, rhs),
            None => true,
        },

        Exists => resolved.is_some(),
        NotExists => resolved.is_none(),

        Contains(rhs) => resolved.is_some_and(|v| contains(v, rhs)),
        NotContains(rhs) => match resolved {
            Some(v) => !contains(v, rhs),
            None => true,
        },

        In(values) => resolved.is_some_and(|v| values.iter().any(|x| deep_equals(v, x))),
        NotIn(values) => match resolved {
            Some(v) => !values.iter().any(|x| deep_equals(v, x)),
            None => true,
        },
    }
}

/// Order a resolved value against a JSON operand: numeric compare if both
/// are numbers, collator compare if both are strings, `None` (no defined
/// order) for every other pairing, including an absent property.
fn order(resolved: Option<&Value>, rhs: &Value, collator: &dyn Collator) -> Option<Ordering> {
    match (resolved?, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(collator.compare(a, b)),
        _ => None,
    }
}

fn in_range(resolved: Option<&Value>, a: &Value, b: &Value, collator: &dyn Collator) -> bool {
    // Endpoints are compared against each other first so a > b swaps
    // without needing the resolved value; if a and b aren't themselves
    // comparable we fall back to using them in the given order.
    let (low, high) = match order(Some(a), b, collator) {
        Some(Ordering::Greater) => (b, a),
        _ => (a, b),
    };
    let above_low = order(resolved, low, collator).is_some_and(|o| o != Ordering::Less);
    let below_high = order(resolved, high, collator).is_some_and(|o| o != Ordering::Greater);
    above_low && below_high
}

/// Structural negation of a condition tree, used to test
/// `matches(o, f) == !matches(o, negate(f))`. Returns `None` when some
/// leaf operator has no defined negation (the `LessThan`-family) and the
/// tree therefore can't be negated as a whole.
pub fn negate(condition: &Condition) -> Option<Condition> {
    match condition {
        Condition::Single(fc) => {
            negate_operator(&fc.operator).map(|op| Condition::Single(FilterCondition::new(fc.path.clone(), op)))
        }
        Condition::And(children) => {
            let negated: Option<Vec<Condition>> = children.iter().map(negate).collect();
            negated.map(Condition::Or)
        }
        Condition::Or(children) => {
            let negated: Option<Vec<Condition>> = children.iter().map(negate).collect();
            negated.map(Condition::And)
        }
    }
}

fn negate_operator(op: &FilterOperator) -> Option<FilterOperator> {
    use FilterOperator::*;
    Some(match op {
        Equals(v) => NotEquals(v.clone()),
        NotEquals(v) => Equals(v.clone()),
        In(v) => NotIn(v.clone()),
        NotIn(v) => In(v.clone()),
        Contains(v) => NotContains(v.clone()),
        NotContains(v) => Contains(v.clone()),
        Between(a, b) => NotBetween(a.clone(), b.clone()),
        NotBetween(a, b) => Between(a.clone(), b.clone()),
        Exists => NotExists,
        NotExists => Exists,
        Like(p) => NotLike(p.clone()),
        NotLike(p) => Like(p.clone()),
        LessThan(_) | LessThanOrEqual(_) | GreaterThan(_) | GreaterThanOrEqual(_) => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(condition: Condition) -> ContextFilter {
        ContextFilter {
            condition: Some(condition),
            ..Default::default()
        }
    }

    #[test]
    fn property_resolution_splits_into_absence_through_null_or_scalar() {
        let obj = json!({"a": {"b": null}, "c": 5});
        assert!(resolve_property(&obj, &["a".into(), "b".into(), "x".into()]).is_none());
        assert!(resolve_property(&obj, &["c".into(), "x".into()]).is_none());
        assert_eq!(resolve_property(&obj, &["c".into()]), Some(&json!(5)));
    }

    #[test]
    fn empty_string_segments_are_literal_keys() {
        let obj = json!({"": {"": {"": "deep"}}});
        let path = vec!["".to_string(), "".to_string(), "".to_string()];
        assert_eq!(resolve_property(&obj, &path), Some(&json!("deep")));
    }

    #[test]
    fn numeric_ordering_operators() {
        let obj = json!({"n": 5});
        assert!(matches(&obj, &filter(Condition::single("n", FilterOperator::GreaterThan(json!(3))))));
        assert!(!matches(&obj, &filter(Condition::single("n", FilterOperator::LessThan(json!(3))))));
    }

    #[test]
    fn mismatched_types_never_order() {
        let obj = json!({"n": "text"});
        assert!(!matches(&obj, &filter(Condition::single("n", FilterOperator::GreaterThan(json!(3))))));
    }

    #[test]
    fn between_swaps_reversed_endpoints() {
        let obj = json!({"n": 5});
        let normal = filter(Condition::single("n", FilterOperator::Between(json!(1), json!(10))));
        let reversed = filter(Condition::single("n", FilterOperator::Between(json!(10), json!(1))));
        assert!(matches(&obj, &normal));
        assert!(matches(&obj, &reversed));
    }

    #[test]
    fn between_is_inclusive() {
        let obj = json!({"n": 10});
        let f = filter(Condition::single("n", FilterOperator::Between(json!(1), json!(10))));
        assert!(matches(&obj, &f));
    }

    #[test]
    fn equals_and_not_equals_on_absent_property_are_true_negations() {
        let obj = json!({});
        let eq = filter(Condition::single("missing", FilterOperator::Equals(json!(1))));
        let neq = filter(Condition::single("missing", FilterOperator::NotEquals(json!(1))));
        assert!(!matches(&obj, &eq));
        assert!(matches(&obj, &neq));
    }

    #[test]
    fn exists_and_not_exists() {
        let obj = json!({"a": null});
        assert!(matches(&obj, &filter(Condition::single("a", FilterOperator::Exists))));
        assert!(!matches(&obj, &filter(Condition::single("missing", FilterOperator::Exists))));
        assert!(matches(&obj, &filter(Condition::single("missing", FilterOperator::NotExists))));
    }

    #[test]
    fn contains_empty_array_matches_every_array_or_object() {
        let arr = json!({"a": [1, 2, 3]});
        let obj = json!({"a": {"x": 1}});
        let f = filter(Condition::single("a", FilterOperator::Contains(json!([]))));
        assert!(matches(&arr, &f));
        assert!(matches(&obj, &f));
    }

    #[test]
    fn filter_containment_end_to_end_scenario() {
        let obj = json!({"a": [1, 2, 3], "b": {"x": 42, "y": 43}});
        let matching = filter(Condition::And(vec![
            Condition::single("a", FilterOperator::Contains(json!(3))),
            Condition::single("b", FilterOperator::Contains(json!({"x": 42}))),
        ]));
        assert!(matches(&obj, &matching));

        let non_matching = filter(Condition::single("a", FilterOperator::Contains(json!(4))));
        assert!(!matches(&obj, &non_matching));
    }

    #[test]
    fn in_and_not_in_use_deep_equal_membership() {
        let obj = json!({"n": 2});
        let f = filter(Condition::single("n", FilterOperator::In(vec![json!(1), json!(2)])));
        assert!(matches(&obj, &f));
        let nf = filter(Condition::single("n", FilterOperator::NotIn(vec![json!(1), json!(3)])));
        assert!(matches(&obj, &nf));
    }

    #[test]
    fn empty_and_or_match_everything() {
        let obj = json!({"anything": true});
        assert!(matches(&obj, &filter(Condition::And(vec![]))));
        assert!(matches(&obj, &filter(Condition::Or(vec![]))));
    }

    #[test]
    fn negate_round_trips_through_de_morgan() {
        let leaf_a = Condition::single("a", FilterOperator::Equals(json!(1)));
        let leaf_b = Condition::single("b", FilterOperator::Exists);
        let tree = Condition::And(vec![leaf_a, leaf_b]);
        let negated = negate(&tree).unwrap();

        let obj = json!({"a": 1, "b": true});
        assert_eq!(matches(&obj, &filter(tree.clone())), !matches(&obj, &filter(negated)));
    }

    #[test]
    fn negate_returns_none_for_unnegatable_operators() {
        let tree = Condition::single("n", FilterOperator::LessThan(json!(5)));
        assert!(negate(&tree).is_none());
    }
}
