//! Value utilities shared by the operator matcher: deep clone, deep
//! structural equality, and the `Contains`/`NotContains` containment
//! predicate.

use serde_json::Value;

/// Deep-clone a JSON value. `serde_json::Value::clone` already recurses
/// through the whole tree, so this is a documented alias rather than a
/// distinct algorithm — callers that need "this is definitely an
/// independent copy" read better spelling it out.
pub fn deep_clone(value: &Value) -> Value {
    value.clone()
}

/// Structural equality with numeric cross-type coercion: `1` and `1.0`
/// compare equal even though `serde_json` stores them as different
/// `Number` representations. Object key order never matters.
pub fn deep_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equals(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, v)| ys.get(k).is_some_and(|w| deep_equals(v, w)))
        }
        _ => a == b,
    }
}

/// The `Contains`/`NotContains` containment predicate.
///
/// - Primitives contain only themselves (by `deep_equals`).
/// - An object contains a probe object when every key of the probe is
///   present in the container and maps to a value that (recursively)
///   contains the probe's value at that key.
/// - An array contains a probe array when every element of the probe is
///   present (recursively) somewhere in the container, order-insensitive
///   and with duplicate probe elements collapsing to one membership
///   check each.
/// - An array also contains a bare (non-array) probe directly, when one
///   of its elements contains that probe.
pub fn contains(container: &Value, probe: &Value) -> bool {
    match (container, probe) {
        (Value::Array(items), Value::Array(probes)) => {
            probes.iter().all(|p| items.iter().any(|item| contains(item, p)))
        }
        (Value::Array(items), primitive) => items.iter().any(|item| contains(item, primitive)),
        (Value::Object(map), Value::Object(probe_map)) => probe_map
            .iter()
            .all(|(k, v)| map.get(k).is_some_and(|cv| contains(cv, v))),
        (container_val, probe_val) => deep_equals(container_val, probe_val),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_equals_coerces_integer_and_float_numbers() {
        assert!(deep_equals(&json!(1), &json!(1.0)));
        assert!(!deep_equals(&json!(1), &json!(2)));
    }

    #[test]
    fn deep_equals_ignores_object_key_order() {
        assert!(deep_equals(
            &json!({"a": 1, "b": 2}),
            &json!({"b": 2, "a": 1})
        ));
    }

    #[test]
    fn deep_equals_is_order_sensitive_for_arrays() {
        assert!(!deep_equals(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn primitives_contain_only_an_equal_primitive() {
        assert!(contains(&json!(5), &json!(5)));
        assert!(!contains(&json!(5), &json!(6)));
    }

    #[test]
    fn array_contains_a_bare_primitive_element() {
        assert!(contains(&json!([1, 2, 3]), &json!(2)));
        assert!(!contains(&json!([1, 2, 3]), &json!(9)));
    }

    #[test]
    fn array_containment_is_order_insensitive_and_collapses_duplicates() {
        assert!(contains(&json!([1, 2, 3]), &json!([2, 1])));
        assert!(contains(&json!([1, 2, 3]), &json!([1, 1])));
        assert!(!contains(&json!([1, 2, 3]), &json!([1, 4])));
    }

    #[test]
    fn object_containment_requires_every_probe_key_to_match() {
        assert!(contains(&json!({"a": 1, "b": 2}), &json!({"a": 1})));
        assert!(!contains(&json!({"a": 1}), &json!({"a": 2})));
        assert!(!contains(&json!({"a": 1}), &json!({"c": 1})));
    }

    #[test]
    fn object_containment_recurses_into_nested_values() {
        assert!(contains(
            &json!({"a": [1, 2, 3]}),
            &json!({"a": [2]})
        ));
    }
}
