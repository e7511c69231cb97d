//! `orderByProperties` lexicographic ordering and `skip`/`take` pagination
//! over a query result set.

use std::cmp::Ordering;

use coaty_model::{ContextFilter, SortDirection};
use serde_json::Value;

use crate::collator::Collator;
use crate::matcher::resolve_property;

/// Sort objects in place by a sequence of `(path, direction)` keys,
/// applied lexicographically: later keys only break ties left by earlier
/// ones. A missing property sorts before any defined value, in either
/// direction.
pub fn sort_objects(objects: &mut [Value], order_by: &[(coaty_model::PropertyPath, SortDirection)], collator: &dyn Collator) {
    objects.sort_by(|a, b| {
        for (path, direction) in order_by {
            let ra = resolve_property(a, path.as_slice());
            let rb = resolve_property(b, path.as_slice());
            let mut cmp = compare_for_order(ra, rb, collator);
            if *direction == SortDirection::Desc {
                cmp = cmp.reverse();
            }
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    });
}

/// Order two resolved (possibly absent) property values. Absence sorts
/// first; two present values that aren't mutually comparable (mismatched
/// types) compare equal rather than panicking or picking an arbitrary
/// side.
fn compare_for_order(a: Option<&Value>, b: Option<&Value>, collator: &dyn Collator) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match (x, y) {
            (Value::Number(x), Value::Number(y)) => {
                x.as_f64().unwrap_or(f64::NAN).partial_cmp(&y.as_f64().unwrap_or(f64::NAN)).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => collator.compare(x, y),
            _ => Ordering::Equal,
        },
    }
}

/// Apply `skip` then `take` to an already-ordered result set.
pub fn paginate(objects: Vec<Value>, skip: Option<u64>, take: Option<u64>) -> Vec<Value> {
    let skipped = objects.into_iter().skip(skip.unwrap_or(0) as usize);
    match take {
        Some(n) => skipped.take(n as usize).collect(),
        None => skipped.collect(),
    }
}

/// Order then paginate a result set per one `ContextFilter`'s
/// `orderByProperties`/`skip`/`take`.
pub fn apply(mut objects: Vec<Value>, filter: &ContextFilter, collator: &dyn Collator) -> Vec<Value> {
    sort_objects(&mut objects, &filter.order_by_properties, collator);
    paginate(objects, filter.skip, filter.take)
}
