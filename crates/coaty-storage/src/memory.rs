//! A reference in-memory adapter implementing [`NoSqlStorageAdapter`] and
//! [`KeyValueStore`] over `coaty-filter`. Not a database: every operation
//! holds the whole collection in a `Mutex<HashMap<..>>` and filters it in
//! place. Useful for tests and for agents with no persistence requirement.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use coaty_filter::collator::default_collator;
use coaty_model::ObjectFilter;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::iterator::{QueryIterator, VecIterator};
use crate::kv::KeyValueStore;
use crate::nosql::{AggregateOp, JoinCondition, NoSqlStorageAdapter};

#[derive(Default)]
pub struct MemoryAdapter {
    collections: Mutex<HashMap<String, HashMap<String, Value>>>,
    kv_stores: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn object_id_of(object: &Value) -> StorageResult<String> {
        object
            .get("objectId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StorageError::Backend("object is missing an 'objectId' field".to_string()))
    }

    fn filtered(&self, collection: &str, filter: &ObjectFilter) -> Vec<Value> {
        let guard = self.collections.lock().expect("memory adapter mutex poisoned");
        let matched: Vec<Value> = guard
            .get(collection)
            .into_iter()
            .flat_map(|objects| objects.values())
            .filter(|object| coaty_filter::matches(object, filter))
            .cloned()
            .collect();
        coaty_filter::order::apply(matched, filter, &default_collator())
    }
}

#[async_trait]
impl NoSqlStorageAdapter for MemoryAdapter {
    async fn put(&self, collection: &str, object: Value) -> StorageResult<()> {
        let object_id = Self::object_id_of(&object)?;
        let mut guard = self.collections.lock().expect("memory adapter mutex poisoned");
        guard.entry(collection.to_string()).or_default().insert(object_id, object);
        Ok(())
    }

    async fn remove(&self, collection: &str, object_id: &str) -> StorageResult<()> {
        let mut guard = self.collections.lock().expect("memory adapter mutex poisoned");
        if let Some(objects) = guard.get_mut(collection) {
            objects.remove(object_id);
        }
        Ok(())
    }

    async fn find(&self, collection: &str, filter: &ObjectFilter) -> StorageResult<Box<dyn QueryIterator<Value>>> {
        Ok(Box::new(VecIterator::new(self.filtered(collection, filter))))
    }

    async fn aggregate(&self, collection: &str, filter: &ObjectFilter, op: AggregateOp) -> StorageResult<Option<Value>> {
        let matched = self.filtered(collection, filter);
        if matched.is_empty() {
            return Ok(None);
        }
        let value = match op {
            AggregateOp::Count => Value::from(matched.len() as u64),
            AggregateOp::Sum(path) => {
                let sum: f64 = matched
                    .iter()
                    .filter_map(|o| coaty_filter::resolve_property(o, path.as_slice()))
                    .filter_map(Value::as_f64)
                    .sum();
                Value::from(sum)
            }
            AggregateOp::Min(path) => matched
                .iter()
                .filter_map(|o| coaty_filter::resolve_property(o, path.as_slice()))
                .filter_map(Value::as_f64)
                .fold(None::<f64>, |acc, x| Some(acc.map_or(x, |a| a.min(x))))
                .map(Value::from)
                .unwrap_or(Value::Null),
            AggregateOp::Max(path) => matched
                .iter()
                .filter_map(|o| coaty_filter::resolve_property(o, path.as_slice()))
                .filter_map(Value::as_f64)
                .fold(None::<f64>, |acc, x| Some(acc.map_or(x, |a| a.max(x))))
                .map(Value::from)
                .unwrap_or(Value::Null),
        };
        Ok(Some(value))
    }

    async fn join(
        &self,
        left: &str,
        right: &str,
        condition: &JoinCondition,
        filter: &ObjectFilter,
    ) -> StorageResult<Box<dyn QueryIterator<Value>>> {
        let left_matched = self.filtered(left, filter);
        let right_all = {
            let guard = self.collections.lock().expect("memory adapter mutex poisoned");
            guard.get(right).cloned().unwrap_or_default()
        };
        let right_values: Vec<&Value> = right_all.values().collect();

        let mut pairs = Vec::new();
        for l in &left_matched {
            let Some(left_value) = coaty_filter::resolve_property(l, condition.left_property.as_slice()) else {
                continue;
            };
            for r in &right_values {
                let Some(right_value) = coaty_filter::resolve_property(r, condition.right_property.as_slice()) else {
                    continue;
                };
                if left_value == right_value {
                    pairs.push(serde_json::json!({ "left": l, "right": r }));
                }
            }
        }
        Ok(Box::new(VecIterator::new(pairs)))
    }
}

#[async_trait]
impl KeyValueStore for MemoryAdapter {
    async fn get(&self, store: &str, key: &str) -> StorageResult<Option<Value>> {
        let guard = self.kv_stores.lock().expect("memory adapter mutex poisoned");
        Ok(guard.get(store).and_then(|s| s.get(key)).cloned())
    }

    async fn set(&self, store: &str, key: &str, value: Value) -> StorageResult<()> {
        let mut guard = self.kv_stores.lock().expect("memory adapter mutex poisoned");
        guard.entry(store.to_string()).or_default().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, store: &str, key: &str) -> StorageResult<()> {
        let mut guard = self.kv_stores.lock().expect("memory adapter mutex poisoned");
        if let Some(s) = guard.get_mut(store) {
            s.remove(key);
        }
        Ok(())
    }

    async fn keys(&self, store: &str) -> StorageResult<Vec<String>> {
        let guard = self.kv_stores.lock().expect("memory adapter mutex poisoned");
        Ok(guard.get(store).map(|s| s.keys().cloned().collect()).unwrap_or_default())
    }
}
