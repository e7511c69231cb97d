//! A minimal async key-value store contract, independent of the object
//! NoSQL/SQL contracts — a storage adapter may implement any subset of
//! the three traits in this crate.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key` in `store`, or `None` if absent.
    async fn get(&self, store: &str, key: &str) -> StorageResult<Option<Value>>;

    /// Insert or overwrite the value stored under `key` in `store`.
    async fn set(&self, store: &str, key: &str, value: Value) -> StorageResult<()>;

    /// Remove `key` from `store`. Removing an absent key is not an error.
    async fn remove(&self, store: &str, key: &str) -> StorageResult<()>;

    /// All keys currently present in `store`, in unspecified order.
    async fn keys(&self, store: &str) -> StorageResult<Vec<String>>;
}
