//! The NoSQL object-collection contract and the SQL adapter contract.
//!
//! Both are traits only: no concrete database integration lives in this
//! crate. [`crate::memory::MemoryAdapter`] is the one adapter shipped here,
//! implementing [`NoSqlStorageAdapter`] over `coaty-filter`.

use std::sync::Arc;

use async_trait::async_trait;
use coaty_model::ObjectFilter;
use serde_json::Value;

use crate::error::StorageResult;
use crate::iterator::QueryIterator;
use crate::sql::{RenderedSql, SqlNode};

/// An aggregation to compute over a filtered collection.
#[derive(Debug, Clone)]
pub enum AggregateOp {
    Count,
    Sum(coaty_model::PropertyPath),
    Min(coaty_model::PropertyPath),
    Max(coaty_model::PropertyPath),
}

/// A predicate joining two collections on matching property values, for
/// [`NoSqlStorageAdapter::join`].
#[derive(Debug, Clone)]
pub struct JoinCondition {
    pub left_property: coaty_model::PropertyPath,
    pub right_property: coaty_model::PropertyPath,
}

impl JoinCondition {
    pub fn new(left_property: coaty_model::PropertyPath, right_property: coaty_model::PropertyPath) -> Self {
        Self { left_property, right_property }
    }
}

/// Schema-less document-store contract over `serde_json::Value` objects,
/// queried with the same [`ObjectFilter`] shape the communication layer
/// uses for Query/Retrieve events.
#[async_trait]
pub trait NoSqlStorageAdapter: Send + Sync {
    /// Insert or overwrite an object (keyed by its own `objectId`) into
    /// `collection`.
    async fn put(&self, collection: &str, object: Value) -> StorageResult<()>;

    /// Remove the object with the given `object_id` from `collection`, if
    /// present. Removing an absent object is not an error.
    async fn remove(&self, collection: &str, object_id: &str) -> StorageResult<()>;

    /// Fetch a cursor over the objects in `collection` matching `filter`.
    async fn find(
        &self,
        collection: &str,
        filter: &ObjectFilter,
    ) -> StorageResult<Box<dyn QueryIterator<Value>>>;

    /// Compute `op` over the objects in `collection` matching `filter`.
    /// Returns `None` if the collection is empty after filtering (rather
    /// than `0`, which would be ambiguous with `Sum`/`Min`/`Max` of an
    /// all-zero set).
    async fn aggregate(
        &self,
        collection: &str,
        filter: &ObjectFilter,
        op: AggregateOp,
    ) -> StorageResult<Option<Value>>;

    /// Join `left` and `right` collections on `condition`, returning pairs
    /// as `{"left": ..., "right": ...}` objects satisfying `filter` applied
    /// to the left-hand side.
    async fn join(
        &self,
        left: &str,
        right: &str,
        condition: &JoinCondition,
        filter: &ObjectFilter,
    ) -> StorageResult<Box<dyn QueryIterator<Value>>>;
}

/// A handle to an in-progress transaction, passed to the closure given to
/// [`SqlStorageAdapter::transaction`]. Kept as a separate trait (rather
/// than threading `&Self` through the closure) so `SqlStorageAdapter`
/// remains object-safe.
#[async_trait]
pub trait TransactionContext: Send + Sync {
    /// Execute a rendered statement within this transaction.
    async fn execute(&self, sql: &RenderedSql) -> StorageResult<u64>;

    /// Run a rendered query within this transaction and collect all rows.
    async fn query(&self, sql: &RenderedSql) -> StorageResult<Vec<Value>>;
}

/// A thin SQL execution contract: adapters receive a [`SqlNode`] tree,
/// render it with their own [`crate::sql::IdentifierEscaper`], and execute
/// the result. No query planning or schema management lives here.
#[async_trait]
pub trait SqlStorageAdapter: Send + Sync {
    /// Execute a statement that does not return rows (DDL/DML), returning
    /// the number of affected rows.
    async fn execute(&self, statement: &SqlNode) -> StorageResult<u64>;

    /// Execute a statement that returns rows.
    async fn query(&self, statement: &SqlNode) -> StorageResult<Vec<Value>>;

    /// Run `action` against a single transaction. The adapter commits on
    /// `Ok` and rolls back on `Err`; `action` receives a
    /// [`TransactionContext`] rather than `&Self` so this trait stays
    /// object-safe.
    async fn transaction(
        &self,
        action: Box<dyn FnOnce(Arc<dyn TransactionContext>) -> futures_result::BoxFuture<StorageResult<()>> + Send>,
    ) -> StorageResult<()>;
}

/// A boxed, pinned future, spelled out locally so [`SqlStorageAdapter`]
/// does not need a direct `futures` dependency for one alias.
pub mod futures_result {
    use std::pin::Pin;

    pub type BoxFuture<T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'static>>;
}
