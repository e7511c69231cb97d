//! Storage adapter contracts: schema-less NoSQL collections, a universal
//! SQL builder, and a key-value store, none tied to a concrete database.
//!
//! - [`nosql`] — [`NoSqlStorageAdapter`], [`SqlStorageAdapter`] and their
//!   supporting types
//! - [`sql`] — the backend-agnostic [`sql::SqlNode`] builder AST and
//!   [`sql::IdentifierEscaper`]
//! - [`kv`] — [`KeyValueStore`]
//! - [`iterator`] — [`QueryIterator`], the cursor abstraction all queries
//!   return
//! - [`memory`] — [`MemoryAdapter`], the one concrete adapter this crate
//!   ships, backing [`NoSqlStorageAdapter`] and [`KeyValueStore`] with a
//!   `Mutex<HashMap<..>>`

pub mod error;
pub mod iterator;
pub mod kv;
pub mod memory;
pub mod nosql;
pub mod sql;

pub use error::{StorageError, StorageResult};
pub use iterator::{IterationOutcome, QueryIterator, VecIterator};
pub use kv::KeyValueStore;
pub use memory::MemoryAdapter;
pub use nosql::{AggregateOp, JoinCondition, NoSqlStorageAdapter, SqlStorageAdapter, TransactionContext};
pub use sql::{render, DefaultEscaper, IdentifierEscaper, RenderedSql, SqlNode};
