//! Storage adapter error taxonomy.

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),
    #[error("key-value store '{0}' not found")]
    StoreNotFound(String),
    #[error("operation not supported: {0}")]
    Unsupported(String),
    #[error("a transaction is already in progress on this adapter")]
    NestedTransaction,
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
