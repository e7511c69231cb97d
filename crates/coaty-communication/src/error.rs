//! Communication Manager error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommunicationError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("the manager is not started")]
    NotStarted,

    #[error("a Discover/Call request can only be resolved once")]
    AlreadyResolved,

    #[error("{0}")]
    Other(String),
}

pub type CommunicationResult<T> = Result<T, CommunicationError>;
