//! Container-level error taxonomy (configuration errors are fatal at
//! resolve time; everything else is the communication/router layer's own
//! error type, reused here rather than re-wrapped).

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Communication(#[from] coaty_communication::CommunicationError),
    #[error(transparent)]
    Router(#[from] coaty_io_router::RouterError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
