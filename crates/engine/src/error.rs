use idgraph_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: email or phoneNumber required")]
    InvalidInput,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Stored contacts break a linkage invariant. Never repaired in place.
    #[error("consistency fault: {0}")]
    ConsistencyFault(String),
}

impl EngineError {
    /// Whether the caller is at fault, as opposed to the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput)
    }

    /// Message safe to hand back across the service boundary.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidInput => "email or phoneNumber required",
            Self::Storage(_) | Self::ConsistencyFault(_) => "internal error",
        }
    }
}
