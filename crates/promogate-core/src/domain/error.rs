//! Domain-level error taxonomy for promogate.
//!
//! Gate outcomes are never errors; they are `Decision`s. These variants
//! cover configuration problems detected at load time and failures of the
//! record log itself.

use promogate_state::StorageError;

/// promogate domain errors.
#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for PromotionError {
    fn from(err: StorageError) -> Self {
        PromotionError::Storage(err.to_string())
    }
}

/// Result type for promogate domain operations.
pub type Result<T> = std::result::Result<T, PromotionError>;
