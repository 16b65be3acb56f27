//! Error types for session storage

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
