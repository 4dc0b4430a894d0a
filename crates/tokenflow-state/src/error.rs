//! State store error types

use thiserror::Error;

/// Errors raised while reading or writing tracked state
#[derive(Error, Debug)]
pub enum StateError {
    #[error("State file error: {0}")]
    StateFile(String),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;
