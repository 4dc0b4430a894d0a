//! Cloudflare user token error types

use thiserror::Error;

/// Substring the Cloudflare client embeds in messages for missing resources.
///
/// Only consulted when the typed status is unavailable.
const NOT_FOUND_MARKER: &str = "HTTP status 404";

/// Errors returned by the remote API client
#[derive(Error, Debug)]
pub enum CloudflareError {
    #[error("environment variable {0} is not set")]
    MissingEnvVar(String),

    #[error("HTTP status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Cloudflare API error: {0}")]
    Envelope(String),

    #[error("invalid API base URL {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudflareError {
    /// Whether the error means the remote resource does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            CloudflareError::Api { status: 404, .. } => true,
            other => other.to_string().contains(NOT_FOUND_MARKER),
        }
    }
}

/// Errors returned by the user token lifecycle
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Error creating Cloudflare user token {name:?}: {source}")]
    CreateFailed {
        name: String,
        #[source]
        source: CloudflareError,
    },

    #[error("Error finding Cloudflare user token {id:?}: {source}")]
    ReadFailed {
        id: String,
        #[source]
        source: CloudflareError,
    },

    #[error("Error updating Cloudflare user token {name:?}: {source}")]
    UpdateFailed {
        name: String,
        #[source]
        source: CloudflareError,
    },

    #[error("Error deleting Cloudflare user token {id:?}: {source}")]
    DeleteFailed {
        id: String,
        #[source]
        source: CloudflareError,
    },

    #[error("user token is not managed yet (no tracked id)")]
    NotManaged,

    #[error("user token is already managed as {0}")]
    AlreadyManaged(String),

    #[error("invalid user token definition: {0}")]
    InvalidDesired(String),

    #[error("State error: {0}")]
    State(#[from] tokenflow_state::StateError),
}

pub type Result<T> = std::result::Result<T, TokenError>;
