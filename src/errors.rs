//! Unified error types for the Ecoo sync core.
//!
//! Every fallible operation in this crate returns [`Result`]. Transport
//! failures are normalized at the API-client boundary into the `Timeout` /
//! `Network` / `Api` variants; business rejections from the backend surface
//! as `Rejected` with the server's message. Nothing in this crate panics on
//! an error path.

use thiserror::Error;

/// Unified error type for all sync-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rejected by server: {message}")]
    Rejected { message: String },

    #[error("Insufficient points: have {current}, need {required}")]
    InsufficientPoints { current: i64, required: i64 },

    #[error("Balance not yet loaded")]
    BalanceUnknown,

    #[error("Invalid balance value: {value}")]
    InvalidBalance { value: i64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(value.to_string())
        }
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
