use std::time::Duration;

use reqwest::Method;
use thiserror::Error;

/// Errors raised by the synchronous bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Bridge has not been started")]
    NotStarted,

    #[error("Bridge is already started")]
    AlreadyStarted,

    #[error("Bridge has been stopped")]
    Stopped,

    /// No response before the deadline; never retried
    #[error("{method} {url} timed out after {after:?}")]
    Timeout {
        method: Method,
        url: String,
        after: Duration,
    },

    #[error("{method} {url} ended without a result")]
    Abandoned { method: Method, url: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot encode request body: {0}")]
    Body(String),
}

impl BridgeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}
