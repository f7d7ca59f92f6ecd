use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the stand-in server
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("No tokio runtime to attach the service layer to: {0}")]
    NoReactor(#[from] tokio::runtime::TryCurrentError),

    #[error("Failed to bind listener for service {service}: {source}")]
    Bind {
        service: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Service layer is closed")]
    Closed,

    #[error("Unexpected request {method} {url}: no service registered for host {host:?}")]
    UnknownHost {
        method: String,
        url: String,
        host: Option<String>,
    },

    #[error("Unexpected request {method} {url}: no endpoint registered for {resource}")]
    UnknownEndpoint {
        method: String,
        url: String,
        resource: String,
    },

    #[error("Unexpected request {method} {url}: no responses left for service {service}")]
    ExhaustedQueue {
        service: String,
        method: String,
        url: String,
    },

    #[error("Invalid canned response: {0}")]
    InvalidResponse(String),

    #[error("{} unexpected request(s):\n{}", .0.len(), describe(.0))]
    UnexpectedRequests(Vec<UnexpectedRequest>),
}

/// An inbound request that could not be answered from the queues
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnexpectedRequest {
    /// Token of the matching [`crate::RecordedRequest`]
    pub token: Uuid,
    pub method: String,
    pub uri: String,
    pub host: Option<String>,
    /// Rendered [`ServiceError`] that rejected the request
    pub reason: String,
}

impl fmt::Display for UnexpectedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (Host: {}): {}",
            self.method,
            self.uri,
            self.host.as_deref().unwrap_or("<none>"),
            self.reason
        )
    }
}

fn describe(failures: &[UnexpectedRequest]) -> String {
    failures
        .iter()
        .map(|failure| format!("  {}", failure))
        .collect::<Vec<_>>()
        .join("\n")
}
