//! Model transport abstraction.
//!
//! The gateway is the only caller of a [`ModelTransport`]. Implementations
//! turn a system directive and user content into raw model text; they do not
//! retry, validate or account for budget.

mod http;

pub use http::{HttpTransport, HttpTransportConfig};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// Connection, DNS or TLS failure.
    Network,
    /// The call did not finish within its deadline.
    Timeout,
    /// Credentials missing or rejected (401/403).
    Auth,
    /// Provider throttled the request (429).
    RateLimited,
    /// Provider-side failure (5xx).
    Server { status: u16 },
    /// Request rejected by the provider (other 4xx).
    Client { status: u16 },
    /// Provider answered but the body was not understood.
    InvalidResponse,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Network => write!(f, "network"),
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Auth => write!(f, "auth"),
            TransportErrorKind::RateLimited => write!(f, "rate limited"),
            TransportErrorKind::Server { status } => write!(f, "server error {}", status),
            TransportErrorKind::Client { status } => write!(f, "client error {}", status),
            TransportErrorKind::InvalidResponse => write!(f, "invalid response"),
        }
    }
}

/// Failure to obtain raw text from the model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InvalidResponse, message)
    }

    /// Build an error from a non-success HTTP status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        Self::new(classify_http_status(status), body)
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Network
                | TransportErrorKind::Timeout
                | TransportErrorKind::RateLimited
                | TransportErrorKind::Server { .. }
        )
    }
}

/// Map an HTTP status code to a transport error kind.
pub fn classify_http_status(status: u16) -> TransportErrorKind {
    match status {
        401 | 403 => TransportErrorKind::Auth,
        408 => TransportErrorKind::Timeout,
        429 => TransportErrorKind::RateLimited,
        500..=599 => TransportErrorKind::Server { status },
        _ => TransportErrorKind::Client { status },
    }
}

/// Sends one instruction to a model and returns its raw text.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn invoke(
        &self,
        system_directive: &str,
        user_content: &str,
        model_id: &str,
    ) -> Result<String, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_http_status() {
        assert_eq!(classify_http_status(401), TransportErrorKind::Auth);
        assert_eq!(classify_http_status(403), TransportErrorKind::Auth);
        assert_eq!(classify_http_status(429), TransportErrorKind::RateLimited);
        assert_eq!(
            classify_http_status(503),
            TransportErrorKind::Server { status: 503 }
        );
        assert_eq!(
            classify_http_status(422),
            TransportErrorKind::Client { status: 422 }
        );
    }

    #[test]
    fn test_transient_kinds() {
        assert!(TransportError::network("reset").is_transient());
        assert!(TransportError::from_status(502, "bad gateway").is_transient());
        assert!(!TransportError::from_status(401, "bad key").is_transient());
        assert!(!TransportError::invalid_response("no choices").is_transient());
    }

    #[test]
    fn test_display() {
        let err = TransportError::from_status(500, "boom");
        assert_eq!(err.to_string(), "server error 500: boom");
    }
}
