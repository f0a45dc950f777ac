//! Server and backbone error types.

use std::time::Duration;

use thiserror::Error;

/// Failure to establish or keep a backbone subscription.
///
/// Scoped to one client stream: the stream gets an `error` event and closes,
/// every other stream keeps running.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BackboneError {
    /// Could not connect or subscribe.
    #[error("backbone unavailable: {0}")]
    Unavailable(String),
    /// Connecting took longer than the configured bound.
    #[error("backbone connect timed out after {0:?}")]
    Timeout(Duration),
    /// An established subscription failed or ended.
    #[error("backbone subscription lost: {0}")]
    Lost(String),
    /// A message payload could not be read as text. Not fatal.
    #[error("unreadable backbone payload: {0}")]
    Payload(String),
}

impl BackboneError {
    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Timeout(_) => "timeout",
            Self::Lost(_) => "lost",
            Self::Payload(_) => "payload",
        }
    }

    /// Whether the subscription can keep serving after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Payload(_))
    }
}

impl From<redis::RedisError> for BackboneError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Errors surfaced by the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listener.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Host/port did not form a socket address.
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),
    /// `allow_origin` is not a valid header value.
    #[error("invalid allowed origin {0:?}")]
    InvalidOrigin(String),
    /// The stream cap is reached.
    #[error("too many streams (limit {0})")]
    AtCapacity(usize),
    /// Shutdown has started; no new streams are accepted.
    #[error("server is shutting down")]
    ShuttingDown,
    /// I/O failure while serving.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "bind",
            Self::InvalidAddress(_) => "invalid_address",
            Self::InvalidOrigin(_) => "invalid_origin",
            Self::AtCapacity(_) => "at_capacity",
            Self::ShuttingDown => "shutting_down",
            Self::Io(_) => "io",
        }
    }
}
