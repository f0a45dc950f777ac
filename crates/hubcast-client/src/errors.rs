//! Client error types.

use thiserror::Error;

/// Errors that end a projection feed.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request or the response body failed at the transport level.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The stream endpoint answered with a non-success status.
    #[error("stream endpoint returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
    /// The relay closed the stream with an `error` event.
    #[error("stream closed by relay: {0}")]
    Stream(String),
}

impl ClientError {
    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Status { .. } => "status",
            Self::Stream(_) => "stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        let err = ClientError::Status {
            status: 503,
            body: "at capacity".into(),
        };
        assert_eq!(
            err.to_string(),
            "stream endpoint returned HTTP 503: at capacity"
        );
        assert_eq!(err.kind(), "status");
    }

    #[test]
    fn stream_display() {
        let err = ClientError::Stream("backbone unavailable".into());
        assert!(err.to_string().contains("backbone unavailable"));
        assert_eq!(err.kind(), "stream");
    }
}
