//! Codec and envelope error types.

use thiserror::Error;

use crate::text::preview;

/// Longest raw-message preview kept inside an error value.
const PREVIEW_BYTES: usize = 80;

/// A channel message that violates the wire grammar.
///
/// The relay drops the offending message and keeps the subscription alive.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A `geohash:count` pair did not split into two non-empty parts.
    #[error("malformed message: missing geohash/count pair in {preview:?}")]
    MissingPair {
        /// Truncated copy of the offending token.
        preview: String,
    },
    /// A count was not a base-10 unsigned integer.
    #[error("malformed message: count {value:?} is not an unsigned integer")]
    InvalidCount {
        /// The rejected count token.
        value: String,
    },
    /// The bulk timestamp was not integer epoch seconds in range.
    #[error("malformed message: timestamp {value:?} is not valid epoch seconds")]
    InvalidTimestamp {
        /// The rejected timestamp token.
        value: String,
    },
}

impl CodecError {
    pub(crate) fn missing_pair(token: &str) -> Self {
        Self::MissingPair {
            preview: preview(token, PREVIEW_BYTES),
        }
    }

    pub(crate) fn invalid_count(token: &str) -> Self {
        Self::InvalidCount {
            value: preview(token, PREVIEW_BYTES),
        }
    }

    pub(crate) fn invalid_timestamp(token: &str) -> Self {
        Self::InvalidTimestamp {
            value: preview(token, PREVIEW_BYTES),
        }
    }

    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingPair { .. } => "missing_pair",
            Self::InvalidCount { .. } => "invalid_count",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
        }
    }
}

/// A transport frame that could not be read as an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame payload was not valid envelope JSON.
    #[error("invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(CodecError::missing_pair("x").kind(), "missing_pair");
        assert_eq!(CodecError::invalid_count("x").kind(), "invalid_count");
        assert_eq!(CodecError::invalid_timestamp("x").kind(), "invalid_timestamp");
    }

    #[test]
    fn long_tokens_are_previewed() {
        let token = "g".repeat(500);
        let CodecError::MissingPair { preview } = CodecError::missing_pair(&token) else {
            panic!("wrong variant");
        };
        assert!(preview.len() < 100);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn display_names_the_value() {
        let err = CodecError::invalid_count("4x");
        assert_eq!(
            err.to_string(),
            "malformed message: count \"4x\" is not an unsigned integer"
        );
    }

    #[test]
    fn envelope_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: EnvelopeError = json_err.into();
        assert!(err.to_string().starts_with("invalid envelope JSON"));
    }
}
