//! Error types for the build service surface
//!
//! Covers:
//! - Stopped or unreachable service
//! - Remote errors reported by the service
//! - Wire encoding and size limits

use vmbuild_commands::DecodeError;

/// RPC error
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Service stopped or not reachable
    #[error("service unavailable")]
    Unavailable,

    /// Requested resource path is not known to the service
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Service reported a failure
    #[error("remote error: {0}")]
    Remote(String),

    /// Message could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// Connection I/O failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoded message exceeds the configured limit
    #[error("message of {size} bytes exceeds limit of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// Response did not fit the request
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Fetched instruction batch failed to decode
    #[error("instruction batch rejected: {0}")]
    Decode(#[from] DecodeError),
}

impl RpcError {
    /// Check if the call may succeed when repeated
    ///
    /// A stopped service stays stopped, so `Unavailable` is not retryable.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Check if the error means the service is gone
    #[inline]
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    /// Check if the error is a missing resource
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Rebuild an error from its wire form
    #[must_use]
    pub fn from_remote(message: String, not_found: bool) -> Self {
        if not_found {
            Self::NotFound(message)
        } else {
            Self::Remote(message)
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_round_trip_keeps_not_found() {
        assert!(RpcError::from_remote("etc".to_string(), true).is_not_found());
        assert!(matches!(
            RpcError::from_remote("boom".to_string(), false),
            RpcError::Remote(msg) if msg == "boom"
        ));
    }

    #[test]
    fn classification() {
        assert!(RpcError::Unavailable.is_unavailable());
        assert!(!RpcError::Unavailable.is_retryable());
        let io = RpcError::from(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert!(io.is_retryable());
    }

    #[test]
    fn size_error_names_both_bounds() {
        let err = RpcError::MessageTooLarge { size: 20, max: 10 };
        assert_eq!(err.to_string(), "message of 20 bytes exceeds limit of 10 bytes");
    }
}
