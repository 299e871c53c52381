//! Error types for vmbuild Core
//!
//! Provides error handling for:
//! - Configuration loading and validation
//! - Server start and bind failures
//! - Session lifecycle violations

use crate::session::{Session, SessionState};
use std::path::PathBuf;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Value out of range or inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Config file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid TOML for the schema
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server start errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration rejected before binding
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Listener could not bind
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Instruction batch could not be serialized
    #[error("failed to serialize instructions: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Start task ended without reporting
    #[error("server start abandoned")]
    StartAbandoned,
}

impl ServerError {
    /// Check if starting again may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::StartAbandoned)
    }
}

/// Session lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Server failed to start; nothing was running
    #[error("session failed to start: {source}")]
    StartFailed {
        /// The session, left in `Failed` with the cause recorded
        session: Box<Session>,
        #[source]
        source: ServerError,
    },

    /// Transition not allowed by the session state machine
    #[error("illegal session transition: {from:?} -> {to:?}")]
    IllegalTransition { from: SessionState, to: SessionState },

    /// Orchestrator task ended without publishing a final snapshot
    #[error("session orchestrator ended unexpectedly")]
    OrchestratorGone,
}

impl SessionError {
    /// Build a start failure whose session ended in `Failed`
    #[must_use]
    pub fn start_failed(source: ServerError) -> Self {
        let mut session = Session::new();
        if let Err(err) = session.fail(source.to_string()) {
            tracing::warn!("{}", err);
        }
        Self::StartFailed {
            session: Box::new(session),
            source,
        }
    }

    /// Session recorded with the error, if any
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::StartFailed { session, .. } => Some(session),
            _ => None,
        }
    }
}

impl From<ServerError> for SessionError {
    fn from(source: ServerError) -> Self {
        Self::start_failed(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_failure_is_retryable() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:1".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.is_retryable());
        assert!(!ServerError::Config(ConfigError::Invalid("x".to_string())).is_retryable());
    }

    #[test]
    fn start_failure_wraps_server_error() {
        let err = SessionError::from(ServerError::StartAbandoned);
        assert_eq!(err.to_string(), "session failed to start: server start abandoned");

        let session = err.session().unwrap();
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.failure(), Some("server start abandoned"));
        assert_eq!(session.outcome(), None);
    }
}
