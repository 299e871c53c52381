//! Session state and its state machine
//!
//! ```text
//! Starting -> Ready -> Running -> Aborted   -> Stopping -> Stopped
//!     |                        \-> Succeeded -/
//!     \-> Failed
//! ```
//!
//! `Ready`, `Running` and the terminal-flag states may also go straight to
//! `Stopped` when the server is stopped from outside. Terminal flags are
//! first-write-wins: once aborted or succeeded, later signals of either
//! kind change nothing.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Server start in progress
    Starting,
    /// Server accepted the start
    Ready,
    /// Server failed to start (terminal)
    Failed,
    /// Event loop running
    Running,
    /// Guest reported a failure
    Aborted,
    /// Guest reported completion
    Succeeded,
    /// Stop requested, waiting for the server to go down
    Stopping,
    /// Server stopped (terminal)
    Stopped,
}

impl SessionState {
    /// Check if no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: SessionState) -> Vec<SessionState> {
    use SessionState::*;
    match from {
        Starting => vec![Ready, Failed],
        Ready => vec![Running, Stopped],
        Running => vec![Aborted, Succeeded, Stopping, Stopped],
        Aborted | Succeeded => vec![Stopping, Stopped],
        Stopping => vec![Stopped],
        Failed | Stopped => vec![],
    }
}

/// Validate one state transition
///
/// # Errors
/// Returns [`SessionError::IllegalTransition`] if `to` is not reachable from `from`
pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), SessionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SessionError::IllegalTransition { from, to })
    }
}

/// Final outcome of a session that ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOutcome {
    /// Guest reported completion first
    Succeeded,
    /// Guest reported a failure first, with its cause
    Aborted(String),
    /// Server stopped without a terminal signal
    Interrupted,
}

/// Session state owned by the orchestrator
///
/// Published to observers as a snapshot after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    state: SessionState,
    failure: Option<String>,
    stdout: Vec<String>,
    stderr: Vec<String>,
    abort_cause: Option<String>,
    succeeded: bool,
}

impl Session {
    /// New session in `Starting`
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionState::Starting,
            failure: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            abort_cause: None,
            succeeded: false,
        }
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Captured stdout lines, in arrival order
    #[inline]
    #[must_use]
    pub fn stdout(&self) -> &[String] {
        &self.stdout
    }

    /// Captured stderr lines, in arrival order
    #[inline]
    #[must_use]
    pub fn stderr(&self) -> &[String] {
        &self.stderr
    }

    /// Abort cause, if the guest aborted first
    #[inline]
    #[must_use]
    pub fn aborted(&self) -> Option<&str> {
        self.abort_cause.as_deref()
    }

    /// Check if the guest reported success first
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Start failure cause
    #[inline]
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Check if a terminal flag is set
    #[inline]
    #[must_use]
    pub fn is_concluded(&self) -> bool {
        self.succeeded || self.abort_cause.is_some()
    }

    /// Check if the session reached `Stopped`
    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state == SessionState::Stopped
    }

    /// Outcome once concluded or stopped
    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        if let Some(cause) = &self.abort_cause {
            return Some(SessionOutcome::Aborted(cause.clone()));
        }
        if self.succeeded {
            return Some(SessionOutcome::Succeeded);
        }
        self.is_stopped().then_some(SessionOutcome::Interrupted)
    }

    /// Move to `to`
    ///
    /// # Errors
    /// Returns [`SessionError::IllegalTransition`] and leaves the state unchanged
    pub fn transition(&mut self, to: SessionState) -> Result<(), SessionError> {
        validate_transition(self.state, to)?;
        tracing::debug!("Session {:?} -> {:?}", self.state, to);
        self.state = to;
        Ok(())
    }

    /// Record a start failure
    ///
    /// # Errors
    /// Returns [`SessionError::IllegalTransition`] unless starting
    pub fn fail(&mut self, cause: impl Into<String>) -> Result<(), SessionError> {
        self.transition(SessionState::Failed)?;
        self.failure = Some(cause.into());
        Ok(())
    }

    /// Append non-empty stdout lines, returning how many were kept
    pub fn append_stdout(&mut self, lines: impl IntoIterator<Item = String>) -> usize {
        append_non_empty(&mut self.stdout, lines)
    }

    /// Append non-empty stderr lines, returning how many were kept
    pub fn append_stderr(&mut self, lines: impl IntoIterator<Item = String>) -> usize {
        append_non_empty(&mut self.stderr, lines)
    }

    /// Record an abort; `false` if the session already concluded
    pub fn record_abort(&mut self, cause: impl Into<String>) -> bool {
        if self.is_concluded() || self.transition(SessionState::Aborted).is_err() {
            return false;
        }
        self.abort_cause = Some(cause.into());
        true
    }

    /// Record success; `false` if the session already concluded
    pub fn record_success(&mut self) -> bool {
        if self.is_concluded() || self.transition(SessionState::Succeeded).is_err() {
            return false;
        }
        self.succeeded = true;
        true
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn append_non_empty(log: &mut Vec<String>, lines: impl IntoIterator<Item = String>) -> usize {
    let before = log.len();
    log.extend(lines.into_iter().filter(|line| !line.is_empty()));
    log.len() - before
}
