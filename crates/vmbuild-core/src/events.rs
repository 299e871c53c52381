//! Event queues between the build service and the session orchestrator
//!
//! Abort and success share one queue so their relative order survives.

use tokio::sync::{mpsc, watch};

/// A signal that concludes the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalSignal {
    /// Guest build failed
    Abort(String),
    /// Guest build completed
    Success,
}

/// Producer side, held by the service
#[derive(Debug, Clone)]
pub struct EventSender {
    stdout: mpsc::Sender<Vec<String>>,
    stderr: mpsc::Sender<Vec<String>>,
    terminal: mpsc::Sender<TerminalSignal>,
}

/// Consumer side, drained by the orchestrator
#[derive(Debug)]
pub struct ServerEvents {
    /// Guest stdout batches
    pub stdout: mpsc::Receiver<Vec<String>>,
    /// Guest stderr batches
    pub stderr: mpsc::Receiver<Vec<String>>,
    /// Abort and success reports, in arrival order
    pub terminal: mpsc::Receiver<TerminalSignal>,
    /// Turns true once the server has fully stopped
    pub stopped: watch::Receiver<bool>,
}

/// Create the event queues, each `capacity` deep
#[must_use]
pub fn event_channels(capacity: usize, stopped: watch::Receiver<bool>) -> (EventSender, ServerEvents) {
    let capacity = capacity.max(1);
    let (stdout_tx, stdout) = mpsc::channel(capacity);
    let (stderr_tx, stderr) = mpsc::channel(capacity);
    let (terminal_tx, terminal) = mpsc::channel(capacity);
    (
        EventSender {
            stdout: stdout_tx,
            stderr: stderr_tx,
            terminal: terminal_tx,
        },
        ServerEvents {
            stdout,
            stderr,
            terminal,
            stopped,
        },
    )
}

/// The orchestrator has gone away
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event receiver closed")]
pub struct EventsClosed;

impl EventSender {
    /// Queue a stdout batch
    ///
    /// # Errors
    /// Returns [`EventsClosed`] if nothing drains the queue any more
    pub async fn stdout(&self, lines: Vec<String>) -> Result<(), EventsClosed> {
        self.stdout.send(lines).await.map_err(|_| EventsClosed)
    }

    /// Queue a stderr batch
    ///
    /// # Errors
    /// Returns [`EventsClosed`] if nothing drains the queue any more
    pub async fn stderr(&self, lines: Vec<String>) -> Result<(), EventsClosed> {
        self.stderr.send(lines).await.map_err(|_| EventsClosed)
    }

    /// Queue an abort
    ///
    /// # Errors
    /// Returns [`EventsClosed`] if nothing drains the queue any more
    pub async fn abort(&self, cause: String) -> Result<(), EventsClosed> {
        self.terminal
            .send(TerminalSignal::Abort(cause))
            .await
            .map_err(|_| EventsClosed)
    }

    /// Queue a success
    ///
    /// # Errors
    /// Returns [`EventsClosed`] if nothing drains the queue any more
    pub async fn success(&self) -> Result<(), EventsClosed> {
        self.terminal
            .send(TerminalSignal::Success)
            .await
            .map_err(|_| EventsClosed)
    }
}
