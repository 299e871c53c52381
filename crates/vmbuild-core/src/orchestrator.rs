//! Session orchestrator
//!
//! One task owns the [`Session`] and multiplexes the server's event queues:
//! - stdout/stderr batches are appended, empty lines dropped
//! - the first abort or success concludes the session and dispatches a
//!   stop request on its own task, so the loop never waits on the stop it
//!   asked for; later terminal signals are ignored
//! - `stopped` ends the loop, after pending signals have been drained
//!
//! Observers read snapshots through a `watch` channel.

use crate::config::ServiceConfig;
use crate::context::WorkContext;
use crate::error::SessionError;
use crate::events::{ServerEvents, TerminalSignal};
use crate::server::{BuildServer, Listen, ServerTransport};
use crate::session::{Session, SessionOutcome, SessionState};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vmbuild_rpc::BuildClient;

/// Side effect fired when a session concludes
#[async_trait]
pub trait StopRequester: Send + Sync + 'static {
    /// Ask the transport to stop
    async fn request_stop(&self);
}

/// Event loop for one running session
#[derive(Debug)]
pub struct SessionOrchestrator<R> {
    events: ServerEvents,
    conductor: Conductor<R>,
}

/// Everything the loop mutates, kept apart from the queues it polls
#[derive(Debug)]
struct Conductor<R> {
    session: Session,
    snapshots: watch::Sender<Session>,
    stopper: Arc<R>,
    stop_requested: bool,
}

impl<R: StopRequester> SessionOrchestrator<R> {
    /// Create orchestrator for a session whose server is ready
    #[must_use]
    pub fn new(events: ServerEvents, stopper: Arc<R>) -> (Self, watch::Receiver<Session>) {
        let mut session = Session::new();
        if let Err(err) = session.transition(SessionState::Ready) {
            tracing::warn!("{}", err);
        }
        let (snapshots, rx) = watch::channel(session.clone());
        let orchestrator = Self {
            events,
            conductor: Conductor {
                session,
                snapshots,
                stopper,
                stop_requested: false,
            },
        };
        (orchestrator, rx)
    }

    /// Run on a new task
    pub fn spawn(self) -> JoinHandle<Session> {
        tokio::spawn(self.run())
    }

    /// Run until the server reports stopped, returning the final session
    pub async fn run(self) -> Session {
        let Self {
            mut events,
            mut conductor,
        } = self;
        conductor.advance(SessionState::Running);

        loop {
            tokio::select! {
                biased;
                Some(lines) = events.stdout.recv() => conductor.stdout(lines),
                Some(lines) = events.stderr.recv() => conductor.stderr(lines),
                Some(signal) = events.terminal.recv() => conductor.conclude(signal),
                _ = events.stopped.wait_for(|stopped| *stopped) => break,
            }
        }

        // lines that raced the stop
        while let Ok(lines) = events.stdout.try_recv() {
            conductor.stdout(lines);
        }
        while let Ok(lines) = events.stderr.try_recv() {
            conductor.stderr(lines);
        }

        conductor.advance(SessionState::Stopped);
        match conductor.session.outcome() {
            Some(SessionOutcome::Aborted(cause)) => tracing::info!("Session finished: aborted ({})", cause),
            Some(outcome) => tracing::info!("Session finished: {:?}", outcome),
            None => tracing::info!("Session finished"),
        }
        conductor.session
    }
}

impl<R: StopRequester> Conductor<R> {
    fn publish(&self) {
        self.snapshots.send_replace(self.session.clone());
    }

    fn advance(&mut self, to: SessionState) {
        if let Err(err) = self.session.transition(to) {
            tracing::warn!("Ignoring {}", err);
        }
        self.publish();
    }

    fn stdout(&mut self, lines: Vec<String>) {
        if self.session.append_stdout(lines) > 0 {
            self.publish();
        }
    }

    fn stderr(&mut self, lines: Vec<String>) {
        if self.session.append_stderr(lines) > 0 {
            self.publish();
        }
    }

    fn conclude(&mut self, signal: TerminalSignal) {
        let first = match signal {
            TerminalSignal::Abort(cause) => self.session.record_abort(cause),
            TerminalSignal::Success => self.session.record_success(),
        };
        if first {
            match self.session.aborted() {
                Some(cause) => tracing::info!("Session aborted: {}", cause),
                None => tracing::info!("Session succeeded"),
            }
            self.request_stop();
            self.publish();
        } else {
            tracing::debug!("Terminal signal after session concluded, ignored");
        }
    }

    fn request_stop(&mut self) {
        if self.stop_requested {
            return;
        }
        self.stop_requested = true;
        if let Err(err) = self.session.transition(SessionState::Stopping) {
            tracing::warn!("Ignoring {}", err);
        }
        let stopper = Arc::clone(&self.stopper);
        tokio::spawn(async move { stopper.request_stop().await });
    }
}

/// A started session
#[derive(Debug)]
pub struct SessionHandle {
    server: Arc<BuildServer>,
    snapshots: watch::Receiver<Session>,
    task: JoinHandle<Session>,
}

impl SessionHandle {
    /// Server behind the session
    #[inline]
    #[must_use]
    pub fn server(&self) -> &Arc<BuildServer> {
        &self.server
    }

    /// New client for the session's server
    #[must_use]
    pub fn client(&self) -> BuildClient<ServerTransport> {
        self.server.client()
    }

    /// Current session state
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.snapshots.borrow().clone()
    }

    /// Stop the server from outside
    pub async fn stop(&self) {
        self.server.stop().await;
    }

    /// Wait until the session has stopped
    ///
    /// # Errors
    /// Returns [`SessionError::OrchestratorGone`] if the loop ended without
    /// publishing a stopped session
    pub async fn finished(&self) -> Result<Session, SessionError> {
        let mut snapshots = self.snapshots.clone();
        let session = snapshots
            .wait_for(Session::is_stopped)
            .await
            .map_err(|_| SessionError::OrchestratorGone)?;
        Ok(session.clone())
    }

    /// Wait for the orchestrator task and take the final session
    ///
    /// # Errors
    /// Returns [`SessionError::OrchestratorGone`] if the task panicked
    pub async fn join(self) -> Result<Session, SessionError> {
        self.task.await.map_err(|_| SessionError::OrchestratorGone)
    }
}

/// Start a server and, once it is ready, its orchestrator
///
/// A start failure returns before any event loop runs; there is nothing to
/// stop. The error carries the session, left in `Failed`.
///
/// # Errors
/// Returns [`SessionError::StartFailed`] if the server does not start
pub async fn start_session(
    config: ServiceConfig,
    context: WorkContext,
    listen: Listen,
) -> Result<SessionHandle, SessionError> {
    let name = config.server_name.clone();
    let (server, events) = match BuildServer::start(config, context, listen).await {
        Ok(started) => started,
        Err(err) => {
            tracing::error!("{} failed to start: {}", name, err);
            return Err(SessionError::start_failed(err));
        }
    };

    let server = Arc::new(server);
    let (orchestrator, snapshots) = SessionOrchestrator::new(events, Arc::clone(&server));
    let task = orchestrator.spawn();
    Ok(SessionHandle {
        server,
        snapshots,
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{event_channels, EventSender};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Stopper {
        calls: AtomicUsize,
        stopped: watch::Sender<bool>,
    }

    #[async_trait]
    impl StopRequester for Stopper {
        async fn request_stop(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.stopped.send_replace(true);
        }
    }

    fn harness() -> (EventSender, Arc<Stopper>, SessionOrchestrator<Stopper>, watch::Receiver<Session>) {
        let (stopped, stopped_rx) = watch::channel(false);
        let (sender, events) = event_channels(16, stopped_rx);
        let stopper = Arc::new(Stopper {
            calls: AtomicUsize::new(0),
            stopped,
        });
        let (orchestrator, snapshots) = SessionOrchestrator::new(events, Arc::clone(&stopper));
        (sender, stopper, orchestrator, snapshots)
    }

    #[tokio::test]
    async fn abort_then_success_stops_once() {
        let (sender, stopper, orchestrator, _snapshots) = harness();
        sender.abort("first".to_string()).await.unwrap();
        sender.success().await.unwrap();
        sender.abort("second".to_string()).await.unwrap();

        let session = orchestrator.spawn().await.unwrap();
        assert_eq!(session.outcome(), Some(SessionOutcome::Aborted("first".to_string())));
        assert!(!session.succeeded());
        assert_eq!(session.state(), SessionState::Stopped);
        tokio::task::yield_now().await;
        assert_eq!(stopper.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_first_wins() {
        let (sender, stopper, orchestrator, _snapshots) = harness();
        sender.success().await.unwrap();
        sender.abort("late".to_string()).await.unwrap();

        let session = orchestrator.spawn().await.unwrap();
        assert_eq!(session.outcome(), Some(SessionOutcome::Succeeded));
        assert_eq!(session.aborted(), None);
        assert_eq!(stopper.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn output_is_collected_in_order() {
        let (sender, _stopper, orchestrator, mut snapshots) = harness();
        let task = orchestrator.spawn();

        sender.stdout(vec!["one".to_string(), String::new()]).await.unwrap();
        sender.stderr(vec!["warn".to_string()]).await.unwrap();
        sender.stdout(vec!["two".to_string()]).await.unwrap();
        sender.success().await.unwrap();

        let session = task.await.unwrap();
        assert_eq!(session.stdout(), ["one", "two"]);
        assert_eq!(session.stderr(), ["warn"]);

        let last = snapshots.wait_for(Session::is_stopped).await.unwrap().clone();
        assert_eq!(last, session);
    }

    #[tokio::test]
    async fn external_stop_is_interrupted() {
        let (_sender, stopper, orchestrator, _snapshots) = harness();
        let task = orchestrator.spawn();

        stopper.stopped.send_replace(true);
        let session = task.await.unwrap();
        assert_eq!(session.outcome(), Some(SessionOutcome::Interrupted));
        assert_eq!(stopper.calls.load(Ordering::SeqCst), 0);
    }
}
