//! Build service backed by a [`WorkContext`]
//!
//! Serves the pre-serialized instruction batch, streams registered
//! resources through a [`ResourceProducer`], and forwards guest reports to
//! the orchestrator's event queues. Every call fails with
//! [`RpcError::Unavailable`] once shutdown has been signalled.

use crate::context::WorkContext;
use crate::events::EventSender;
use async_trait::async_trait;
use tokio::sync::watch;
use vmbuild_resource::ResourceProducer;
use vmbuild_rpc::{BuildService, FrameReceiver, RpcError};

/// Guest-facing service for one build
#[derive(Debug)]
pub struct RootfsService {
    context: WorkContext,
    records: Vec<String>,
    producer: ResourceProducer,
    events: EventSender,
    shutdown: watch::Receiver<bool>,
}

impl RootfsService {
    /// Create service; `records` are `context`'s serialized instructions
    #[must_use]
    pub fn new(
        context: WorkContext,
        records: Vec<String>,
        producer: ResourceProducer,
        events: EventSender,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            context,
            records,
            producer,
            events,
            shutdown,
        }
    }

    fn ensure_running(&self) -> Result<(), RpcError> {
        if *self.shutdown.borrow() {
            Err(RpcError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BuildService for RootfsService {
    async fn fetch_instructions(&self) -> Result<Vec<String>, RpcError> {
        self.ensure_running()?;
        tracing::debug!("Serving {} instruction records", self.records.len());
        Ok(self.records.clone())
    }

    async fn fetch_resource(&self, path: &str) -> Result<FrameReceiver, RpcError> {
        self.ensure_running()?;
        let Some(resources) = self.context.resources_for(path) else {
            tracing::warn!("Resource not found: {}", path);
            return Err(RpcError::NotFound(path.to_string()));
        };
        tracing::debug!("Streaming {} resource(s) for {}", resources.len(), path);
        Ok(self.producer.spawn(resources.to_vec()))
    }

    async fn report_stdout(&self, lines: Vec<String>) -> Result<(), RpcError> {
        self.ensure_running()?;
        for line in &lines {
            tracing::debug!("guest stdout: {}", line);
        }
        self.events.stdout(lines).await.map_err(|_| RpcError::Unavailable)
    }

    async fn report_stderr(&self, lines: Vec<String>) -> Result<(), RpcError> {
        self.ensure_running()?;
        for line in &lines {
            tracing::debug!("guest stderr: {}", line);
        }
        self.events.stderr(lines).await.map_err(|_| RpcError::Unavailable)
    }

    async fn report_abort(&self, cause: String) -> Result<(), RpcError> {
        self.ensure_running()?;
        tracing::info!("Guest reported abort: {}", cause);
        self.events.abort(cause).await.map_err(|_| RpcError::Unavailable)
    }

    async fn report_success(&self) -> Result<(), RpcError> {
        self.ensure_running()?;
        tracing::info!("Guest reported success");
        self.events.success().await.map_err(|_| RpcError::Unavailable)
    }

    async fn ping(&self) -> Result<(), RpcError> {
        self.ensure_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{event_channels, TerminalSignal};
    use vmbuild_resource::ResolvedResource;

    fn service(shutdown: watch::Receiver<bool>) -> (RootfsService, crate::events::ServerEvents) {
        let (_stopped_tx, stopped) = watch::channel(false);
        let (events_tx, events) = event_channels(4, stopped);
        let context = WorkContext::new()
            .with_resource("motd", ResolvedResource::file_from_bytes(&b"hi"[..], "motd", "/etc/motd"));
        let service = RootfsService::new(
            context,
            vec!["{}".to_string()],
            ResourceProducer::default(),
            events_tx,
            shutdown,
        );
        (service, events)
    }

    #[tokio::test]
    async fn reports_reach_event_queues() {
        let (_stop, shutdown) = watch::channel(false);
        let (service, mut events) = service(shutdown);

        service.report_stdout(vec!["line".to_string()]).await.unwrap();
        service.report_abort("cause".to_string()).await.unwrap();
        service.report_success().await.unwrap();

        assert_eq!(events.stdout.recv().await, Some(vec!["line".to_string()]));
        assert_eq!(
            events.terminal.recv().await,
            Some(TerminalSignal::Abort("cause".to_string()))
        );
        assert_eq!(events.terminal.recv().await, Some(TerminalSignal::Success));
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let (_stop, shutdown) = watch::channel(false);
        let (service, _events) = service(shutdown);
        assert!(service.fetch_resource("motd").await.is_ok());
        assert!(service.fetch_resource("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn everything_fails_after_shutdown() {
        let (stop, shutdown) = watch::channel(false);
        let (service, _events) = service(shutdown);
        stop.send_replace(true);

        assert!(service.fetch_instructions().await.unwrap_err().is_unavailable());
        assert!(service.fetch_resource("motd").await.unwrap_err().is_unavailable());
        assert!(service.report_stdout(vec![]).await.unwrap_err().is_unavailable());
        assert!(service.report_stderr(vec![]).await.unwrap_err().is_unavailable());
        assert!(service.report_abort(String::new()).await.unwrap_err().is_unavailable());
        assert!(service.report_success().await.unwrap_err().is_unavailable());
        assert!(service.ping().await.unwrap_err().is_unavailable());
    }
}
