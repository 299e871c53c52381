//! Build server lifecycle
//!
//! `start` resolves to exactly one of ready (`Ok`) or failed (`Err`).
//! `stop` is idempotent: the first call signals shutdown, waits for the
//! serving task to finish and then publishes `stopped`; concurrent or later
//! calls just wait for `stopped`.

use crate::config::ServiceConfig;
use crate::context::WorkContext;
use crate::error::ServerError;
use crate::events::{event_channels, ServerEvents};
use crate::orchestrator::StopRequester;
use crate::service::RootfsService;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use vmbuild_resource::ResourceProducer;
use vmbuild_rpc::{
    serve_memory, serve_tcp, BuildClient, FrameStream, MemoryTransport, Request, Response,
    RpcError, TcpTransport, Transport,
};

/// How the server is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Listen {
    /// Length-delimited TCP on `bind_host_port`
    #[default]
    Tcp,
    /// In-process dispatcher
    Memory,
}

/// Client transport for a running server
#[derive(Debug, Clone)]
pub enum ServerTransport {
    /// In-process dispatcher
    Memory(MemoryTransport),
    /// Length-delimited TCP
    Tcp(TcpTransport),
}

#[async_trait]
impl Transport for ServerTransport {
    async fn call(&self, request: Request) -> Result<Response, RpcError> {
        match self {
            Self::Memory(transport) => transport.call(request).await,
            Self::Tcp(transport) => transport.call(request).await,
        }
    }

    async fn open_stream(&self, request: Request) -> Result<FrameStream, RpcError> {
        match self {
            Self::Memory(transport) => transport.open_stream(request).await,
            Self::Tcp(transport) => transport.open_stream(request).await,
        }
    }
}

/// A running build server
#[derive(Debug)]
pub struct BuildServer {
    config: ServiceConfig,
    transport: ServerTransport,
    shutdown: watch::Sender<bool>,
    stopped: watch::Sender<bool>,
    serving: Mutex<Option<JoinHandle<()>>>,
}

impl BuildServer {
    /// Validate config, serialize instructions and start serving
    ///
    /// # Errors
    /// Returns [`ServerError`] if the configuration is invalid, the
    /// instructions do not serialize or the listener cannot bind
    pub async fn start(
        config: ServiceConfig,
        context: WorkContext,
        listen: Listen,
    ) -> Result<(Self, ServerEvents), ServerError> {
        config.validate()?;
        let records = context.records()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (stopped, stopped_rx) = watch::channel(false);
        let (events_tx, events) = event_channels(config.event_queue_capacity, stopped_rx);
        let service = Arc::new(RootfsService::new(
            context,
            records,
            ResourceProducer::new(config.safe_buffer_size),
            events_tx,
            shutdown_rx.clone(),
        ));

        let (transport, serving) = match listen {
            Listen::Memory => {
                let (transport, task) = serve_memory(service, shutdown_rx, config.event_queue_capacity);
                tracing::info!("{} ready (in-memory)", config.server_name);
                (ServerTransport::Memory(transport), task)
            }
            Listen::Tcp => {
                let bind_error = |source: std::io::Error| ServerError::Bind {
                    addr: config.bind_host_port.clone(),
                    source,
                };
                let listener = TcpListener::bind(&config.bind_host_port)
                    .await
                    .map_err(bind_error)?;
                let addr = listener.local_addr().map_err(bind_error)?;
                let task = tokio::spawn(serve_tcp(service, listener, config.max_message_size, shutdown_rx));
                tracing::info!("{} ready on {}", config.server_name, addr);
                (
                    ServerTransport::Tcp(TcpTransport::new(addr, config.max_message_size)),
                    task,
                )
            }
        };

        let server = Self {
            config,
            transport,
            shutdown,
            stopped,
            serving: Mutex::new(Some(serving)),
        };
        Ok((server, events))
    }

    /// Configuration the server started with
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Client transport for this server
    #[must_use]
    pub fn transport(&self) -> ServerTransport {
        self.transport.clone()
    }

    /// New client for this server
    #[must_use]
    pub fn client(&self) -> BuildClient<ServerTransport> {
        BuildClient::new(self.transport())
    }

    /// Bound TCP address
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.transport {
            ServerTransport::Tcp(transport) => Some(transport.addr()),
            ServerTransport::Memory(_) => None,
        }
    }

    /// Check if shutdown has completed
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Stop serving; every later call fails
    pub async fn stop(&self) {
        if self.shutdown.send_replace(true) {
            let mut stopped = self.stopped.subscribe();
            let _ = stopped.wait_for(|stopped| *stopped).await;
            return;
        }

        tracing::info!("Stopping {}", self.config.server_name);
        let serving = self.serving.lock().await.take();
        if let Some(task) = serving {
            if let Err(err) = task.await {
                tracing::warn!("{} serving task ended abnormally: {}", self.config.server_name, err);
            }
        }
        self.stopped.send_replace(true);
        tracing::info!("{} stopped", self.config.server_name);
    }
}

#[async_trait]
impl StopRequester for BuildServer {
    async fn request_stop(&self) {
        self.stop().await;
    }
}
