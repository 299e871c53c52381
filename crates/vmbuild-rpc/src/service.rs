//! Build service trait and request dispatch
//!
//! Transports decode a [`Request`], hand it to [`dispatch`], and write the
//! resulting [`Reply`] back. Service errors travel as `Response::Error`.

use crate::error::RpcError;
use crate::protocol::{Request, Response};
use async_trait::async_trait;
use tokio::sync::mpsc;
use vmbuild_resource::ResourceFrame;

/// Frames of one resource fetch, ending with `StreamEnd` or `Failed`
pub type FrameReceiver = mpsc::Receiver<ResourceFrame>;

/// Guest-facing build service
#[async_trait]
pub trait BuildService: Send + Sync + 'static {
    /// Serialized instruction records, in order
    async fn fetch_instructions(&self) -> Result<Vec<String>, RpcError>;

    /// Start streaming the resources registered under `path`
    async fn fetch_resource(&self, path: &str) -> Result<FrameReceiver, RpcError>;

    /// Captured guest stdout lines
    async fn report_stdout(&self, lines: Vec<String>) -> Result<(), RpcError>;

    /// Captured guest stderr lines
    async fn report_stderr(&self, lines: Vec<String>) -> Result<(), RpcError>;

    /// Guest build failed with `cause`
    async fn report_abort(&self, cause: String) -> Result<(), RpcError>;

    /// Guest build completed
    async fn report_success(&self) -> Result<(), RpcError>;

    /// Liveness check
    async fn ping(&self) -> Result<(), RpcError>;
}

/// What a transport sends back for one request
#[derive(Debug)]
pub enum Reply {
    /// A single response
    Unary(Response),
    /// A frame stream, one `Response::Frame` each
    Stream(FrameReceiver),
}

/// Run one request against a service
pub async fn dispatch<S>(service: &S, request: Request) -> Reply
where
    S: BuildService + ?Sized,
{
    let method = request.method();
    let result = match request {
        Request::FetchInstructions => service
            .fetch_instructions()
            .await
            .map(|records| Response::Instructions { records }),
        Request::FetchResource { path } => match service.fetch_resource(&path).await {
            Ok(frames) => return Reply::Stream(frames),
            Err(err) => Err(err),
        },
        Request::StdOut { lines } => service.report_stdout(lines).await.map(|()| Response::Ack),
        Request::StdErr { lines } => service.report_stderr(lines).await.map(|()| Response::Ack),
        Request::Abort { cause } => service.report_abort(cause).await.map(|()| Response::Ack),
        Request::Success => service.report_success().await.map(|()| Response::Ack),
        Request::Ping => service.ping().await.map(|()| Response::Ack),
    };

    match result {
        Ok(response) => Reply::Unary(response),
        Err(err) => {
            tracing::debug!("{} rejected: {}", method, err);
            Reply::Unary(Response::from_error(&err))
        }
    }
}
