//! In-process transport
//!
//! A dispatcher task owns the request queue. Each call is handed to the
//! service on its own task, so a slow report never holds up other calls.
//! Once shutdown is signalled the queue is dropped: calls already queued
//! and every later call fail with [`RpcError::Unavailable`].
//!
//! Requests and replies are handed over as values, never encoded, so no
//! message size limit applies here; only the framed transport enforces
//! `max_message_size`.

use crate::error::RpcError;
use crate::protocol::{Request, Response};
use crate::service::{dispatch, BuildService, Reply};
use crate::transport::{frames_from_responses, FrameStream, Transport};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Default request queue depth
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug)]
struct Call {
    request: Request,
    reply: oneshot::Sender<Reply>,
}

/// Client end of an in-process service
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    tx: mpsc::Sender<Call>,
}

impl MemoryTransport {
    async fn submit(&self, request: Request) -> Result<Reply, RpcError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Call { request, reply })
            .await
            .map_err(|_| RpcError::Unavailable)?;
        rx.await.map_err(|_| RpcError::Unavailable)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn call(&self, request: Request) -> Result<Response, RpcError> {
        match self.submit(request).await? {
            Reply::Unary(response) => Ok(response),
            Reply::Stream(_) => Err(RpcError::UnexpectedResponse("frame stream".to_string())),
        }
    }

    async fn open_stream(&self, request: Request) -> Result<FrameStream, RpcError> {
        match self.submit(request).await? {
            Reply::Stream(frames) => Ok(futures::stream::unfold(frames, |mut rx| async move {
                rx.recv().await.map(|frame| (Ok(frame), rx))
            })
            .boxed()),
            Reply::Unary(response) => {
                frames_from_responses(futures::stream::iter([Ok(response)]).boxed()).await
            }
        }
    }
}

/// Serve `service` in-process until `shutdown` turns true
pub fn serve_memory<S: BuildService>(
    service: Arc<S>,
    shutdown: watch::Receiver<bool>,
    capacity: usize,
) -> (MemoryTransport, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(run_dispatcher(service, rx, shutdown));
    (MemoryTransport { tx }, task)
}

async fn run_dispatcher<S: BuildService>(
    service: Arc<S>,
    mut rx: mpsc::Receiver<Call>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("In-memory dispatcher started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stopped| *stopped) => break,
            call = rx.recv() => {
                let Some(call) = call else { break };
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    let reply = dispatch(service.as_ref(), call.request).await;
                    let _ = call.reply.send(reply);
                });
            }
        }
    }
    rx.close();
    tracing::debug!("In-memory dispatcher stopped");
}
