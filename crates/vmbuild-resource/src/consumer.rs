//! Resource consumer
//!
//! Runs a [`Reassembler`] over a frame source in its own task and feeds
//! results into an output queue the caller drains at its own pace. Exactly
//! one `Ok` per completed entry; the first error (transport, integrity,
//! protocol) is delivered once and ends consumption.

use crate::error::ResourceError;
use crate::frame::ResourceFrame;
use crate::reassembler::{Progress, ReconstructedResource, Reassembler};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Outcome for one entry
pub type ResourceResult = Result<ReconstructedResource, ResourceError>;

/// Results buffered ahead of the caller
const OUTPUT_QUEUE_CAPACITY: usize = 16;

/// Output queue of a running consumer
///
/// Dropping it ends the consumer at its next delivery.
#[derive(Debug)]
pub struct ResourceStream {
    rx: mpsc::Receiver<ResourceResult>,
}

impl ResourceStream {
    /// Receive the next result; `None` once consumption ended
    pub async fn recv(&mut self) -> Option<ResourceResult> {
        self.rx.recv().await
    }

    /// Drain everything, stopping after the first error
    pub async fn collect_all(mut self) -> Vec<ResourceResult> {
        let mut results = Vec::new();
        while let Some(result) = self.rx.recv().await {
            results.push(result);
        }
        results
    }
}

impl Stream for ResourceStream {
    type Item = ResourceResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Spawn a consumer over any frame source
pub fn spawn_consumer<S, E>(frames: S) -> ResourceStream
where
    S: Stream<Item = Result<ResourceFrame, E>> + Send + Unpin + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);
    tokio::spawn(consume(frames, tx));
    ResourceStream { rx }
}

/// Spawn a consumer over an in-process frame queue
pub fn spawn_local_consumer(frames: mpsc::Receiver<ResourceFrame>) -> ResourceStream {
    let frames = futures::stream::unfold(frames, |mut rx| async move {
        rx.recv()
            .await
            .map(|frame| (Ok::<_, std::convert::Infallible>(frame), rx))
    });
    spawn_consumer(Box::pin(frames))
}

async fn consume<S, E>(mut frames: S, tx: mpsc::Sender<ResourceResult>)
where
    S: Stream<Item = Result<ResourceFrame, E>> + Unpin,
    E: Display,
{
    let mut reassembler = Reassembler::new();

    while let Some(item) = frames.next().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!("Resource stream transport failed: {}", err);
                let _ = tx.send(Err(ResourceError::Transport(err.to_string()))).await;
                return;
            }
        };

        match reassembler.feed(frame) {
            Ok(Progress::Pending) => {}
            Ok(Progress::Completed(resource)) => {
                tracing::debug!(
                    "Reconstructed {} -> {} ({} bytes)",
                    resource.source_path(),
                    resource.target_path(),
                    resource.contents().len()
                );
                if tx.send(Ok(resource)).await.is_err() {
                    return;
                }
            }
            Ok(Progress::Finished) => {
                tracing::debug!("Resource stream finished after {} entries", reassembler.completed());
                return;
            }
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
        }
    }

    if let Err(err) = reassembler.finish() {
        let _ = tx.send(Err(err)).await;
    }
}
