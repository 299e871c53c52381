//! Client-side transport abstraction

use crate::error::RpcError;
use crate::protocol::{Request, Response};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use vmbuild_resource::ResourceFrame;

/// Frames of one resource fetch as seen by the client
pub type FrameStream = BoxStream<'static, Result<ResourceFrame, RpcError>>;

/// Carries requests to a build service
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a unary request and wait for its response
    async fn call(&self, request: Request) -> Result<Response, RpcError>;

    /// Send a streaming request
    ///
    /// An error reported before the first frame is returned here; later
    /// failures arrive as stream items.
    async fn open_stream(&self, request: Request) -> Result<FrameStream, RpcError>;
}

/// Turn a stream of responses into a frame stream, resolving a leading error
///
/// # Errors
/// Returns the error carried by the first response, if any
pub(crate) async fn frames_from_responses(
    mut responses: BoxStream<'static, Result<Response, RpcError>>,
) -> Result<FrameStream, RpcError> {
    let Some(first) = responses.next().await else {
        return Ok(futures::stream::empty().boxed());
    };
    let first = first?.into_frame()?;
    let rest = responses.map(|item| item.and_then(Response::into_frame));
    Ok(futures::stream::once(async move { Ok(first) })
        .chain(rest)
        .boxed())
}
