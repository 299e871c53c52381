//! Length-delimited transport over byte streams
//!
//! One connection per call. The client writes one request frame; the server
//! answers with one response frame, or one frame per resource frame for a
//! fetch, and closes. Frames larger than the configured maximum are refused
//! on both sides.
//!
//! The connection helpers work over any `AsyncRead + AsyncWrite` stream, so
//! a caller holding a secured stream can use them directly. The built-in
//! listener and [`TcpTransport`] use plain TCP.

use crate::error::RpcError;
use crate::protocol::{decode, encode, Request, Response};
use crate::service::{dispatch, BuildService, Reply};
use crate::transport::{frames_from_responses, FrameStream, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Frame codec bounded by `max_message_size`
#[must_use]
pub fn codec(max_message_size: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_message_size)
        .new_codec()
}

/// Map connection-level failures; a closed peer means the service is gone
fn connection_error(err: io::Error) -> RpcError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => RpcError::Unavailable,
        io::ErrorKind::InvalidData => RpcError::Codec(err.to_string()),
        _ => RpcError::Io(err),
    }
}

async fn write_message<IO>(
    framed: &mut Framed<IO, LengthDelimitedCodec>,
    response: &Response,
    max_message_size: usize,
) -> Result<(), RpcError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let bytes = encode(response, max_message_size)?;
    framed.send(bytes).await.map_err(connection_error)
}

/// Write `response`; if it is over the limit, tell the client why instead
async fn write_reply<IO>(
    framed: &mut Framed<IO, LengthDelimitedCodec>,
    response: &Response,
    max_message_size: usize,
) -> Result<(), RpcError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let result = write_message(framed, response, max_message_size).await;
    if let Err(err @ RpcError::MessageTooLarge { .. }) = &result {
        tracing::warn!("{} reply refused: {}", response.kind(), err);
        write_message(framed, &Response::from_error(err), max_message_size).await?;
    }
    result
}

/// Serve one call on an accepted connection
///
/// # Errors
/// Returns [`RpcError`] if the request cannot be read or the reply cannot
/// be written
pub async fn serve_connection<S, IO>(
    service: &S,
    io: IO,
    max_message_size: usize,
) -> Result<(), RpcError>
where
    S: BuildService + ?Sized,
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(io, codec(max_message_size));
    let Some(frame) = framed.next().await else {
        return Ok(());
    };
    let request: Request = decode(&frame.map_err(connection_error)?)?;
    tracing::debug!("{} received", request.method());

    match dispatch(service, request).await {
        Reply::Unary(response) => write_reply(&mut framed, &response, max_message_size).await?,
        Reply::Stream(mut frames) => {
            while let Some(frame) = frames.recv().await {
                write_reply(&mut framed, &Response::Frame(frame), max_message_size).await?;
            }
        }
    }

    SinkExt::<Bytes>::close(&mut framed).await.map_err(connection_error)
}

/// Accept connections until `shutdown` turns true, then drop the listener
pub async fn serve_tcp<S: BuildService>(
    service: Arc<S>,
    listener: TcpListener,
    max_message_size: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stopped| *stopped) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let service = Arc::clone(&service);
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(service.as_ref(), stream, max_message_size).await {
                            tracing::warn!("Call from {} failed: {}", peer, err);
                        }
                    });
                }
                Err(err) => tracing::warn!("Accept failed: {}", err),
            },
        }
    }
    drop(listener);
    tracing::debug!("TCP listener closed");
}

/// Send one unary request over `io`
///
/// # Errors
/// Returns [`RpcError::Unavailable`] if the peer closes without answering
pub async fn call_over<IO>(io: IO, request: Request, max_message_size: usize) -> Result<Response, RpcError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(io, codec(max_message_size));
    framed
        .send(encode(&request, max_message_size)?)
        .await
        .map_err(connection_error)?;
    match framed.next().await {
        Some(frame) => decode(&frame.map_err(connection_error)?),
        None => Err(RpcError::Unavailable),
    }
}

/// Send one streaming request over `io`
///
/// # Errors
/// Returns the service error if it rejects the request before streaming
pub async fn open_stream_over<IO>(
    io: IO,
    request: Request,
    max_message_size: usize,
) -> Result<FrameStream, RpcError>
where
    IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut framed = Framed::new(io, codec(max_message_size));
    framed
        .send(encode(&request, max_message_size)?)
        .await
        .map_err(connection_error)?;
    let responses = framed.map(|frame| frame.map_err(connection_error).and_then(|bytes| decode(&bytes)));
    frames_from_responses(responses.boxed()).await
}

/// Client end of a TCP service
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: SocketAddr,
    max_message_size: usize,
}

impl TcpTransport {
    /// Create transport for the service at `addr`
    #[inline]
    #[must_use]
    pub fn new(addr: SocketAddr, max_message_size: usize) -> Self {
        Self {
            addr,
            max_message_size,
        }
    }

    /// Service address
    #[inline]
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn connect(&self) -> Result<TcpStream, RpcError> {
        TcpStream::connect(self.addr).await.map_err(connection_error)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, request: Request) -> Result<Response, RpcError> {
        let stream = self.connect().await?;
        call_over(stream, request, self.max_message_size).await
    }

    async fn open_stream(&self, request: Request) -> Result<FrameStream, RpcError> {
        let stream = self.connect().await?;
        open_stream_over(stream, request, self.max_message_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FrameReceiver;
    use vmbuild_resource::{ResolvedResource, ResourceFrame, ResourceProducer};

    struct Files;

    #[async_trait]
    impl BuildService for Files {
        async fn fetch_instructions(&self) -> Result<Vec<String>, RpcError> {
            // about 200 KB once encoded
            Ok(vec!["r".repeat(1000); 200])
        }

        async fn fetch_resource(&self, path: &str) -> Result<FrameReceiver, RpcError> {
            let contents = vec![b'z'; 10_000];
            let resource = ResolvedResource::file_from_bytes(contents, path.to_string(), format!("/{path}"));
            Ok(ResourceProducer::new(1024).spawn(vec![resource]))
        }

        async fn report_stdout(&self, _lines: Vec<String>) -> Result<(), RpcError> {
            Ok(())
        }

        async fn report_stderr(&self, _lines: Vec<String>) -> Result<(), RpcError> {
            Ok(())
        }

        async fn report_abort(&self, cause: String) -> Result<(), RpcError> {
            Err(RpcError::Remote(cause))
        }

        async fn report_success(&self) -> Result<(), RpcError> {
            Ok(())
        }

        async fn ping(&self) -> Result<(), RpcError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn duplex_unary_call() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let served = tokio::spawn(async move { serve_connection(&Files, server, 1024 * 1024).await });

        let response = call_over(client, Request::Ping, 1024 * 1024).await.unwrap();
        assert_eq!(response, Response::Ack);
        served.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn duplex_remote_error() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move { serve_connection(&Files, server, 1024 * 1024).await });

        let response = call_over(
            client,
            Request::Abort {
                cause: "bad".to_string(),
            },
            1024 * 1024,
        )
        .await
        .unwrap();
        assert!(matches!(response.into_ack(), Err(RpcError::Remote(msg)) if msg == "bad"));
    }

    #[tokio::test]
    async fn duplex_stream() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move { serve_connection(&Files, server, 1024 * 1024).await });

        let frames: Vec<_> = open_stream_over(
            client,
            Request::FetchResource {
                path: "blob".to_string(),
            },
            1024 * 1024,
        )
        .await
        .unwrap()
        .collect()
        .await;

        // header + 10 chunks + entry end + stream end
        assert_eq!(frames.len(), 13);
        assert!(matches!(frames.last(), Some(Ok(ResourceFrame::StreamEnd))));
    }

    #[tokio::test]
    async fn oversized_request_never_leaves_client() {
        let (client, _server) = tokio::io::duplex(1024);
        let request = Request::StdOut {
            lines: vec!["x".repeat(4096)],
        };
        let err = call_over(client, request, 512).await.unwrap_err();
        assert!(matches!(err, RpcError::MessageTooLarge { max: 512, .. }));
    }

    #[tokio::test]
    async fn oversized_reply_is_reported_not_dropped() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let served = tokio::spawn(async move { serve_connection(&Files, server, 64 * 1024).await });

        let response = call_over(client, Request::FetchInstructions, 64 * 1024).await.unwrap();
        let err = response.into_records().unwrap_err();
        assert!(!err.is_unavailable());
        assert!(matches!(&err, RpcError::Remote(msg) if msg.contains("exceeds limit of 65536 bytes")));
        assert!(matches!(served.await.unwrap(), Err(RpcError::MessageTooLarge { max: 65536, .. })));
    }

    #[tokio::test]
    async fn oversized_reply_leaves_server_running() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_stop, shutdown) = watch::channel(false);
        tokio::spawn(serve_tcp(Arc::new(Files), listener, 64 * 1024, shutdown));

        let transport = TcpTransport::new(addr, 64 * 1024);
        let err = transport
            .call(Request::FetchInstructions)
            .await
            .and_then(Response::into_records)
            .unwrap_err();
        assert!(matches!(err, RpcError::Remote(_)));
        assert_eq!(transport.call(Request::Ping).await.unwrap(), Response::Ack);
    }

    #[tokio::test]
    async fn closed_listener_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, shutdown) = watch::channel(false);
        let server = tokio::spawn(serve_tcp(Arc::new(Files), listener, 1024 * 1024, shutdown));

        let transport = TcpTransport::new(addr, 1024 * 1024);
        assert_eq!(transport.call(Request::Ping).await.unwrap(), Response::Ack);

        stop.send_replace(true);
        server.await.unwrap();
        assert!(transport.call(Request::Ping).await.unwrap_err().is_unavailable());
    }
}
