//! Host-facing build client
//!
//! Wraps a [`Transport`] with the calls a builder makes while driving a
//! guest: fetch and decode the instruction batch, drain it one instruction
//! at a time, fetch resources, and report output and the final outcome.

use crate::error::RpcError;
use crate::protocol::Request;
use crate::transport::Transport;
use vmbuild_commands::{BuildInstruction, InstructionDecoder, InstructionQueue};
use vmbuild_resource::{spawn_consumer, ResourceStream};

/// Build client over any transport
#[derive(Debug)]
pub struct BuildClient<T> {
    transport: T,
    decoder: InstructionDecoder,
    queue: InstructionQueue,
}

impl<T: Transport> BuildClient<T> {
    /// Create client with the default directive registry
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::with_decoder(transport, InstructionDecoder::default())
    }

    /// Create client with a custom decoder
    #[must_use]
    pub fn with_decoder(transport: T, decoder: InstructionDecoder) -> Self {
        Self {
            transport,
            decoder,
            queue: InstructionQueue::new(),
        }
    }

    /// Underlying transport
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch the instruction batch and queue it, returning the queued count
    ///
    /// Replaces anything still queued.
    ///
    /// # Errors
    /// Returns [`RpcError`] if the call fails or the batch does not decode
    pub async fn fetch_instructions(&mut self) -> Result<usize, RpcError> {
        let records = self
            .transport
            .call(Request::FetchInstructions)
            .await?
            .into_records()?;
        self.queue = self.decoder.decode_batch(&records)?;
        tracing::debug!("Queued {} of {} instruction records", self.queue.len(), records.len());
        Ok(self.queue.len())
    }

    /// Take the next queued instruction; `None` once drained
    pub fn next_instruction(&mut self) -> Option<BuildInstruction> {
        self.queue.next()
    }

    /// Instructions still queued
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Fetch the resources registered under `path`
    ///
    /// The returned stream yields one result per entry; it ends after the
    /// first error.
    ///
    /// # Errors
    /// Returns [`RpcError`] if the service rejects the request
    pub async fn resource(&self, path: &str) -> Result<ResourceStream, RpcError> {
        let frames = self
            .transport
            .open_stream(Request::FetchResource {
                path: path.to_string(),
            })
            .await?;
        Ok(spawn_consumer(frames))
    }

    /// Report captured stdout lines
    ///
    /// # Errors
    /// Returns [`RpcError`] if the call fails
    pub async fn stdout(&self, lines: Vec<String>) -> Result<(), RpcError> {
        self.transport.call(Request::StdOut { lines }).await?.into_ack()
    }

    /// Report captured stderr lines
    ///
    /// # Errors
    /// Returns [`RpcError`] if the call fails
    pub async fn stderr(&self, lines: Vec<String>) -> Result<(), RpcError> {
        self.transport.call(Request::StdErr { lines }).await?.into_ack()
    }

    /// Report a failed build
    ///
    /// # Errors
    /// Returns [`RpcError`] if the call fails
    pub async fn abort(&self, cause: impl Into<String>) -> Result<(), RpcError> {
        self.transport
            .call(Request::Abort { cause: cause.into() })
            .await?
            .into_ack()
    }

    /// Report a completed build
    ///
    /// # Errors
    /// Returns [`RpcError`] if the call fails
    pub async fn success(&self) -> Result<(), RpcError> {
        self.transport.call(Request::Success).await?.into_ack()
    }

    /// Check that the service is alive
    ///
    /// # Errors
    /// Returns [`RpcError`] once the service has stopped
    pub async fn ping(&self) -> Result<(), RpcError> {
        self.transport.call(Request::Ping).await?.into_ack()
    }
}
