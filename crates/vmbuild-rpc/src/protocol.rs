//! Wire protocol
//!
//! One [`Request`] per call. Unary calls get one [`Response`]; a resource
//! fetch gets one `Response::Frame` per resource frame, ending with the
//! `StreamEnd` (or `Failed`) frame.
//!
//! Messages are JSON. The transports put each message in its own
//! length-delimited frame and refuse anything larger than the configured
//! maximum message size.

use crate::error::RpcError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use vmbuild_resource::ResourceFrame;

/// Default maximum encoded message size (16 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Call sent to the build service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    /// Fetch the serialized instruction batch
    FetchInstructions,
    /// Stream the resources registered under `path`
    FetchResource { path: String },
    /// Captured guest stdout lines
    StdOut { lines: Vec<String> },
    /// Captured guest stderr lines
    StdErr { lines: Vec<String> },
    /// Guest build failed
    Abort { cause: String },
    /// Guest build completed
    Success,
    /// Liveness check
    Ping,
}

impl Request {
    /// Method name for logs
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::FetchInstructions => "FetchInstructions",
            Self::FetchResource { .. } => "FetchResource",
            Self::StdOut { .. } => "ReportStdOut",
            Self::StdErr { .. } => "ReportStdErr",
            Self::Abort { .. } => "ReportAbort",
            Self::Success => "ReportSuccess",
            Self::Ping => "Ping",
        }
    }
}

/// Reply from the build service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Response {
    /// Instruction records, in order
    Instructions { records: Vec<String> },
    /// One frame of a resource stream
    Frame(ResourceFrame),
    /// Report accepted
    Ack,
    /// Call failed on the service side
    Error { message: String, not_found: bool },
}

impl Response {
    /// Wire form of a service error
    #[must_use]
    pub fn from_error(err: &RpcError) -> Self {
        match err {
            RpcError::NotFound(path) => Self::Error {
                message: path.clone(),
                not_found: true,
            },
            other => Self::Error {
                message: other.to_string(),
                not_found: false,
            },
        }
    }

    /// Variant name for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Instructions { .. } => "instructions",
            Self::Frame(_) => "frame",
            Self::Ack => "ack",
            Self::Error { .. } => "error",
        }
    }

    /// Expect an acknowledgement
    ///
    /// # Errors
    /// Returns the carried error, or [`RpcError::UnexpectedResponse`]
    pub fn into_ack(self) -> Result<(), RpcError> {
        match self {
            Self::Ack => Ok(()),
            Self::Error { message, not_found } => Err(RpcError::from_remote(message, not_found)),
            other => Err(RpcError::UnexpectedResponse(other.kind().to_string())),
        }
    }

    /// Expect an instruction batch
    ///
    /// # Errors
    /// Returns the carried error, or [`RpcError::UnexpectedResponse`]
    pub fn into_records(self) -> Result<Vec<String>, RpcError> {
        match self {
            Self::Instructions { records } => Ok(records),
            Self::Error { message, not_found } => Err(RpcError::from_remote(message, not_found)),
            other => Err(RpcError::UnexpectedResponse(other.kind().to_string())),
        }
    }

    /// Expect a resource frame
    ///
    /// # Errors
    /// Returns the carried error, or [`RpcError::UnexpectedResponse`]
    pub fn into_frame(self) -> Result<ResourceFrame, RpcError> {
        match self {
            Self::Frame(frame) => Ok(frame),
            Self::Error { message, not_found } => Err(RpcError::from_remote(message, not_found)),
            other => Err(RpcError::UnexpectedResponse(other.kind().to_string())),
        }
    }
}

/// Encode a message, enforcing the size limit
///
/// # Errors
/// Returns [`RpcError::Codec`] or [`RpcError::MessageTooLarge`]
pub fn encode<T: Serialize>(message: &T, max_message_size: usize) -> Result<Bytes, RpcError> {
    let bytes = serde_json::to_vec(message)?;
    if bytes.len() > max_message_size {
        return Err(RpcError::MessageTooLarge {
            size: bytes.len(),
            max: max_message_size,
        });
    }
    Ok(Bytes::from(bytes))
}

/// Decode a message
///
/// # Errors
/// Returns [`RpcError::Codec`] on malformed input
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RpcError> {
    Ok(serde_json::from_slice(bytes)?)
}
