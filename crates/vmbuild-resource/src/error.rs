//! Error types for resource streaming
//!
//! Provides error handling for:
//! - Integrity failures (chunk checksum mismatch)
//! - Protocol violations (frames out of order, ids that do not match)
//! - Producer-side failures reported over the wire
//! - Transport failures surfaced by the frame source

use crate::checksum::ChecksumError;
use crate::frame::ResourceId;
use std::path::PathBuf;

/// Errors produced while reconstructing resources
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// Chunk payload does not match its declared checksum
    #[error("chunk checksum did not match for {path} ({id})")]
    ChecksumMismatch { id: ResourceId, path: String },

    /// Frame that is not valid in the current state
    #[error("unexpected {frame} frame: {reason}")]
    UnexpectedFrame {
        frame: &'static str,
        reason: &'static str,
    },

    /// Frame id does not match the open entry
    #[error("frame id {actual} does not match open entry {expected}")]
    IdMismatch {
        expected: ResourceId,
        actual: ResourceId,
    },

    /// Stream ended before `StreamEnd`
    #[error("resource stream ended before stream end marker")]
    Truncated,

    /// Producer reported a failure
    #[error("producer failed{}: {message}", .id.map(|id| format!(" on {id}")).unwrap_or_default())]
    ProducerFailed {
        id: Option<ResourceId>,
        message: String,
    },

    /// Transport failed while reading frames
    #[error("failed reading chunk: {0}")]
    Transport(String),

    /// Checksum parse error
    #[error("checksum error: {0}")]
    Checksum(#[from] ChecksumError),
}

impl ResourceError {
    /// Check if this is an integrity failure
    #[inline]
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. })
    }

    /// Check if the stream violated the frame protocol
    #[inline]
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedFrame { .. } | Self::IdMismatch { .. } | Self::Truncated
        )
    }
}

/// Errors that stop a producer
#[derive(Debug, thiserror::Error)]
pub enum ProduceError {
    /// Reading a filesystem entry or content source failed
    #[error("io error reading {path}: {source}")]
    Io {
        id: Option<ResourceId>,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Walking the directory tree failed
    #[error("walk error under {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// The frame receiver went away
    #[error("frame receiver closed")]
    Closed,
}

impl ProduceError {
    /// Create IO error for path
    pub fn io_error(id: Option<ResourceId>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            id,
            path: path.into(),
            source,
        }
    }

    /// Entry the failure belongs to, if one was open
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<ResourceId> {
        match self {
            Self::Io { id, .. } => *id,
            Self::Walk { .. } | Self::Closed => None,
        }
    }
}
