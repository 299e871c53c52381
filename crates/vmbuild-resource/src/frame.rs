//! Resource stream frame vocabulary
//!
//! A resource request stream is a sequence of entries followed by exactly
//! one [`ResourceFrame::StreamEnd`]:
//!
//! ```text
//! Header(id) Chunk(id)* EntryEnd(id)   -- one per filesystem entry
//! ...
//! StreamEnd
//! ```
//!
//! A producer that cannot finish an entry sends [`ResourceFrame::Failed`]
//! instead and closes the stream without `StreamEnd`.

use crate::checksum::Checksum;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;
use vmbuild_commands::{User, Workdir};

/// Unique identifier of one entry within a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub Uuid);

impl ResourceId {
    /// Generate a fresh id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata opening one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHeader {
    /// Id shared by every frame of this entry
    pub id: ResourceId,
    /// Path on the host, prefixed by the requested source
    pub source_path: String,
    /// Path to create on the guest
    pub target_path: String,
    /// POSIX permission bits
    pub file_mode: u32,
    /// Directory entries carry no chunks
    pub is_dir: bool,
    /// Owner for the target
    pub target_user: User,
    /// Working directory the target is relative to
    pub target_workdir: Workdir,
}

/// A bounded fragment of file content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChunk {
    /// Entry this chunk belongs to
    pub id: ResourceId,
    /// Raw content, base64 on the wire
    #[serde(with = "base64_payload")]
    pub payload: Vec<u8>,
    /// Declared checksum of `payload`
    pub checksum: Checksum,
}

impl ResourceChunk {
    /// Create a chunk, checksumming the payload
    #[inline]
    #[must_use]
    pub fn new(id: ResourceId, payload: Vec<u8>) -> Self {
        let checksum = Checksum::compute(&payload);
        Self {
            id,
            payload,
            checksum,
        }
    }

    /// Check the declared checksum against the payload
    #[inline]
    #[must_use]
    pub fn verify(&self) -> bool {
        self.checksum.matches(&self.payload)
    }
}

/// One discrete message in a resource stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceFrame {
    /// Opens an entry
    Header(ResourceHeader),
    /// Content of the open entry
    Chunk(ResourceChunk),
    /// Closes the open entry
    EntryEnd { id: ResourceId },
    /// Producer could not complete the stream
    Failed {
        id: Option<ResourceId>,
        message: String,
    },
    /// Closes the whole stream
    StreamEnd,
}

impl ResourceFrame {
    /// Entry id carried by the frame
    #[must_use]
    pub fn id(&self) -> Option<ResourceId> {
        match self {
            Self::Header(header) => Some(header.id),
            Self::Chunk(chunk) => Some(chunk.id),
            Self::EntryEnd { id } => Some(*id),
            Self::Failed { id, .. } => *id,
            Self::StreamEnd => None,
        }
    }

    /// Short frame kind name for diagnostics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Header(_) => "header",
            Self::Chunk(_) => "chunk",
            Self::EntryEnd { .. } => "entry_end",
            Self::Failed { .. } => "failed",
            Self::StreamEnd => "stream_end",
        }
    }
}

mod base64_payload {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&STANDARD.encode(payload))
        } else {
            serializer.serialize_bytes(payload)
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        if deserializer.is_human_readable() {
            let encoded = String::deserialize(deserializer)?;
            STANDARD.decode(encoded).map_err(serde::de::Error::custom)
        } else {
            Vec::<u8>::deserialize(deserializer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_verifies_own_payload() {
        let mut chunk = ResourceChunk::new(ResourceId::new(), b"hello".to_vec());
        assert!(chunk.verify());

        chunk.payload[0] = b'j';
        assert!(!chunk.verify());
    }

    #[test]
    fn json_shape() {
        let id = ResourceId::new();
        let frame = ResourceFrame::Chunk(ResourceChunk::new(id, b"hi".to_vec()));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "chunk");
        assert_eq!(value["payload"], "aGk=");
        assert_eq!(value["id"], id.to_string());

        let decoded: ResourceFrame = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, frame);

        let end = serde_json::to_string(&ResourceFrame::StreamEnd).unwrap();
        assert_eq!(end, r#"{"type":"stream_end"}"#);
    }

    #[test]
    fn frame_ids() {
        let id = ResourceId::new();
        assert_eq!(ResourceFrame::EntryEnd { id }.id(), Some(id));
        assert_eq!(ResourceFrame::StreamEnd.id(), None);
        assert_eq!(ResourceFrame::StreamEnd.kind(), "stream_end");
    }
}
