//! Frame reassembly state machine
//!
//! Holds at most one in-progress entry. Its content buffer lives exactly
//! from `Header` to `EntryEnd` and is released on completion or failure.

use crate::error::ResourceError;
use crate::frame::{ResourceFrame, ResourceHeader, ResourceId};
use vmbuild_commands::{User, Workdir};

/// A resource rebuilt from its frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructedResource {
    header: ResourceHeader,
    contents: Vec<u8>,
}

impl ReconstructedResource {
    /// Entry id from the header
    #[inline]
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.header.id
    }

    /// Header the entry was opened with
    #[inline]
    #[must_use]
    pub fn header(&self) -> &ResourceHeader {
        &self.header
    }

    /// Check if the entry is a directory
    #[inline]
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.header.is_dir
    }

    /// Source path on the host
    #[inline]
    #[must_use]
    pub fn source_path(&self) -> &str {
        &self.header.source_path
    }

    /// Path to create on the guest
    #[inline]
    #[must_use]
    pub fn target_path(&self) -> &str {
        &self.header.target_path
    }

    /// Permission bits for the target
    #[inline]
    #[must_use]
    pub fn target_mode(&self) -> u32 {
        self.header.file_mode
    }

    /// Owner for the target
    #[inline]
    #[must_use]
    pub fn target_user(&self) -> &User {
        &self.header.target_user
    }

    /// Working directory the target is relative to
    #[inline]
    #[must_use]
    pub fn target_workdir(&self) -> &Workdir {
        &self.header.target_workdir
    }

    /// Concatenated chunk payloads (empty for directories)
    #[inline]
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// Take the contents
    #[inline]
    #[must_use]
    pub fn into_contents(self) -> Vec<u8> {
        self.contents
    }
}

/// Result of feeding one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Frame accepted, nothing complete yet
    Pending,
    /// An entry closed
    Completed(ReconstructedResource),
    /// `StreamEnd` seen
    Finished,
}

/// Rebuilds resources from an ordered frame sequence
#[derive(Debug, Default)]
pub struct Reassembler {
    current: Option<ReconstructedResource>,
    finished: bool,
    completed: usize,
}

impl Reassembler {
    /// Create an idle reassembler
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries completed so far
    #[inline]
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Check if `StreamEnd` was seen
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed the next frame
    ///
    /// # Errors
    /// Returns [`ResourceError`] on checksum mismatch, protocol violation or
    /// a producer failure frame. The open entry is discarded.
    pub fn feed(&mut self, frame: ResourceFrame) -> Result<Progress, ResourceError> {
        if self.finished {
            return Err(ResourceError::UnexpectedFrame {
                frame: frame.kind(),
                reason: "stream already ended",
            });
        }

        match frame {
            ResourceFrame::Header(header) => {
                if self.current.is_some() {
                    self.current = None;
                    return Err(ResourceError::UnexpectedFrame {
                        frame: "header",
                        reason: "previous entry still open",
                    });
                }
                self.current = Some(ReconstructedResource {
                    header,
                    contents: Vec::new(),
                });
                Ok(Progress::Pending)
            }
            ResourceFrame::Chunk(chunk) => {
                let current = self.open_entry("chunk", chunk.id)?;
                if current.header.is_dir {
                    self.current = None;
                    return Err(ResourceError::UnexpectedFrame {
                        frame: "chunk",
                        reason: "directory entries carry no payload",
                    });
                }
                if !chunk.verify() {
                    let path = current.header.source_path.clone();
                    self.current = None;
                    tracing::warn!("Checksum mismatch in {} ({})", path, chunk.id);
                    return Err(ResourceError::ChecksumMismatch { id: chunk.id, path });
                }
                current.contents.extend_from_slice(&chunk.payload);
                Ok(Progress::Pending)
            }
            ResourceFrame::EntryEnd { id } => {
                self.open_entry("entry_end", id)?;
                let completed = self.current.take().map(Progress::Completed);
                self.completed += 1;
                Ok(completed.unwrap_or(Progress::Pending))
            }
            ResourceFrame::Failed { id, message } => {
                self.current = None;
                Err(ResourceError::ProducerFailed { id, message })
            }
            ResourceFrame::StreamEnd => {
                if self.current.take().is_some() {
                    return Err(ResourceError::UnexpectedFrame {
                        frame: "stream_end",
                        reason: "entry still open",
                    });
                }
                self.finished = true;
                Ok(Progress::Finished)
            }
        }
    }

    /// Signal end of input
    ///
    /// # Errors
    /// Returns [`ResourceError::Truncated`] if `StreamEnd` was never seen
    pub fn finish(&mut self) -> Result<(), ResourceError> {
        self.current = None;
        if self.finished {
            Ok(())
        } else {
            Err(ResourceError::Truncated)
        }
    }

    fn open_entry(
        &mut self,
        frame: &'static str,
        id: ResourceId,
    ) -> Result<&mut ReconstructedResource, ResourceError> {
        let Some(current) = self.current.as_ref() else {
            return Err(ResourceError::UnexpectedFrame {
                frame,
                reason: "no entry open",
            });
        };
        if current.header.id != id {
            let expected = current.header.id;
            self.current = None;
            return Err(ResourceError::IdMismatch {
                expected,
                actual: id,
            });
        }
        self.current.as_mut().ok_or(ResourceError::UnexpectedFrame {
            frame,
            reason: "no entry open",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ResourceChunk;

    fn header(id: ResourceId, is_dir: bool) -> ResourceFrame {
        ResourceFrame::Header(ResourceHeader {
            id,
            source_path: "src".to_string(),
            target_path: "/dst".to_string(),
            file_mode: 0o644,
            is_dir,
            target_user: User::default(),
            target_workdir: Workdir::default(),
        })
    }

    fn chunk(id: ResourceId, payload: &[u8]) -> ResourceFrame {
        ResourceFrame::Chunk(ResourceChunk::new(id, payload.to_vec()))
    }

    #[test]
    fn file_entry_concatenates_chunks() {
        let id = ResourceId::new();
        let mut reassembler = Reassembler::new();

        assert_eq!(reassembler.feed(header(id, false)).unwrap(), Progress::Pending);
        assert_eq!(reassembler.feed(chunk(id, b"hello ")).unwrap(), Progress::Pending);
        assert_eq!(reassembler.feed(chunk(id, b"world")).unwrap(), Progress::Pending);

        let Progress::Completed(resource) = reassembler.feed(ResourceFrame::EntryEnd { id }).unwrap() else {
            panic!("expected completed entry");
        };
        assert_eq!(resource.contents(), b"hello world");
        assert_eq!(resource.target_path(), "/dst");
        assert!(!resource.is_dir());

        assert_eq!(reassembler.feed(ResourceFrame::StreamEnd).unwrap(), Progress::Finished);
        assert!(reassembler.finish().is_ok());
        assert_eq!(reassembler.completed(), 1);
    }

    #[test]
    fn directory_entry_is_empty_marker() {
        let id = ResourceId::new();
        let mut reassembler = Reassembler::new();
        reassembler.feed(header(id, true)).unwrap();
        let Progress::Completed(resource) = reassembler.feed(ResourceFrame::EntryEnd { id }).unwrap() else {
            panic!("expected completed entry");
        };
        assert!(resource.is_dir());
        assert!(resource.contents().is_empty());
    }

    #[test]
    fn tampered_chunk_is_integrity_failure() {
        let id = ResourceId::new();
        let mut reassembler = Reassembler::new();
        reassembler.feed(header(id, false)).unwrap();

        let mut tampered = ResourceChunk::new(id, b"payload".to_vec());
        tampered.payload[0] ^= 0xff;
        let err = reassembler.feed(ResourceFrame::Chunk(tampered)).unwrap_err();
        assert!(err.is_integrity_failure());

        // the entry is gone, its end marker now has nothing to close
        let err = reassembler.feed(ResourceFrame::EntryEnd { id }).unwrap_err();
        assert!(matches!(err, ResourceError::UnexpectedFrame { .. }));
    }

    #[test]
    fn mismatched_id_is_rejected() {
        let id = ResourceId::new();
        let other = ResourceId::new();
        let mut reassembler = Reassembler::new();
        reassembler.feed(header(id, false)).unwrap();

        let err = reassembler.feed(chunk(other, b"x")).unwrap_err();
        assert!(matches!(err, ResourceError::IdMismatch { expected, actual } if expected == id && actual == other));
    }

    #[test]
    fn chunk_without_header_is_rejected() {
        let mut reassembler = Reassembler::new();
        let err = reassembler.feed(chunk(ResourceId::new(), b"x")).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn nested_header_is_rejected() {
        let mut reassembler = Reassembler::new();
        reassembler.feed(header(ResourceId::new(), false)).unwrap();
        assert!(reassembler.feed(header(ResourceId::new(), false)).is_err());
    }

    #[test]
    fn chunk_on_directory_is_rejected() {
        let id = ResourceId::new();
        let mut reassembler = Reassembler::new();
        reassembler.feed(header(id, true)).unwrap();
        assert!(reassembler.feed(chunk(id, b"x")).is_err());
    }

    #[test]
    fn stream_end_with_open_entry_is_rejected() {
        let mut reassembler = Reassembler::new();
        reassembler.feed(header(ResourceId::new(), false)).unwrap();
        assert!(reassembler.feed(ResourceFrame::StreamEnd).is_err());
    }

    #[test]
    fn frames_after_stream_end_are_rejected() {
        let mut reassembler = Reassembler::new();
        reassembler.feed(ResourceFrame::StreamEnd).unwrap();
        assert!(reassembler.is_finished());
        assert!(reassembler.feed(header(ResourceId::new(), false)).is_err());
    }

    #[test]
    fn missing_stream_end_is_truncation() {
        let mut reassembler = Reassembler::new();
        assert!(matches!(reassembler.finish(), Err(ResourceError::Truncated)));
    }

    #[test]
    fn producer_failure_frame_surfaces() {
        let id = ResourceId::new();
        let mut reassembler = Reassembler::new();
        reassembler.feed(header(id, false)).unwrap();
        let err = reassembler
            .feed(ResourceFrame::Failed {
                id: Some(id),
                message: "disk gone".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, ResourceError::ProducerFailed { id: Some(got), .. } if got == id));
    }
}
