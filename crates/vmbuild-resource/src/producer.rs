//! Resource producer
//!
//! Turns resolved resources into a frame stream:
//! - a file resource becomes `Header`, one `Chunk` per non-empty read of at
//!   most `chunk_size` bytes, then `EntryEnd`
//! - a directory resource is walked (root first, then entries in file-name
//!   order); every directory becomes `Header` + `EntryEnd`, every file is
//!   streamed as above
//! - symlinks are not followed during the walk: a link to a regular file is
//!   streamed with the target's contents and mode, any other link (to a
//!   directory, dangling) and special files are skipped with a warning
//! - after all resources, a single `StreamEnd`
//!
//! Every entry gets a fresh [`ResourceId`]. A read failure emits `Failed`
//! and ends the stream without `StreamEnd`.

use crate::error::ProduceError;
use crate::frame::{ResourceChunk, ResourceFrame, ResourceHeader, ResourceId};
use crate::resolved::{ContentReader, ResolvedResource};
use std::fs::{FileType, Metadata};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// Default chunk size bound
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Frames buffered between producer and transport
const FRAME_QUEUE_CAPACITY: usize = 16;

/// One walked filesystem entry
#[derive(Debug)]
struct WalkEntry {
    path: PathBuf,
    relative: PathBuf,
    is_dir: bool,
    mode: u32,
}

/// Frame producer with a bounded chunk size
#[derive(Debug, Clone, Copy)]
pub struct ResourceProducer {
    chunk_size: usize,
}

impl ResourceProducer {
    /// Create producer; a zero chunk size is raised to 1
    #[inline]
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Chunk size bound
    #[inline]
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Spawn a task streaming `resources` in order, terminated by `StreamEnd`
    #[must_use]
    pub fn spawn(self, resources: Vec<ResolvedResource>) -> mpsc::Receiver<ResourceFrame> {
        let (tx, rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        tokio::spawn(async move { self.run(resources, tx).await });
        rx
    }

    /// Stream `resources` into `tx`
    pub async fn run(&self, resources: Vec<ResolvedResource>, tx: mpsc::Sender<ResourceFrame>) {
        for resource in &resources {
            match self.produce(resource, &tx).await {
                Ok(()) => {}
                Err(ProduceError::Closed) => {
                    tracing::debug!("Frame receiver closed while producing {}", resource.source_path());
                    return;
                }
                Err(err) => {
                    tracing::error!("Producing {} failed: {}", resource.resolved_uri_or_path(), err);
                    let _ = tx
                        .send(ResourceFrame::Failed {
                            id: err.id(),
                            message: err.to_string(),
                        })
                        .await;
                    return;
                }
            }
        }
        let _ = tx.send(ResourceFrame::StreamEnd).await;
    }

    /// Produce the entries of one resource, without `StreamEnd`
    ///
    /// # Errors
    /// Returns [`ProduceError`] on read/walk failure or if the receiver closed
    pub async fn produce(
        &self,
        resource: &ResolvedResource,
        tx: &mpsc::Sender<ResourceFrame>,
    ) -> Result<(), ProduceError> {
        match resource.root() {
            Some(root) => self.produce_directory(resource, root, tx).await,
            None => {
                let header = ResourceHeader {
                    id: ResourceId::new(),
                    source_path: resource.source_path().to_string(),
                    target_path: resource.target_path().to_string(),
                    file_mode: resource.target_mode(),
                    is_dir: false,
                    target_user: resource.target_user().clone(),
                    target_workdir: resource.target_workdir().clone(),
                };
                let reader = resource.content().open().await.map_err(|source| {
                    ProduceError::io_error(None, resource.resolved_uri_or_path(), source)
                })?;
                self.produce_file(header, reader, Path::new(resource.resolved_uri_or_path()), tx)
                    .await
            }
        }
    }

    async fn produce_directory(
        &self,
        resource: &ResolvedResource,
        root: &Path,
        tx: &mpsc::Sender<ResourceFrame>,
    ) -> Result<(), ProduceError> {
        let mut entries = walk(root.to_path_buf());

        while let Some(entry) = entries.recv().await {
            let entry = entry?;
            let header = ResourceHeader {
                id: ResourceId::new(),
                source_path: join_relative(resource.source_path(), &entry.relative),
                target_path: join_relative(resource.target_path(), &entry.relative),
                file_mode: entry.mode,
                is_dir: entry.is_dir,
                target_user: resource.target_user().clone(),
                target_workdir: resource.target_workdir().clone(),
            };

            if entry.is_dir {
                let id = header.id;
                send(tx, ResourceFrame::Header(header)).await?;
                send(tx, ResourceFrame::EntryEnd { id }).await?;
                continue;
            }

            let reader: ContentReader = match tokio::fs::File::open(&entry.path).await {
                Ok(file) => Box::new(file),
                Err(source) => return Err(ProduceError::io_error(None, &entry.path, source)),
            };
            self.produce_file(header, reader, &entry.path, tx).await?;
        }
        Ok(())
    }

    async fn produce_file(
        &self,
        header: ResourceHeader,
        mut reader: ContentReader,
        path: &Path,
        tx: &mpsc::Sender<ResourceFrame>,
    ) -> Result<(), ProduceError> {
        let id = header.id;
        send(tx, ResourceFrame::Header(header)).await?;

        let mut buffer = vec![0u8; self.chunk_size];
        loop {
            let read = reader
                .read(&mut buffer)
                .await
                .map_err(|source| ProduceError::io_error(Some(id), path, source))?;
            if read == 0 {
                return send(tx, ResourceFrame::EntryEnd { id }).await;
            }
            let chunk = ResourceChunk::new(id, buffer[..read].to_vec());
            send(tx, ResourceFrame::Chunk(chunk)).await?;
        }
    }
}

impl Default for ResourceProducer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

async fn send(tx: &mpsc::Sender<ResourceFrame>, frame: ResourceFrame) -> Result<(), ProduceError> {
    tx.send(frame).await.map_err(|_| ProduceError::Closed)
}

/// Walk `root` on a blocking thread, yielding entries as they are visited
fn walk(root: PathBuf) -> mpsc::Receiver<Result<WalkEntry, ProduceError>> {
    let (tx, rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
    tokio::task::spawn_blocking(move || {
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let item = entry
                .and_then(|entry| walk_entry(&root, &entry))
                .map_err(|source| ProduceError::Walk {
                    root: root.clone(),
                    source,
                })
                .transpose();
            let Some(item) = item else {
                continue;
            };
            let failed = item.is_err();
            if tx.blocking_send(item).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Classify one visited entry; `None` for entries that are not streamed
fn walk_entry(root: &Path, entry: &walkdir::DirEntry) -> Result<Option<WalkEntry>, walkdir::Error> {
    let path = entry.path();
    let metadata = if entry.path_is_symlink() && entry.depth() > 0 {
        match std::fs::metadata(path) {
            Ok(target) if target.is_file() => target,
            Ok(target) => {
                tracing::warn!("Skipping symlink {} to {}", path.display(), kind_name(target.file_type()));
                return Ok(None);
            }
            Err(err) => {
                tracing::warn!("Skipping dangling symlink {}: {}", path.display(), err);
                return Ok(None);
            }
        }
    } else {
        entry.metadata()?
    };

    if !metadata.is_dir() && !metadata.is_file() {
        tracing::warn!("Skipping {} {}", kind_name(metadata.file_type()), path.display());
        return Ok(None);
    }

    let relative = path.strip_prefix(root).unwrap_or(Path::new("")).to_path_buf();
    Ok(Some(WalkEntry {
        path: path.to_path_buf(),
        relative,
        is_dir: metadata.is_dir(),
        mode: permission_bits(&metadata),
    }))
}

fn kind_name(file_type: FileType) -> &'static str {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_fifo() {
            return "fifo";
        }
        if file_type.is_socket() {
            return "socket";
        }
        if file_type.is_block_device() || file_type.is_char_device() {
            return "device";
        }
    }
    if file_type.is_dir() {
        "directory"
    } else if file_type.is_symlink() {
        "symlink"
    } else {
        "special file"
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

/// Join a walked entry's relative path onto a prefix; the root maps to the prefix itself
#[must_use]
pub fn join_relative(prefix: &str, relative: &Path) -> String {
    if relative.as_os_str().is_empty() {
        return prefix.to_string();
    }
    Path::new(prefix).join(relative).display().to_string()
}
