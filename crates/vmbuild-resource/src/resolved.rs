//! Resolved resources served to the guest
//!
//! A [`ResolvedResource`] is a file or directory tree that an `ADD`/`COPY`
//! instruction's source has been resolved to on the serving side, together
//! with the target metadata the guest applies when placing it.

use bytes::Bytes;
use futures::future::BoxFuture;
use std::fmt::{self, Debug, Formatter};
use std::io;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;
use vmbuild_commands::{User, Workdir};

/// Reader over a file resource's contents
pub type ContentReader = Box<dyn AsyncRead + Send + Unpin>;

/// Factory opening a fresh content reader (remote `ADD` sources)
pub type ContentSupplier = Arc<dyn Fn() -> BoxFuture<'static, io::Result<ContentReader>> + Send + Sync>;

/// Default mode of file resources
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default mode of directory resources
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Where a resource's bytes come from
#[derive(Clone)]
pub enum ContentSource {
    /// File on the local filesystem, or the root of a directory tree
    Path(PathBuf),
    /// In-memory contents
    Bytes(Bytes),
    /// Caller supplied reader factory
    Supplier(ContentSupplier),
}

impl Debug for ContentSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Supplier(_) => f.write_str("Supplier(..)"),
        }
    }
}

impl ContentSource {
    /// Open a reader over the contents
    ///
    /// # Errors
    /// Returns the underlying IO error if the source cannot be opened
    pub async fn open(&self) -> io::Result<ContentReader> {
        match self {
            Self::Path(path) => {
                let file = tokio::fs::File::open(path).await?;
                Ok(Box::new(file))
            }
            Self::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            Self::Supplier(supplier) => supplier().await,
        }
    }
}

/// A file or directory resolved for one instruction source
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    content: ContentSource,
    is_dir: bool,
    resolved: String,
    source_path: String,
    target_path: String,
    target_mode: u32,
    target_user: User,
    target_workdir: Workdir,
}

impl ResolvedResource {
    /// File resource read from a local path
    #[must_use]
    pub fn file_from_path(
        path: impl Into<PathBuf>,
        source_path: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let resolved = path.display().to_string();
        Self::new(ContentSource::Path(path), false, resolved, source_path, target_path)
    }

    /// File resource with in-memory contents
    #[must_use]
    pub fn file_from_bytes(
        contents: impl Into<Bytes>,
        source_path: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        let source_path = source_path.into();
        let resolved = source_path.clone();
        Self::new(
            ContentSource::Bytes(contents.into()),
            false,
            resolved,
            source_path,
            target_path,
        )
    }

    /// File resource opened through a supplier, `resolved` names its origin
    #[must_use]
    pub fn file_from_supplier(
        supplier: ContentSupplier,
        resolved: impl Into<String>,
        source_path: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        Self::new(
            ContentSource::Supplier(supplier),
            false,
            resolved.into(),
            source_path,
            target_path,
        )
    }

    /// Directory tree rooted at a local path
    #[must_use]
    pub fn directory(
        root: impl Into<PathBuf>,
        source_path: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        let root = root.into();
        let resolved = root.display().to_string();
        let mut resource = Self::new(ContentSource::Path(root), true, resolved, source_path, target_path);
        resource.target_mode = DEFAULT_DIR_MODE;
        resource
    }

    fn new(
        content: ContentSource,
        is_dir: bool,
        resolved: String,
        source_path: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        Self {
            content,
            is_dir,
            resolved,
            source_path: source_path.into(),
            target_path: target_path.into(),
            target_mode: DEFAULT_FILE_MODE,
            target_user: User::default(),
            target_workdir: Workdir::default(),
        }
    }

    /// With target mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.target_mode = mode;
        self
    }

    /// With target user
    #[inline]
    #[must_use]
    pub fn with_user(mut self, user: User) -> Self {
        self.target_user = user;
        self
    }

    /// With target workdir
    #[inline]
    #[must_use]
    pub fn with_workdir(mut self, workdir: Workdir) -> Self {
        self.target_workdir = workdir;
        self
    }

    /// Content source
    #[inline]
    #[must_use]
    pub fn content(&self) -> &ContentSource {
        &self.content
    }

    /// Local root of a directory resource
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        match &self.content {
            ContentSource::Path(path) if self.is_dir => Some(path),
            _ => None,
        }
    }

    /// Check if this is a directory tree
    #[inline]
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Resolved path or URI the contents come from
    #[inline]
    #[must_use]
    pub fn resolved_uri_or_path(&self) -> &str {
        &self.resolved
    }

    /// Source path as the instruction names it
    #[inline]
    #[must_use]
    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// Path to create on the guest
    #[inline]
    #[must_use]
    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    /// Permission bits for the target
    #[inline]
    #[must_use]
    pub fn target_mode(&self) -> u32 {
        self.target_mode
    }

    /// Owner for the target
    #[inline]
    #[must_use]
    pub fn target_user(&self) -> &User {
        &self.target_user
    }

    /// Working directory the target is relative to
    #[inline]
    #[must_use]
    pub fn target_workdir(&self) -> &Workdir {
        &self.target_workdir
    }
}
