//! Testing utilities for vmbuild workspace
//!
//! Shared test helpers, fixtures, and doubles.

#![allow(missing_docs)]

use async_trait::async_trait;
use futures::FutureExt;
use once_cell::sync::OnceCell;
use rand::Rng;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use vmbuild_core::{start_session, Listen, ServiceConfig, SessionHandle, StopRequester, WorkContext};
use vmbuild_resource::{ContentReader, ContentSupplier, ReconstructedResource};
use vmbuild_rpc::{BuildClient, Transport};

static TRACING: OnceCell<()> = OnceCell::new();

/// Install a test subscriber once, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Random alphanumeric content of `len` bytes
pub fn large_content(len: usize) -> Vec<u8> {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(len)
        .collect()
}

/// Write `contents` to `path`, creating parent directories
pub fn put_test_resource(path: impl AsRef<Path>, contents: &[u8]) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

/// Supplier serving a copy of `contents` each time it is opened
pub fn bytes_supplier(contents: Vec<u8>) -> ContentSupplier {
    let contents = Arc::new(contents);
    Arc::new(move || {
        let contents = Arc::clone(&contents);
        async move { Ok::<ContentReader, std::io::Error>(Box::new(Cursor::new(contents.to_vec()))) }.boxed()
    })
}

/// Config used by test sessions
pub fn test_config() -> ServiceConfig {
    ServiceConfig::new()
        .with_server_name("test-build-server")
        .with_bind_host_port("127.0.0.1:0")
}

/// Start a TCP session serving `context`
pub async fn start_test_session(context: WorkContext) -> anyhow::Result<SessionHandle> {
    init_tracing();
    Ok(start_session(test_config(), context, Listen::Tcp).await?)
}

/// Fetch every resource under `path`, failing on the first error
pub async fn collect_resources<T: Transport>(
    client: &BuildClient<T>,
    path: &str,
) -> anyhow::Result<Vec<ReconstructedResource>> {
    let stream = client.resource(path).await?;
    let mut resources = Vec::new();
    for result in stream.collect_all().await {
        resources.push(result?);
    }
    Ok(resources)
}

/// Stop requester that counts dispatches and reports stopped
#[derive(Debug)]
pub struct CountingStopper {
    calls: AtomicUsize,
    stopped: watch::Sender<bool>,
}

impl CountingStopper {
    /// Create stopper and the `stopped` receiver it drives
    pub fn new() -> (Arc<Self>, watch::Receiver<bool>) {
        let (stopped, rx) = watch::channel(false);
        let stopper = Arc::new(Self {
            calls: AtomicUsize::new(0),
            stopped,
        });
        (stopper, rx)
    }

    /// Stop requests seen so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Report stopped without a request, as an external stop would
    pub fn stop_externally(&self) {
        self.stopped.send_replace(true);
    }
}

#[async_trait]
impl StopRequester for CountingStopper {
    async fn request_stop(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.stopped.send_replace(true);
    }
}
