//! vmbuild Resource - chunked resource streaming
//!
//! Delivers files and directory trees as a self-describing frame stream and
//! rebuilds them on the receiving side:
//!
//! ```text
//! ResolvedResource -> ResourceProducer -> frames -> Reassembler -> ReconstructedResource
//!                      (walk + chunk)                (verify + concat)
//! ```
//!
//! Every chunk carries a SHA-256 checksum of its payload. A mismatch fails
//! only the entry it belongs to.
//!
//! # Example
//!
//! ```rust,ignore
//! use vmbuild_resource::{spawn_local_consumer, ResolvedResource, ResourceProducer};
//!
//! let tree = ResolvedResource::directory("/srv/context/etc", "etc", "/etc");
//! let frames = ResourceProducer::new(64 * 1024).spawn(vec![tree]);
//! for result in spawn_local_consumer(frames).collect_all().await {
//!     let resource = result?;
//!     println!("{} ({} bytes)", resource.target_path(), resource.contents().len());
//! }
//! ```

#![warn(unreachable_pub)]

pub mod checksum;
pub mod consumer;
pub mod error;
pub mod frame;
pub mod producer;
pub mod reassembler;
pub mod resolved;

pub use checksum::{Checksum, ChecksumError};
pub use consumer::{spawn_consumer, spawn_local_consumer, ResourceResult, ResourceStream};
pub use error::{ProduceError, ResourceError};
pub use frame::{ResourceChunk, ResourceFrame, ResourceHeader, ResourceId};
pub use producer::{join_relative, ResourceProducer, DEFAULT_CHUNK_SIZE};
pub use reassembler::{Progress, ReconstructedResource, Reassembler};
pub use resolved::{ContentReader, ContentSource, ContentSupplier, ResolvedResource};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with resource streams
    pub use crate::{
        Checksum, ReconstructedResource, ResolvedResource, ResourceError, ResourceFrame,
        ResourceProducer, ResourceStream,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
