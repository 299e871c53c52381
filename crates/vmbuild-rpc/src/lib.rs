//! vmbuild RPC - build service surface and transports
//!
//! The guest-facing service answers seven calls:
//!
//! | Call                | Reply                         |
//! |---------------------|-------------------------------|
//! | `FetchInstructions` | serialized instruction batch  |
//! | `FetchResource`     | resource frame stream         |
//! | `ReportStdOut`      | ack                           |
//! | `ReportStdErr`      | ack                           |
//! | `ReportAbort`       | ack                           |
//! | `ReportSuccess`     | ack                           |
//! | `Ping`              | ack                           |
//!
//! Implement [`BuildService`] to serve them, pick a transport
//! ([`serve_memory`] or [`serve_tcp`]), and drive it with a
//! [`BuildClient`]. Once a served transport is shut down every call fails
//! with [`RpcError::Unavailable`].

#![warn(unreachable_pub)]

pub mod client;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod service;
pub mod tcp;
pub mod transport;

pub use client::BuildClient;
pub use error::RpcError;
pub use memory::{serve_memory, MemoryTransport, DEFAULT_QUEUE_CAPACITY};
pub use protocol::{Request, Response, DEFAULT_MAX_MESSAGE_SIZE};
pub use service::{dispatch, BuildService, FrameReceiver, Reply};
pub use tcp::{serve_connection, serve_tcp, TcpTransport};
pub use transport::{FrameStream, Transport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for serving and calling the build service
    pub use crate::{BuildClient, BuildService, RpcError, Transport};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
