//! vmbuild Core - build server and session orchestration
//!
//! Serves one build's instructions and resources to a guest agent and
//! converges the guest's reports into a single outcome:
//!
//! ```text
//! start_session ──> BuildServer::start ──Err──> Failed (nothing to stop)
//!                          │
//!                          Ok
//!                          v
//!            SessionOrchestrator (one task, owns Session)
//!              stdout / stderr ──> append non-empty lines
//!              abort | success ──> first wins, stop requested once
//!              stopped         ──> loop ends, final snapshot
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use vmbuild_core::prelude::*;
//!
//! let context = WorkContext::new().with_resource(
//!     "etc",
//!     ResolvedResource::directory("/srv/context/etc", "etc", "/etc"),
//! );
//! let session = start_session(ServiceConfig::default(), context, Listen::Tcp).await?;
//! let session = session.finished().await?;
//! println!("{:?}", session.outcome());
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod server;
pub mod service;
pub mod session;

pub use config::ServiceConfig;
pub use context::WorkContext;
pub use error::{ConfigError, ServerError, SessionError};
pub use events::{event_channels, EventSender, EventsClosed, ServerEvents, TerminalSignal};
pub use orchestrator::{start_session, SessionHandle, SessionOrchestrator, StopRequester};
pub use server::{BuildServer, Listen, ServerTransport};
pub use service::RootfsService;
pub use session::{allowed_transitions, validate_transition, Session, SessionOutcome, SessionState};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running build sessions
    pub use crate::{
        start_session, BuildServer, Listen, ServiceConfig, Session, SessionHandle, SessionOutcome,
        SessionState, WorkContext,
    };
    pub use vmbuild_commands::{Add, BuildInstruction, Copy, Run, User, Workdir};
    pub use vmbuild_resource::ResolvedResource;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
