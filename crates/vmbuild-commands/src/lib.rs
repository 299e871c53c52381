//! vmbuild Commands - build instruction catalog
//!
//! Turns batches of self-describing instruction records into typed
//! build instructions:
//! - `User` / `Workdir` ownership attributes shared with resources
//! - `Add`, `Copy`, `Run` instruction variants
//! - Directive registry keyed by the leading keyword of the original text
//! - Batch decoder feeding a FIFO [`InstructionQueue`]
//!
//! # Example
//!
//! ```rust
//! use vmbuild_commands::InstructionDecoder;
//!
//! let records = vec![
//!     r#"{"OriginalCommand":"RUN apk add curl","Command":"apk add curl"}"#.to_string(),
//! ];
//! let mut queue = InstructionDecoder::default().decode_batch(&records).unwrap();
//! let first = queue.next().unwrap();
//! assert_eq!(first.original_command(), "RUN apk add curl");
//! assert!(queue.next().is_none());
//! ```

#![allow(missing_docs)]
#![warn(unreachable_pub)]

pub mod decoder;
pub mod directive;
pub mod error;
pub mod instruction;
pub mod queue;
pub mod types;

pub use decoder::InstructionDecoder;
pub use directive::{directive_token, DecodeFn, Directive, DirectiveRegistry};
pub use error::DecodeError;
pub use instruction::{Add, BuildInstruction, Copy, Run, Shell};
pub use queue::InstructionQueue;
pub use types::{User, Workdir};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with build instructions
    pub use crate::{
        BuildInstruction, DecodeError, Directive, DirectiveRegistry, InstructionDecoder,
        InstructionQueue, User, Workdir,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
