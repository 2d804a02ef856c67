//! fdstream: buffered, line-aware stream I/O over raw descriptors.
//!
//! # Overview
//!
//! A [`Stream`] wraps a descriptor together with a fixed-capacity buffer and
//! offers sized reads, separator-delimited line reads, partial reads, seeking
//! and writing. All waiting goes through a cooperative [`runtime::Scheduler`]:
//! a stream asks for readiness (optionally with a byte budget) and suspends
//! on a rendezvous channel until the scheduler posts the reply.
//!
//! # Module Structure
//!
//! - [`error`]: Error types
//! - [`config`]: Stream and runtime settings, env and TOML overrides
//! - [`channel`]: Rendezvous channel carrying scheduler replies
//! - [`fd`]: Descriptor abstraction, OS files, in-memory files and pipes
//! - [`runtime`]: Scheduler contract, reference reactor, single-threaded executor
//! - [`io`]: Buffer, stream, line sequences, duplex streams and `select`
//! - [`fs`]: Path-level helpers (`read_path`, `readlines_path`, `foreach`)
//!
//! # Example
//!
//! ```ignore
//! use fdstream::{fs, LocalRuntime};
//!
//! let runtime = LocalRuntime::new();
//! let scheduler = runtime.scheduler();
//! let lines = runtime.block_on(fs::readlines_path(scheduler, "/etc/hosts", "\n"))?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod channel;
pub mod config;
pub mod error;
pub mod fd;
pub mod fs;
pub mod io;
pub mod runtime;
#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;
pub mod tracing_compat;

// Re-exports for convenient access to core types
pub use config::{RuntimeConfig, StreamConfig, DEFAULT_BUFFER_CAPACITY};
pub use error::{Error, ErrorCategory, ErrorKind, Recoverability, Result, ResultExt};
pub use fd::{AccessMode, Descriptor, FileDescriptor, MemoryFile};
pub use io::{Buffer, DuplexStream, Lines, Separator, Stream};
pub use runtime::{LocalRuntime, Notification, Reactor, Scheduler, SchedulerHandle};
