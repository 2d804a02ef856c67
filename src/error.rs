//! Error types and error handling strategy for fdstream.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Buffer bookkeeping never fails; only stream-level operations raise
//! - OS failures are wrapped, never retried inside the core
//! - Errors are classified by recoverability so callers can decide on retries
//!
//! # Error Categories
//!
//! - **Stream**: the stream was closed, or its data ran out
//! - **Argument**: the caller passed a value the operation cannot accept
//! - **System**: the descriptor reported a failure or "no data yet"
//! - **Capability**: a duplex stream lacks the requested direction
//! - **Internal**: the scheduler broke its reply contract

use core::fmt;
use std::io;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Stream ===
    /// Operation on a stream whose descriptor was already released.
    ClosedStream,
    /// End of stream reached by a read variant that raises on EOF.
    EndOfStream,

    // === Argument ===
    /// Negative size, incompatible access mode or malformed separator.
    InvalidArgument,
    /// Offset arithmetic outside the representable range.
    Range,

    // === System ===
    /// The underlying read, write or seek failed.
    Io,
    /// The source had no data available for a non-suspending read.
    WouldBlock,

    // === Capability ===
    /// The duplex stream was not opened for reading.
    NotReadable,
    /// The duplex stream was not opened for writing.
    NotWritable,

    // === Internal ===
    /// The scheduler dropped or mismatched a reply.
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ClosedStream | Self::EndOfStream => ErrorCategory::Stream,
            Self::InvalidArgument | Self::Range => ErrorCategory::Argument,
            Self::Io | Self::WouldBlock => ErrorCategory::System,
            Self::NotReadable | Self::NotWritable => ErrorCategory::Capability,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns the recoverability classification for this error kind.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            Self::WouldBlock => Recoverability::Transient,
            Self::ClosedStream
            | Self::EndOfStream
            | Self::InvalidArgument
            | Self::Range
            | Self::NotReadable
            | Self::NotWritable
            | Self::Internal => Recoverability::Permanent,
            Self::Io => Recoverability::Unknown,
        }
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.recoverability(), Recoverability::Transient)
    }
}

/// Classification of error recoverability for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Permanent failure that will not succeed on retry.
    Permanent,
    /// Depends on the wrapped OS error.
    Unknown,
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Stream lifecycle and end-of-data conditions.
    Stream,
    /// Rejected caller input.
    Argument,
    /// Descriptor-level failures.
    System,
    /// Missing read or write direction.
    Capability,
    /// Contract violations inside the crate.
    Internal,
}

/// The main error type for fdstream operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    os_code: Option<i32>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            os_code: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns true if this error reports end of stream.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self.kind, ErrorKind::EndOfStream)
    }

    /// Returns true if the stream was already closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.kind, ErrorKind::ClosedStream)
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Raw OS error code of the wrapped I/O failure, if the OS supplied one.
    #[must_use]
    pub const fn os_code(&self) -> Option<i32> {
        self.os_code
    }

    /// Creates a closed-stream error.
    #[must_use]
    pub fn closed_stream() -> Self {
        Self::new(ErrorKind::ClosedStream).with_message("closed stream")
    }

    /// Creates an end-of-stream error.
    #[must_use]
    pub fn end_of_stream() -> Self {
        Self::new(ErrorKind::EndOfStream).with_message("end of file reached")
    }

    /// Creates an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument).with_message(detail)
    }

    /// Creates a range error.
    #[must_use]
    pub fn range(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Range).with_message(detail)
    }

    /// Creates an internal error (contract violation).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Wraps an OS-level failure, keeping its raw code.
    ///
    /// `WouldBlock` maps to [`ErrorKind::WouldBlock`]; everything else is
    /// [`ErrorKind::Io`].
    #[must_use]
    pub fn from_io(err: io::Error, operation: &str) -> Self {
        let kind = if err.kind() == io::ErrorKind::WouldBlock {
            ErrorKind::WouldBlock
        } else {
            ErrorKind::Io
        };
        let os_code = err.raw_os_error();
        let mut wrapped = Self::new(kind)
            .with_message(format!("{operation}: {err}"))
            .with_source(err);
        wrapped.os_code = os_code;
        wrapped
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::from_io(err, "i/o")
    }
}

/// Extension trait for adding context to Results.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

/// A specialized Result type for fdstream operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;
