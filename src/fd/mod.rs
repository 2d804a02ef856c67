//! Descriptor primitives consumed by streams.
//!
//! A [`Descriptor`] is the OS-level handle a [`Stream`](crate::io::Stream)
//! reads from and writes to. The trait exposes exactly the primitives the
//! buffered layer needs: a non-suspending read, a readiness probe, write,
//! reposition, duplicate, sync and close.
//!
//! Backends:
//!
//! - [`FileDescriptor`]: a `std::fs::File`
//! - [`MemoryFile`]: a seekable in-memory file with read counters
//! - [`pipe`]: an in-memory pipe whose reader reports `WouldBlock` until data
//!   arrives or the writer closes
//!
//! Descriptors use interior mutability so one handle can be shared between a
//! stream and the reactor servicing its registrations.

mod file;
mod memory;

pub use file::FileDescriptor;
pub use memory::{pipe, MemoryFile, PipeReader, PipeWriter};

use std::fmt;
use std::io::{self, SeekFrom};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Integer handle identifying an open descriptor.
pub type RawFd = i32;

/// Handle value reported by a stream once its descriptor is released.
pub const CLOSED_FD: RawFd = -1;

/// Access mode a descriptor was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Reads only.
    ReadOnly,
    /// Writes only.
    WriteOnly,
    /// Reads and writes.
    ReadWrite,
}

impl AccessMode {
    /// Returns true if reads are permitted.
    #[must_use]
    pub const fn can_read(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Returns true if writes are permitted.
    #[must_use]
    pub const fn can_write(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }

    /// Returns true if a descriptor opened with `self` can serve `requested`.
    ///
    /// A read-write descriptor serves any request; otherwise the modes must
    /// be equal.
    #[must_use]
    pub fn permits(self, requested: Self) -> bool {
        self == Self::ReadWrite || self == requested
    }
}

/// OS-level primitives behind a stream.
pub trait Descriptor: Send + Sync + fmt::Debug {
    /// The integer handle of this descriptor.
    fn fd(&self) -> RawFd;

    /// The access mode the descriptor was opened with.
    fn access_mode(&self) -> io::Result<AccessMode>;

    /// Reads without suspending.
    ///
    /// Returns `Ok(0)` at end of data and `ErrorKind::WouldBlock` when no data
    /// is available yet.
    fn read_nonblocking(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Returns true if a read would not block.
    fn readable(&self) -> io::Result<bool>;

    /// Writes some prefix of `buf`, returning how many bytes were taken.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Repositions the descriptor, returning the new absolute offset.
    fn seek(&self, pos: SeekFrom) -> io::Result<u64>;

    /// Returns a new handle sharing the same underlying object.
    fn duplicate(&self) -> io::Result<Arc<dyn Descriptor>>;

    /// Flushes data to durable storage.
    fn sync(&self) -> io::Result<()> {
        Ok(())
    }

    /// Releases the handle.
    fn close(&self) -> io::Result<()>;
}

pub(crate) fn closed_error() -> io::Error {
    io::Error::other("bad file descriptor")
}

pub(crate) fn next_virtual_fd() -> RawFd {
    static NEXT: AtomicI32 = AtomicI32::new(10_000);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
