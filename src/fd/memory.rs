//! In-memory descriptor backends for deterministic testing.

use super::{closed_error, next_virtual_fd, AccessMode, Descriptor, RawFd};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct FileState {
    data: Vec<u8>,
    pos: u64,
    reads: usize,
    chunk_limit: Option<usize>,
}

/// A seekable in-memory file.
///
/// Cloning yields another view of the same handle (same fd, same closed
/// flag) so tests can keep an inspector while the stream owns the other.
/// [`Descriptor::duplicate`] yields a new handle sharing content and offset,
/// like `dup(2)`.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    state: Arc<Mutex<FileState>>,
    closed: Arc<AtomicBool>,
    fd: RawFd,
    mode: AccessMode,
}

impl MemoryFile {
    /// Creates a memory file holding `data`, positioned at offset 0.
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>, mode: AccessMode) -> Self {
        Self {
            state: Arc::new(Mutex::new(FileState {
                data: data.into(),
                ..FileState::default()
            })),
            closed: Arc::new(AtomicBool::new(false)),
            fd: next_virtual_fd(),
            mode,
        }
    }

    /// Caps every read at `limit` bytes to provoke short fills.
    #[must_use]
    pub fn with_chunk_limit(self, limit: usize) -> Self {
        self.state.lock().chunk_limit = Some(limit.max(1));
        self
    }

    /// Number of read calls that reached this file.
    #[must_use]
    pub fn read_calls(&self) -> usize {
        self.state.lock().reads
    }

    /// Snapshot of the file contents.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }

    /// Appends `bytes` at the end without moving the offset, like another
    /// process writing to the same file.
    pub fn extend(&self, bytes: &[u8]) {
        self.state.lock().data.extend_from_slice(bytes);
    }

    /// Current file offset.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.state.lock().pos
    }

    /// Returns true once this handle was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> io::Result<()> {
        if self.is_closed() {
            Err(closed_error())
        } else {
            Ok(())
        }
    }
}

fn offset_error() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "invalid seek to a negative offset")
}

impl Descriptor for MemoryFile {
    fn fd(&self) -> RawFd {
        self.fd
    }

    fn access_mode(&self) -> io::Result<AccessMode> {
        self.check_open()?;
        Ok(self.mode)
    }

    fn read_nonblocking(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        if !self.mode.can_read() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "not opened for reading",
            ));
        }
        let mut state = self.state.lock();
        state.reads += 1;
        let start = usize::try_from(state.pos).unwrap_or(usize::MAX);
        if start >= state.data.len() {
            return Ok(0);
        }
        let mut n = buf.len().min(state.data.len() - start);
        if let Some(limit) = state.chunk_limit {
            n = n.min(limit);
        }
        buf[..n].copy_from_slice(&state.data[start..start + n]);
        state.pos += n as u64;
        Ok(n)
    }

    fn readable(&self) -> io::Result<bool> {
        self.check_open()?;
        Ok(true)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        if !self.mode.can_write() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "not opened for writing",
            ));
        }
        let mut state = self.state.lock();
        let start = usize::try_from(state.pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset too large"))?;
        let end = start + buf.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[start..end].copy_from_slice(buf);
        state.pos = end as u64;
        Ok(buf.len())
    }

    fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        self.check_open()?;
        let mut state = self.state.lock();
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => state.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => (state.data.len() as u64).checked_add_signed(delta),
        };
        let target = target.ok_or_else(offset_error)?;
        state.pos = target;
        Ok(target)
    }

    fn duplicate(&self) -> io::Result<Arc<dyn Descriptor>> {
        self.check_open()?;
        Ok(Arc::new(Self {
            state: Arc::clone(&self.state),
            closed: Arc::new(AtomicBool::new(false)),
            fd: next_virtual_fd(),
            mode: self.mode,
        }))
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            Err(closed_error())
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
struct PipeState {
    queue: VecDeque<u8>,
    readers: usize,
    writers: usize,
}

/// Creates an in-memory pipe.
///
/// The reader reports `WouldBlock` while the pipe is empty and a writer is
/// still open, and end of data once every writer has closed.
#[must_use]
pub fn pipe() -> (PipeReader, PipeWriter) {
    let state = Arc::new(Mutex::new(PipeState {
        queue: VecDeque::new(),
        readers: 1,
        writers: 1,
    }));
    (
        PipeReader {
            state: Arc::clone(&state),
            closed: AtomicBool::new(false),
            fd: next_virtual_fd(),
        },
        PipeWriter {
            state,
            closed: AtomicBool::new(false),
            fd: next_virtual_fd(),
        },
    )
}

fn illegal_seek() -> io::Error {
    io::Error::other("illegal seek")
}

/// Read end of an in-memory pipe.
#[derive(Debug)]
pub struct PipeReader {
    state: Arc<Mutex<PipeState>>,
    closed: AtomicBool,
    fd: RawFd,
}

/// Write end of an in-memory pipe.
#[derive(Debug)]
pub struct PipeWriter {
    state: Arc<Mutex<PipeState>>,
    closed: AtomicBool,
    fd: RawFd,
}

impl PipeReader {
    fn check_open(&self) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(closed_error())
        } else {
            Ok(())
        }
    }
}

impl PipeWriter {
    fn check_open(&self) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(closed_error())
        } else {
            Ok(())
        }
    }

    /// Writes every byte of `data` into the pipe.
    pub fn write_all(&self, data: &[u8]) -> io::Result<()> {
        Descriptor::write(self, data).map(|_| ())
    }
}

impl Descriptor for PipeReader {
    fn fd(&self) -> RawFd {
        self.fd
    }

    fn access_mode(&self) -> io::Result<AccessMode> {
        self.check_open()?;
        Ok(AccessMode::ReadOnly)
    }

    fn read_nonblocking(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        let mut state = self.state.lock();
        if state.queue.is_empty() {
            return if state.writers > 0 {
                Err(io::ErrorKind::WouldBlock.into())
            } else {
                Ok(0)
            };
        }
        let n = buf.len().min(state.queue.len());
        for (slot, byte) in buf.iter_mut().zip(state.queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn readable(&self) -> io::Result<bool> {
        self.check_open()?;
        let state = self.state.lock();
        Ok(!state.queue.is_empty() || state.writers == 0)
    }

    fn write(&self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "not opened for writing",
        ))
    }

    fn seek(&self, _pos: SeekFrom) -> io::Result<u64> {
        Err(illegal_seek())
    }

    fn duplicate(&self) -> io::Result<Arc<dyn Descriptor>> {
        self.check_open()?;
        self.state.lock().readers += 1;
        Ok(Arc::new(Self {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
            fd: next_virtual_fd(),
        }))
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(closed_error());
        }
        self.state.lock().readers -= 1;
        Ok(())
    }
}

impl Descriptor for PipeWriter {
    fn fd(&self) -> RawFd {
        self.fd
    }

    fn access_mode(&self) -> io::Result<AccessMode> {
        self.check_open()?;
        Ok(AccessMode::WriteOnly)
    }

    fn read_nonblocking(&self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "not opened for reading",
        ))
    }

    fn readable(&self) -> io::Result<bool> {
        Ok(false)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        let mut state = self.state.lock();
        if state.readers == 0 {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        state.queue.extend(buf.iter().copied());
        Ok(buf.len())
    }

    fn seek(&self, _pos: SeekFrom) -> io::Result<u64> {
        Err(illegal_seek())
    }

    fn duplicate(&self) -> io::Result<Arc<dyn Descriptor>> {
        self.check_open()?;
        self.state.lock().writers += 1;
        Ok(Arc::new(Self {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
            fd: next_virtual_fd(),
        }))
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(closed_error());
        }
        self.state.lock().writers -= 1;
        Ok(())
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.state.lock().readers -= 1;
        }
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.state.lock().writers -= 1;
        }
    }
}
