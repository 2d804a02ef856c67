//! Fixed-capacity byte buffer between a descriptor and the stream layer.
//!
//! Valid bytes always occupy `[0, len)`. Consuming from the front compacts
//! the remainder back to index 0, so pattern matches always see the unread
//! data as one contiguous slice.

use super::separator::Terminator;
use crate::error::{Error, Result};
use crate::fd::Descriptor;
use crate::runtime::scheduler::{self, Notification, Scheduler};
use crate::tracing_compat::trace;
use std::fmt;
use std::sync::Arc;

/// Owned storage of exactly `capacity` bytes plus a fill mark.
pub struct Buffer {
    data: Box<[u8]>,
    used: usize,
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity())
            .field("used", &self.used)
            .finish()
    }
}

impl Buffer {
    /// Creates an empty buffer holding at most `capacity` bytes.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)].into_boxed_slice(),
            used: 0,
        }
    }

    /// Total number of bytes the buffer can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.used
    }

    /// Free space in bytes.
    #[must_use]
    pub fn unused(&self) -> usize {
        self.capacity() - self.used
    }

    /// Returns true if no free space remains.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.used == self.capacity()
    }

    /// Returns true if no valid bytes are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Forgets every valid byte without zeroing storage.
    pub fn reset(&mut self) {
        self.used = 0;
    }

    /// The valid bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.used]
    }

    /// Removes and returns the first `min(count, len)` bytes.
    pub fn consume_front(&mut self, count: usize) -> Vec<u8> {
        let count = count.min(self.used);
        let front = self.data[..count].to_vec();
        self.data.copy_within(count..self.used, 0);
        self.used -= count;
        front
    }

    /// Removes and returns every valid byte.
    pub fn drain_all(&mut self) -> Vec<u8> {
        let all = self.data[..self.used].to_vec();
        self.used = 0;
        all
    }

    /// Appends bytes that fit; returns how many were taken.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.unused());
        self.data[self.used..self.used + n].copy_from_slice(&bytes[..n]);
        self.used += n;
        n
    }

    /// Consumes up to the end of the first terminator match.
    ///
    /// Returns `None` without touching the buffer when nothing matches.
    pub fn match_terminator(&mut self, terminator: &Terminator) -> Option<Vec<u8>> {
        let end = terminator.find_end(self.as_slice())?;
        Some(self.consume_front(end))
    }

    /// Requests up to [`unused`](Self::unused) bytes from `source` and waits
    /// for the scheduler's reply.
    ///
    /// Returns `Some(count)` on data (short fills are normal), `None` when the
    /// source is exhausted. A full buffer returns `Some(0)` without a
    /// registration.
    pub async fn fill_from(
        &mut self,
        scheduler: &dyn Scheduler,
        source: &Arc<dyn Descriptor>,
    ) -> Result<Option<usize>> {
        let want = self.unused();
        if want == 0 {
            return Ok(Some(0));
        }
        match scheduler::wait_for(scheduler, source, Some(want)).await? {
            Notification::Data(bytes) => {
                let n = self.append(&bytes);
                trace!(fd = source.fd(), bytes = n, used = self.used, "buffer filled");
                Ok(Some(n))
            }
            Notification::Exhausted => {
                trace!(fd = source.fd(), "buffer fill hit end of data");
                Ok(None)
            }
            Notification::Failed(err) => Err(Error::from_io(
                err,
                "error occurred while filling buffer",
            )),
            other => Err(scheduler::unexpected(&other)),
        }
    }
}
