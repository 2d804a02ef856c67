//! Buffered, line-aware stream over a descriptor.
//!
//! A [`Stream`] owns one descriptor and one [`Buffer`]. Read operations are
//! served from buffered bytes first; only when those run short does the
//! buffer request a refill through the scheduler and suspend until the reply
//! arrives.
//!
//! # End of stream
//!
//! `eof` latches the first time a fill reports exhaustion. Once it is set and
//! the buffer is empty, every read variant reports end of stream: the
//! `Option`-returning ones with `None`, the raising ones (`readline`,
//! `readchar`, `readpartial`, `sysread`, `read_nonblock`) with
//! [`ErrorKind::EndOfStream`](crate::error::ErrorKind::EndOfStream). Only a
//! seek or rewind clears the latch.
//!
//! # Example
//!
//! ```ignore
//! let mut stream = Stream::open(descriptor, None, scheduler)?;
//! while let Some(line) = stream.gets("\n").await? {
//!     handle(line);
//! }
//! ```

use super::buffer::Buffer;
use super::lines::Lines;
use super::separator::{Separator, Terminator, PARAGRAPH_TERMINATOR};
use crate::config::StreamConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::fd::{AccessMode, Descriptor, RawFd, CLOSED_FD};
use crate::runtime::scheduler::{self, Notification, SchedulerHandle};
use crate::tracing_compat::{debug, trace};
use std::fmt;
use std::io::{self, SeekFrom};
use std::sync::Arc;

/// Buffered stream over a descriptor.
pub struct Stream {
    descriptor: Option<Arc<dyn Descriptor>>,
    mode: AccessMode,
    buffer: Buffer,
    eof: bool,
    line_count: u64,
    scheduler: SchedulerHandle,
    config: StreamConfig,
    terminator: Option<Terminator>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("fd", &self.raw_fd())
            .field("mode", &self.mode)
            .field("buffer", &self.buffer)
            .field("eof", &self.eof)
            .field("line_count", &self.line_count)
            .finish_non_exhaustive()
    }
}

fn byte_count(size: i64) -> Result<usize> {
    if size < 0 {
        return Err(Error::invalid_argument(format!(
            "negative length {size} given"
        )));
    }
    usize::try_from(size).map_err(|_| Error::range(format!("length {size} too large")))
}

impl Stream {
    /// Opens a stream with the default [`StreamConfig`].
    ///
    /// `mode` is the access mode the caller intends to use; it must be
    /// compatible with the descriptor's own mode. `None` adopts the
    /// descriptor's mode.
    pub fn open(
        descriptor: Arc<dyn Descriptor>,
        mode: Option<AccessMode>,
        scheduler: SchedulerHandle,
    ) -> Result<Self> {
        Self::open_with_config(descriptor, mode, scheduler, StreamConfig::default())
    }

    /// Opens a stream with an explicit configuration.
    pub fn open_with_config(
        descriptor: Arc<dyn Descriptor>,
        mode: Option<AccessMode>,
        scheduler: SchedulerHandle,
        config: StreamConfig,
    ) -> Result<Self> {
        let fd = descriptor.fd();
        if fd < 0 {
            return Err(Error::new(ErrorKind::Io).with_message(format!("invalid descriptor {fd}")));
        }
        let current = descriptor
            .access_mode()
            .map_err(|e| Error::from_io(e, "query access mode"))?;
        if let Some(requested) = mode {
            if !current.permits(requested) {
                return Err(Error::invalid_argument(format!(
                    "access mode {requested:?} incompatible with descriptor mode {current:?}"
                )));
            }
        }
        let mode = mode.unwrap_or(current);
        let config = config.normalize();
        debug!(fd, ?mode, capacity = config.buffer_capacity, "stream opened");
        Ok(Self {
            descriptor: Some(descriptor),
            mode,
            buffer: Buffer::new(config.buffer_capacity),
            eof: false,
            line_count: 0,
            scheduler,
            config,
            terminator: None,
        })
    }

    fn source(&self) -> Result<Arc<dyn Descriptor>> {
        self.descriptor
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(Error::closed_stream)
    }

    fn ensure_open(&self) -> Result<()> {
        self.source().map(|_| ())
    }

    /// Fills the buffer once, latching `eof` on exhaustion.
    async fn fill(&mut self) -> Result<Option<usize>> {
        let source = self.source()?;
        let filled = self
            .buffer
            .fill_from(self.scheduler.as_ref(), &source)
            .await?;
        if filled.is_none() && !self.eof {
            self.eof = true;
            debug!(fd = source.fd(), "end of stream latched");
        }
        Ok(filled)
    }

    fn at_end(&self) -> bool {
        self.eof && self.buffer.is_empty()
    }

    // === Reading ===

    /// Reads `size` bytes, or everything that remains when `size` is `None`.
    ///
    /// Returns `None` at end of stream. A positive `size` loops until that
    /// many bytes arrived or the source is exhausted, so the result is only
    /// short at end of data. `Some(0)` never touches the scheduler while
    /// bytes are buffered.
    pub async fn read(&mut self, size: Option<i64>) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        let Some(size) = size else {
            return self.read_all().await;
        };
        let need = byte_count(size)?;
        if self.at_end() {
            return Ok(None);
        }
        if need > 0 && self.buffer.len() >= need {
            return Ok(Some(self.buffer.consume_front(need)));
        }
        if need == 0 && !self.buffer.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let mut out = Vec::with_capacity(need.min(self.buffer.capacity()));
        let mut remaining = need;
        loop {
            let filled = self.fill().await?;
            let done = filled.is_none() || self.buffer.len() >= remaining;
            if done || self.buffer.is_full() {
                let chunk = self.buffer.consume_front(remaining);
                remaining -= chunk.len();
                out.extend_from_slice(&chunk);
            }
            if done || remaining == 0 {
                break;
            }
        }
        trace!(requested = need, returned = out.len(), "read complete");
        if need > 0 && out.is_empty() {
            return Ok(None);
        }
        Ok(Some(out))
    }

    async fn read_all(&mut self) -> Result<Option<Vec<u8>>> {
        if self.at_end() {
            return Ok(None);
        }
        let mut out = Vec::new();
        loop {
            let filled = self.fill().await?;
            if filled.is_none() || self.buffer.is_full() {
                out.extend_from_slice(&self.buffer.drain_all());
            }
            if filled.is_none() {
                break;
            }
        }
        Ok(Some(out))
    }

    /// Reads the next line ending in `separator`.
    ///
    /// Increments the line counter on every call. Returns `None` at end of
    /// stream; a final line without separator is returned as is.
    pub async fn gets(&mut self, separator: impl Into<Separator>) -> Result<Option<Vec<u8>>> {
        let separator = separator.into();
        self.ensure_open()?;
        self.line_count += 1;
        self.next_line(&separator).await
    }

    /// [`gets`](Self::gets) with the configured line separator.
    pub async fn gets_line(&mut self) -> Result<Option<Vec<u8>>> {
        let separator = self.default_separator();
        self.gets(separator).await
    }

    /// Like [`gets`](Self::gets) but end of stream is an error.
    pub async fn readline(&mut self, separator: impl Into<Separator>) -> Result<Vec<u8>> {
        self.gets(separator)
            .await?
            .ok_or_else(Error::end_of_stream)
    }

    /// [`readline`](Self::readline) with the configured line separator.
    pub async fn readline_default(&mut self) -> Result<Vec<u8>> {
        let separator = self.default_separator();
        self.readline(separator).await
    }

    /// Collects every remaining line.
    pub async fn readlines(&mut self, separator: impl Into<Separator>) -> Result<Vec<Vec<u8>>> {
        let separator = separator.into();
        let mut lines = Vec::new();
        while let Some(line) = self.gets(separator.clone()).await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Lazily yields lines; does not advance the line counter.
    pub fn lines(&mut self, separator: impl Into<Separator>) -> Lines<'_> {
        Lines::new(self, separator.into())
    }

    /// Calls `f` with every remaining line.
    pub async fn each_line<F>(&mut self, separator: impl Into<Separator>, mut f: F) -> Result<()>
    where
        F: FnMut(Vec<u8>),
    {
        let separator = separator.into();
        while let Some(line) = self.next_line(&separator).await? {
            f(line);
        }
        Ok(())
    }

    /// Calls `f` with every remaining byte.
    pub async fn each_byte<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(u8),
    {
        while let Some(byte) = self.getc().await? {
            f(byte);
        }
        Ok(())
    }

    /// Reads one byte, `None` at end of stream.
    pub async fn getc(&mut self) -> Result<Option<u8>> {
        Ok(self
            .read(Some(1))
            .await?
            .and_then(|bytes| bytes.first().copied()))
    }

    /// Reads one byte; end of stream is an error.
    pub async fn readchar(&mut self) -> Result<u8> {
        self.getc().await?.ok_or_else(Error::end_of_stream)
    }

    /// Reads at most `size` bytes with a single source read.
    ///
    /// Buffered bytes are served first; any shortfall is requested with one
    /// direct read that bypasses the buffer. Fails with `EndOfStream` only
    /// when nothing at all could be returned.
    pub async fn readpartial(&mut self, size: i64) -> Result<Vec<u8>> {
        let size = byte_count(size)?;
        let source = self.source()?;
        if self.at_end() {
            return Err(Error::end_of_stream());
        }
        let mut out = self.buffer.consume_front(size);
        let short = size - out.len();
        if short == 0 {
            return Ok(out);
        }
        match scheduler::read_once(self.scheduler.as_ref(), &source, short).await? {
            Some(bytes) => out.extend_from_slice(&bytes),
            None => {
                if !self.eof {
                    self.eof = true;
                    debug!(fd = source.fd(), "end of stream latched");
                }
                if out.is_empty() {
                    return Err(Error::end_of_stream());
                }
            }
        }
        Ok(out)
    }

    /// One direct read through the scheduler, ignoring the buffer.
    pub async fn sysread(&mut self, size: i64) -> Result<Vec<u8>> {
        let size = byte_count(size)?;
        let source = self.source()?;
        if self.at_end() {
            return Err(Error::end_of_stream());
        }
        if size == 0 {
            return Ok(Vec::new());
        }
        scheduler::read_once(self.scheduler.as_ref(), &source, size)
            .await?
            .ok_or_else(Error::end_of_stream)
    }

    /// Reads without suspending.
    ///
    /// Serves buffered bytes if any; otherwise performs one raw read.
    /// "No data yet" surfaces as [`ErrorKind::WouldBlock`].
    pub fn read_nonblock(&mut self, size: i64) -> Result<Vec<u8>> {
        let size = byte_count(size)?;
        let source = self.source()?;
        if !self.buffer.is_empty() {
            return Ok(self.buffer.consume_front(size));
        }
        if self.eof {
            return Err(Error::end_of_stream());
        }
        if size == 0 {
            return Ok(Vec::new());
        }
        let mut bytes = vec![0u8; size];
        match source.read_nonblocking(&mut bytes) {
            Ok(0) => Err(Error::end_of_stream()),
            Ok(n) => {
                bytes.truncate(n);
                Ok(bytes)
            }
            Err(e) => Err(Error::from_io(e, "read_nonblock")),
        }
    }

    /// Returns true if no more data can be read.
    ///
    /// May suspend to probe the source. Buffers what it reads, so calling it
    /// repeatedly consumes nothing.
    pub async fn is_eof(&mut self) -> Result<bool> {
        self.read(Some(0)).await?;
        Ok(self.at_end())
    }

    /// Suspends until the descriptor is readable.
    pub async fn wait_readable(&mut self) -> Result<()> {
        let source = self.source()?;
        if !self.buffer.is_empty() {
            return Ok(());
        }
        match scheduler::wait_for(self.scheduler.as_ref(), &source, None).await? {
            Notification::Readable(_) => Ok(()),
            Notification::Failed(err) => Err(Error::from_io(err, "wait_readable")),
            other => Err(scheduler::unexpected(&other)),
        }
    }

    /// Line reading shared by `gets`, `each_line` and [`Lines`].
    pub(crate) async fn next_line(&mut self, separator: &Separator) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        if self.at_end() {
            return Ok(None);
        }
        match separator {
            Separator::All => self.read_all().await,
            Separator::Paragraph => self.next_paragraph().await,
            Separator::Literal(bytes) => {
                let terminator = self.terminator_for(bytes)?;
                self.read_terminated(&terminator).await
            }
        }
    }

    fn terminator_for(&mut self, bytes: &[u8]) -> Result<Terminator> {
        if let Some(cached) = &self.terminator {
            if cached.bytes() == bytes {
                return Ok(cached.clone());
            }
        }
        let terminator = Terminator::new(bytes)?;
        self.terminator = Some(terminator.clone());
        Ok(terminator)
    }

    fn strip_leading_newlines(&mut self) {
        let run = self
            .buffer
            .as_slice()
            .iter()
            .take_while(|&&b| b == b'\n')
            .count();
        self.buffer.consume_front(run);
    }

    async fn next_paragraph(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if self.buffer.is_empty() && self.fill().await?.is_none() {
                return Ok(None);
            }
            self.strip_leading_newlines();
            if !self.buffer.is_empty() {
                break;
            }
        }
        let terminator = self.terminator_for(PARAGRAPH_TERMINATOR)?;
        let paragraph = self.read_terminated(&terminator).await?;
        self.strip_leading_newlines();
        Ok(paragraph)
    }

    async fn read_terminated(&mut self, terminator: &Terminator) -> Result<Option<Vec<u8>>> {
        if terminator.len() > self.buffer.capacity() {
            return self.read_spanning(terminator).await;
        }
        if let Some(line) = self.buffer.match_terminator(terminator) {
            return Ok(Some(line));
        }
        if self.fill().await?.is_none() && self.buffer.is_empty() {
            return Ok(None);
        }

        let mut output: Option<Vec<u8>> = None;
        loop {
            if let Some(line) = self.buffer.match_terminator(terminator) {
                return Ok(Some(match output {
                    Some(mut acc) => {
                        acc.extend_from_slice(&line);
                        acc
                    }
                    None => line,
                }));
            }

            if self.buffer.is_full() {
                // Keep a possible separator prefix buffered.
                let keep = (terminator.len() - 1).min(self.buffer.len() - 1);
                let chunk = self.buffer.consume_front(self.buffer.len() - keep);
                trace!(bytes = chunk.len(), "long line spilled from full buffer");
                output.get_or_insert_with(Vec::new).extend_from_slice(&chunk);
            }

            if self.fill().await?.is_none() {
                let rest = (!self.buffer.is_empty()).then(|| self.buffer.drain_all());
                return Ok(match (output, rest) {
                    (Some(mut acc), Some(rest)) => {
                        acc.extend_from_slice(&rest);
                        Some(acc)
                    }
                    (acc, rest) => acc.or(rest),
                });
            }
        }
    }

    /// Line reading for separators that cannot fit in the buffer.
    ///
    /// Every fill is drained into the accumulated line and the search runs
    /// over the accumulation instead. Bytes past the match all come from the
    /// last fill, so they always fit back into the emptied buffer.
    async fn read_spanning(&mut self, terminator: &Terminator) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        loop {
            let exhausted = self.fill().await?.is_none();
            let scanned = line.len().saturating_sub(terminator.len() - 1);
            line.extend_from_slice(&self.buffer.drain_all());
            if let Some(end) = terminator.find_end(&line[scanned..]) {
                let rest = line.split_off(scanned + end);
                self.buffer.append(&rest);
                trace!(bytes = line.len(), "separator matched across fills");
                return Ok(Some(line));
            }
            if exhausted {
                return Ok((!line.is_empty()).then_some(line));
            }
        }
    }

    fn default_separator(&self) -> Separator {
        Separator::literal(self.config.line_separator.clone())
    }

    // === Writing ===

    /// Writes all of `data`, returning the byte count.
    ///
    /// Buffered read-ahead is un-read first so the write lands at the
    /// logical position.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let source = self.source()?;
        if !self.buffer.is_empty() {
            self.seek(SeekFrom::Current(0))?;
        }
        if data.is_empty() {
            return Ok(0);
        }
        let mut written = 0;
        while written < data.len() {
            match source.write(&data[written..]) {
                Ok(0) => {
                    return Err(Error::from_io(io::ErrorKind::WriteZero.into(), "write"));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::from_io(e, "write")),
            }
        }
        trace!(fd = source.fd(), bytes = written, "write complete");
        Ok(written)
    }

    /// Same as [`write`](Self::write).
    pub fn syswrite(&mut self, data: &[u8]) -> Result<usize> {
        self.write(data)
    }

    /// Same as [`write`](Self::write); descriptor writes never suspend.
    pub fn write_nonblock(&mut self, data: &[u8]) -> Result<usize> {
        self.write(data)
    }

    /// Writes `data` and returns the stream for chaining.
    pub fn append(&mut self, data: impl AsRef<[u8]>) -> Result<&mut Self> {
        self.write(data.as_ref())?;
        Ok(self)
    }

    /// Writes are unbuffered, so this only checks the stream is open.
    pub fn flush(&mut self) -> Result<&mut Self> {
        self.ensure_open()?;
        Ok(self)
    }

    /// Flushes the descriptor to durable storage.
    pub fn fsync(&mut self) -> Result<()> {
        self.source()?
            .sync()
            .map_err(|e| Error::from_io(e, "fsync"))
    }

    // === Positioning ===

    /// Repositions the stream, returning the new absolute offset.
    ///
    /// Buffered bytes are un-read first, the buffer is emptied and the end
    /// of stream latch cleared.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let source = self.source()?;
        if !self.buffer.is_empty() {
            let back = i64::try_from(self.buffer.len())
                .map_err(|_| Error::range("buffered byte count out of range"))?;
            source
                .seek(SeekFrom::Current(-back))
                .map_err(|e| Error::from_io(e, "seek"))?;
            self.buffer.reset();
        }
        self.eof = false;
        let offset = source.seek(pos).map_err(|e| Error::from_io(e, "seek"))?;
        debug!(fd = source.fd(), offset, "stream repositioned");
        Ok(offset)
    }

    /// Logical read position.
    pub fn pos(&mut self) -> Result<u64> {
        self.seek(SeekFrom::Current(0))
    }

    /// Moves to an absolute offset.
    pub fn set_pos(&mut self, offset: u64) -> Result<u64> {
        self.seek(SeekFrom::Start(offset))
    }

    /// Moves to the start and resets the line counter.
    pub fn rewind(&mut self) -> Result<u64> {
        self.seek(SeekFrom::Start(0))?;
        self.line_count = 0;
        self.eof = false;
        Ok(0)
    }

    /// Raw reposition that leaves the buffer alone.
    pub fn sysseek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.source()?
            .seek(pos)
            .map_err(|e| Error::from_io(e, "sysseek"))
    }

    // === State ===

    /// The descriptor number.
    pub fn fileno(&self) -> Result<RawFd> {
        Ok(self.source()?.fd())
    }

    /// Descriptor number, or [`CLOSED_FD`] once closed.
    #[must_use]
    pub fn raw_fd(&self) -> RawFd {
        self.descriptor.as_ref().map_or(CLOSED_FD, |d| d.fd())
    }

    /// Number of `gets`-style calls since open or the last rewind.
    pub fn lineno(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.line_count)
    }

    /// Overrides the line counter.
    pub fn set_lineno(&mut self, line: u64) -> Result<()> {
        self.ensure_open()?;
        self.line_count = line;
        Ok(())
    }

    /// The effective access mode.
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// The configuration this stream was opened with.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// The scheduler this stream suspends through.
    #[must_use]
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// The descriptor, if still open.
    #[must_use]
    pub fn descriptor(&self) -> Option<&Arc<dyn Descriptor>> {
        self.descriptor.as_ref()
    }

    /// Number of read-ahead bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true once the descriptor was released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.descriptor.is_none()
    }

    /// Releases the descriptor. A second close fails with `ClosedStream`.
    pub fn close(&mut self) -> Result<()> {
        let source = self.descriptor.take().ok_or_else(Error::closed_stream)?;
        self.buffer.reset();
        debug!(fd = source.fd(), "stream closed");
        source.close().map_err(|e| Error::from_io(e, "close"))
    }

    /// Opens a second stream on a duplicate of the descriptor.
    ///
    /// The clone has its own empty buffer and copies the line counter and
    /// configuration.
    pub fn try_clone(&self) -> Result<Self> {
        let source = self.source()?;
        let duplicate = source
            .duplicate()
            .map_err(|e| Error::from_io(e, "duplicate descriptor"))?;
        debug!(fd = source.fd(), dup = duplicate.fd(), "stream duplicated");
        Ok(Self {
            descriptor: Some(duplicate),
            mode: self.mode,
            buffer: Buffer::new(self.buffer.capacity()),
            eof: false,
            line_count: self.line_count,
            scheduler: Arc::clone(&self.scheduler),
            config: self.config.clone(),
            terminator: self.terminator.clone(),
        })
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Some(source) = self.descriptor.take() {
            let _ = source.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fd::{pipe, MemoryFile};
    use crate::runtime::{yield_now, LocalRuntime};
    use crate::test_utils::{memory_stream, run_test};

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn gets_splits_on_literal_separator() {
        init_test("gets_splits_on_literal_separator");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"a;b;c", 16);
            assert_eq!(stream.gets(";").await.expect("gets"), Some(b"a;".to_vec()));
            assert_eq!(stream.gets(";").await.expect("gets"), Some(b"b;".to_vec()));
            assert_eq!(stream.gets(";").await.expect("gets"), Some(b"c".to_vec()));
            assert_eq!(stream.gets(";").await.expect("gets"), None);
            assert_eq!(stream.lineno().expect("lineno"), 4);
        });
        crate::test_complete!("gets_splits_on_literal_separator");
    }

    #[test]
    fn paragraph_mode() {
        init_test("paragraph_mode");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"\n\nfoo\nbar\n\n\nbaz", 64);
            let first = stream.gets("").await.expect("gets");
            assert_eq!(first.as_deref(), Some(&b"foo\nbar\n\n"[..]));
            let second = stream.gets("").await.expect("gets");
            assert_eq!(second.as_deref(), Some(&b"baz"[..]));
            assert_eq!(stream.gets("").await.expect("gets"), None);
        });
        crate::test_complete!("paragraph_mode");
    }

    #[test]
    fn paragraph_mode_strips_newlines_across_refills() {
        init_test("paragraph_mode_strips_newlines_across_refills");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"\n\n\n\n\n\npara\n\n", 2);
            let para = stream.gets(Separator::Paragraph).await.expect("gets");
            assert_eq!(para.as_deref(), Some(&b"para\n\n"[..]));
            assert_eq!(stream.gets(Separator::Paragraph).await.expect("gets"), None);
        });
        crate::test_complete!("paragraph_mode_strips_newlines_across_refills");
    }

    #[test]
    fn long_line_exceeding_capacity_is_returned_whole() {
        init_test("long_line_exceeding_capacity_is_returned_whole");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"0123456789\n", 8);
            let line = stream.gets("\n").await.expect("gets");
            assert_eq!(line.as_deref(), Some(&b"0123456789\n"[..]));
            assert!(stream.is_eof().await.expect("eof"));
        });
        crate::test_complete!("long_line_exceeding_capacity_is_returned_whole");
    }

    #[test]
    fn separator_straddling_spill_point_is_found() {
        init_test("separator_straddling_spill_point_is_found");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"abcdefg\r\nrest", 8);
            let line = stream.gets("\r\n").await.expect("gets");
            assert_eq!(line.as_deref(), Some(&b"abcdefg\r\n"[..]));
            let rest = stream.gets("\r\n").await.expect("gets");
            assert_eq!(rest.as_deref(), Some(&b"rest"[..]));
        });
        crate::test_complete!("separator_straddling_spill_point_is_found");
    }

    #[test]
    fn separator_longer_than_buffer_spans_fills() {
        init_test("separator_longer_than_buffer_spans_fills");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"a<END>b", 4);
            assert_eq!(stream.gets("<END>").await.expect("gets"), Some(b"a<END>".to_vec()));
            assert_eq!(stream.buffered(), 1);
            assert_eq!(stream.gets("<END>").await.expect("gets"), Some(b"b".to_vec()));
            assert_eq!(stream.gets("<END>").await.expect("gets"), None);

            let (mut stream, _) = memory_stream(&handle, b"x<END>y<END>z", 2);
            let lines = stream.readlines("<END>").await.expect("readlines");
            assert_eq!(lines, vec![b"x<END>".to_vec(), b"y<END>".to_vec(), b"z".to_vec()]);

            let (mut stream, _) = memory_stream(&handle, b"no match here", 3);
            let whole = stream.gets("<END>").await.expect("gets");
            assert_eq!(whole.as_deref(), Some(&b"no match here"[..]));
        });
        crate::test_complete!("separator_longer_than_buffer_spans_fills");
    }

    #[test]
    fn paragraph_mode_with_single_byte_buffer() {
        init_test("paragraph_mode_with_single_byte_buffer");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"foo\n\n\nbar\n", 1);
            assert_eq!(stream.gets("").await.expect("gets"), Some(b"foo\n\n".to_vec()));
            assert_eq!(stream.gets("").await.expect("gets"), Some(b"bar\n".to_vec()));
            assert_eq!(stream.gets("").await.expect("gets"), None);
        });
        crate::test_complete!("paragraph_mode_with_single_byte_buffer");
    }

    #[test]
    fn read_zero_and_read_all_at_eof() {
        init_test("read_zero_and_read_all_at_eof");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"data", 16);
            assert_eq!(stream.read(Some(0)).await.expect("read"), Some(Vec::new()));
            assert_eq!(stream.read(None).await.expect("read"), Some(b"data".to_vec()));
            assert_eq!(stream.read(None).await.expect("read"), None);
            assert_eq!(stream.read(Some(4)).await.expect("read"), None);
        });
        crate::test_complete!("read_zero_and_read_all_at_eof");
    }

    #[test]
    fn read_fast_path_skips_scheduler() {
        init_test("read_fast_path_skips_scheduler");
        run_test(|handle| async move {
            let (mut stream, file) = memory_stream(&handle, b"abcdefgh", 16);
            assert_eq!(stream.read(Some(2)).await.expect("read"), Some(b"ab".to_vec()));
            let calls = file.read_calls();
            assert_eq!(stream.read(Some(3)).await.expect("read"), Some(b"cde".to_vec()));
            assert_eq!(stream.read(Some(0)).await.expect("read"), Some(Vec::new()));
            assert_eq!(file.read_calls(), calls);
        });
        crate::test_complete!("read_fast_path_skips_scheduler");
    }

    #[test]
    fn read_larger_than_capacity_with_short_fills() {
        init_test("read_larger_than_capacity_with_short_fills");
        run_test(|handle| async move {
            let file = MemoryFile::new(b"0123456789abcdef".to_vec(), AccessMode::ReadOnly)
                .with_chunk_limit(3);
            let mut stream = Stream::open_with_config(
                Arc::new(file),
                None,
                handle.scheduler(),
                StreamConfig::default().buffer_capacity(4),
            )
            .expect("open");
            let got = stream.read(Some(10)).await.expect("read");
            assert_eq!(got.as_deref(), Some(&b"0123456789"[..]));
            let rest = stream.read(Some(100)).await.expect("read");
            assert_eq!(rest.as_deref(), Some(&b"abcdef"[..]));
        });
        crate::test_complete!("read_larger_than_capacity_with_short_fills");
    }

    #[test]
    fn negative_sizes_are_rejected() {
        init_test("negative_sizes_are_rejected");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"x", 4);
            let err = stream.read(Some(-1)).await.expect_err("negative");
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            let err = stream.readpartial(-5).await.expect_err("negative");
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            let err = stream.sysread(-1).await.expect_err("negative");
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        });
        crate::test_complete!("negative_sizes_are_rejected");
    }

    #[test]
    fn readpartial_from_buffer_does_not_poll() {
        init_test("readpartial_from_buffer_does_not_poll");
        run_test(|handle| async move {
            let (mut stream, file) = memory_stream(&handle, b"hello world", 32);
            assert_eq!(stream.getc().await.expect("getc"), Some(b'h'));
            let calls = file.read_calls();
            let got = stream.readpartial(4).await.expect("readpartial");
            assert_eq!(got, b"ello");
            assert_eq!(file.read_calls(), calls);
            assert!(stream.readpartial(0).await.expect("zero").is_empty());
        });
        crate::test_complete!("readpartial_from_buffer_does_not_poll");
    }

    #[test]
    fn readpartial_tops_up_with_one_direct_read() {
        init_test("readpartial_tops_up_with_one_direct_read");
        run_test(|handle| async move {
            let file = MemoryFile::new(b"abcdefghij".to_vec(), AccessMode::ReadOnly)
                .with_chunk_limit(2);
            let mut stream = Stream::open_with_config(
                Arc::new(file.clone()),
                None,
                handle.scheduler(),
                StreamConfig::default().buffer_capacity(16),
            )
            .expect("open");
            assert_eq!(stream.getc().await.expect("getc"), Some(b'a'));
            let calls = file.read_calls();
            let got = stream.readpartial(8).await.expect("readpartial");
            assert_eq!(got, b"bcd");
            assert_eq!(file.read_calls(), calls + 1);
        });
        crate::test_complete!("readpartial_tops_up_with_one_direct_read");
    }

    #[test]
    fn readpartial_at_end_raises() {
        init_test("readpartial_at_end_raises");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"", 4);
            let err = stream.readpartial(4).await.expect_err("eof");
            assert!(err.is_eof());
        });
        crate::test_complete!("readpartial_at_end_raises");
    }

    #[test]
    fn direct_reads_honor_end_of_stream_latch() {
        init_test("direct_reads_honor_end_of_stream_latch");
        run_test(|handle| async move {
            let (mut stream, file) = memory_stream(&handle, b"ab", 8);
            assert_eq!(stream.read(None).await.expect("read"), Some(b"ab".to_vec()));
            assert!(stream.is_eof().await.expect("eof"));

            file.extend(b"late");
            assert_eq!(stream.read(Some(4)).await.expect("read"), None);
            assert!(stream.readpartial(4).await.expect_err("latched").is_eof());
            assert!(stream.sysread(4).await.expect_err("latched").is_eof());
            assert!(stream.read_nonblock(4).expect_err("latched").is_eof());
            assert!(stream.is_eof().await.expect("eof"));

            stream.seek(SeekFrom::Current(0)).expect("seek");
            assert_eq!(stream.readpartial(8).await.expect("readpartial"), b"late");
        });
        crate::test_complete!("direct_reads_honor_end_of_stream_latch");
    }

    #[test]
    fn is_eof_is_idempotent() {
        init_test("is_eof_is_idempotent");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"ab", 4);
            assert!(!stream.is_eof().await.expect("eof"));
            assert!(!stream.is_eof().await.expect("eof"));
            assert_eq!(stream.lineno().expect("lineno"), 0);
            assert_eq!(stream.read(None).await.expect("read"), Some(b"ab".to_vec()));
            assert!(stream.is_eof().await.expect("eof"));
            assert!(stream.is_eof().await.expect("eof"));
        });
        crate::test_complete!("is_eof_is_idempotent");
    }

    #[test]
    fn raising_variants_at_end() {
        init_test("raising_variants_at_end");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"z", 4);
            assert_eq!(stream.readchar().await.expect("readchar"), b'z');
            assert!(stream.readchar().await.expect_err("eof").is_eof());
            assert!(stream.readline("\n").await.expect_err("eof").is_eof());
            assert!(stream.sysread(1).await.expect_err("eof").is_eof());
            assert!(stream.read_nonblock(1).expect_err("eof").is_eof());
        });
        crate::test_complete!("raising_variants_at_end");
    }

    #[test]
    fn seek_unreads_buffer_and_clears_eof() {
        init_test("seek_unreads_buffer_and_clears_eof");
        run_test(|handle| async move {
            let (mut stream, file) = memory_stream(&handle, b"line1\nline2\n", 64);
            assert_eq!(stream.gets("\n").await.expect("gets"), Some(b"line1\n".to_vec()));
            assert_eq!(file.position(), 12);
            assert_eq!(stream.pos().expect("pos"), 6);
            assert_eq!(stream.buffered(), 0);

            assert_eq!(stream.read(None).await.expect("read"), Some(b"line2\n".to_vec()));
            assert!(stream.is_eof().await.expect("eof"));
            assert_eq!(stream.seek(SeekFrom::Start(0)).expect("seek"), 0);
            assert!(!stream.is_eof().await.expect("eof"));

            assert_eq!(stream.rewind().expect("rewind"), 0);
            assert_eq!(stream.lineno().expect("lineno"), 0);
            assert_eq!(stream.readline("\n").await.expect("line"), b"line1\n");
        });
        crate::test_complete!("seek_unreads_buffer_and_clears_eof");
    }

    #[test]
    fn sysseek_leaves_buffer() {
        init_test("sysseek_leaves_buffer");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"abcdef", 64);
            stream.getc().await.expect("getc");
            assert_eq!(stream.buffered(), 5);
            assert_eq!(stream.sysseek(SeekFrom::Current(0)).expect("sysseek"), 6);
            assert_eq!(stream.buffered(), 5);
        });
        crate::test_complete!("sysseek_leaves_buffer");
    }

    #[test]
    fn write_then_read_roundtrip() {
        init_test("write_then_read_roundtrip");
        run_test(|handle| async move {
            let (mut stream, file) = memory_stream(&handle, b"", 8);
            assert_eq!(stream.write(b"").expect("empty write"), 0);
            stream
                .append("hello ")
                .and_then(|s| s.append(b"world"))
                .expect("append");
            assert_eq!(file.contents(), b"hello world");
            stream.rewind().expect("rewind");
            assert_eq!(stream.read(Some(5)).await.expect("read"), Some(b"hello".to_vec()));
        });
        crate::test_complete!("write_then_read_roundtrip");
    }

    #[test]
    fn write_lands_at_logical_position() {
        init_test("write_lands_at_logical_position");
        run_test(|handle| async move {
            let (mut stream, file) = memory_stream(&handle, b"abcdef", 64);
            assert_eq!(stream.getc().await.expect("getc"), Some(b'a'));
            stream.write(b"XY").expect("write");
            assert_eq!(file.contents(), b"aXYdef");
        });
        crate::test_complete!("write_lands_at_logical_position");
    }

    #[test]
    fn closed_stream_rejects_everything() {
        init_test("closed_stream_rejects_everything");
        run_test(|handle| async move {
            let (mut stream, file) = memory_stream(&handle, b"abc", 4);
            stream.close().expect("close");
            assert!(file.is_closed());
            assert!(stream.is_closed());
            assert_eq!(stream.raw_fd(), CLOSED_FD);
            assert!(stream.close().expect_err("second close").is_closed());
            assert!(stream.read(None).await.expect_err("closed").is_closed());
            assert!(stream.gets("\n").await.expect_err("closed").is_closed());
            assert!(stream.readpartial(1).await.expect_err("closed").is_closed());
            assert!(stream.write(b"x").expect_err("closed").is_closed());
            assert!(stream.seek(SeekFrom::Start(0)).expect_err("closed").is_closed());
            assert!(stream.fileno().expect_err("closed").is_closed());
            assert!(stream.lineno().expect_err("closed").is_closed());
            assert!(stream.flush().expect_err("closed").is_closed());
            assert!(stream.try_clone().expect_err("closed").is_closed());
        });
        crate::test_complete!("closed_stream_rejects_everything");
    }

    #[test]
    fn drop_closes_descriptor() {
        init_test("drop_closes_descriptor");
        let rt = LocalRuntime::new();
        let (stream, file) = memory_stream(&rt.handle(), b"abc", 4);
        drop(stream);
        assert!(file.is_closed());
        crate::test_complete!("drop_closes_descriptor");
    }

    #[test]
    fn open_validates_descriptor_and_mode() {
        init_test("open_validates_descriptor_and_mode");
        let rt = LocalRuntime::new();
        let read_only = MemoryFile::new(b"abc".to_vec(), AccessMode::ReadOnly);
        let err = Stream::open(
            Arc::new(read_only.clone()),
            Some(AccessMode::WriteOnly),
            rt.scheduler(),
        )
        .expect_err("incompatible");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        read_only.close().expect("close");
        let err = Stream::open(Arc::new(read_only), None, rt.scheduler()).expect_err("closed fd");
        assert_eq!(err.kind(), ErrorKind::Io);

        let rw = MemoryFile::new(b"abc".to_vec(), AccessMode::ReadWrite);
        let stream = Stream::open(Arc::new(rw), Some(AccessMode::ReadOnly), rt.scheduler())
            .expect("open");
        assert_eq!(stream.mode(), AccessMode::ReadOnly);
        assert_eq!(stream.config().buffer_capacity, 8096);
        crate::test_complete!("open_validates_descriptor_and_mode");
    }

    #[test]
    fn try_clone_has_private_buffer() {
        init_test("try_clone_has_private_buffer");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"one\ntwo\n", 64);
            stream.set_lineno(7).expect("set_lineno");
            let mut clone = stream.try_clone().expect("clone");
            assert_ne!(clone.fileno().expect("fd"), stream.fileno().expect("fd"));
            assert_eq!(clone.lineno().expect("lineno"), 7);
            assert_eq!(clone.buffered(), 0);
            clone.rewind().expect("rewind");
            assert_eq!(clone.gets("\n").await.expect("gets"), Some(b"one\n".to_vec()));
            clone.close().expect("close clone");
            assert!(!stream.is_closed());
        });
        crate::test_complete!("try_clone_has_private_buffer");
    }

    #[test]
    fn lines_iteration_does_not_count() {
        init_test("lines_iteration_does_not_count");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"a\nb\nc\n", 4);
            let mut seen = Vec::new();
            {
                let mut lines = stream.lines("\n");
                while let Some(line) = lines.next_line().await.expect("line") {
                    seen.push(line);
                }
            }
            assert_eq!(seen, vec![b"a\n".to_vec(), b"b\n".to_vec(), b"c\n".to_vec()]);
            assert_eq!(stream.lineno().expect("lineno"), 0);

            stream.rewind().expect("rewind");
            let all = stream.readlines("\n").await.expect("readlines");
            assert_eq!(all.len(), 3);
            assert_eq!(stream.lineno().expect("lineno"), 4);
        });
        crate::test_complete!("lines_iteration_does_not_count");
    }

    #[test]
    fn each_line_and_each_byte() {
        init_test("each_line_and_each_byte");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"x;y", 4);
            let mut lines = Vec::new();
            stream.each_line(";", |l| lines.push(l)).await.expect("each_line");
            assert_eq!(lines, vec![b"x;".to_vec(), b"y".to_vec()]);

            stream.rewind().expect("rewind");
            let mut bytes = Vec::new();
            stream.each_byte(|b| bytes.push(b)).await.expect("each_byte");
            assert_eq!(bytes, b"x;y");
        });
        crate::test_complete!("each_line_and_each_byte");
    }

    #[test]
    fn configured_separator_is_used_by_default_forms() {
        init_test("configured_separator_is_used_by_default_forms");
        run_test(|handle| async move {
            let file = MemoryFile::new(b"a|b".to_vec(), AccessMode::ReadOnly);
            let mut stream = Stream::open_with_config(
                Arc::new(file),
                None,
                handle.scheduler(),
                StreamConfig::default().line_separator("|"),
            )
            .expect("open");
            assert_eq!(stream.gets_line().await.expect("gets"), Some(b"a|".to_vec()));
            assert_eq!(stream.readline_default().await.expect("line"), b"b");
            assert!(stream.readline_default().await.expect_err("eof").is_eof());
        });
        crate::test_complete!("configured_separator_is_used_by_default_forms");
    }

    #[test]
    fn read_all_separator_drains() {
        init_test("read_all_separator_drains");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"no\nsplit", 3);
            let all = stream.gets(Separator::All).await.expect("gets");
            assert_eq!(all.as_deref(), Some(&b"no\nsplit"[..]));
            assert_eq!(stream.gets(None::<&str>).await.expect("gets"), None);
        });
        crate::test_complete!("read_all_separator_drains");
    }

    #[test]
    fn pipe_stream_suspends_until_writer_delivers() {
        init_test("pipe_stream_suspends_until_writer_delivers");
        run_test(|handle| async move {
            let (reader, writer) = pipe();
            let mut stream =
                Stream::open(Arc::new(reader), None, handle.scheduler()).expect("open");
            handle.spawn(async move {
                writer.write_all(b"first ").expect("write");
                yield_now().await;
                writer.write_all(b"line\nsecond").expect("write");
            });
            let line = stream.gets("\n").await.expect("gets");
            assert_eq!(line.as_deref(), Some(&b"first line\n"[..]));
            let rest = stream.gets("\n").await.expect("gets");
            assert_eq!(rest.as_deref(), Some(&b"second"[..]));
            assert!(stream.is_eof().await.expect("eof"));
        });
        crate::test_complete!("pipe_stream_suspends_until_writer_delivers");
    }

    #[test]
    fn read_nonblock_reports_would_block() {
        init_test("read_nonblock_reports_would_block");
        run_test(|handle| async move {
            let (reader, writer) = pipe();
            let mut stream =
                Stream::open(Arc::new(reader), None, handle.scheduler()).expect("open");
            let err = stream.read_nonblock(4).expect_err("empty pipe");
            assert_eq!(err.kind(), ErrorKind::WouldBlock);
            writer.write_all(b"ok").expect("write");
            assert_eq!(stream.read_nonblock(4).expect("read"), b"ok");
            drop(writer);
            stream.wait_readable().await.expect("readable at end of data");
        });
        crate::test_complete!("read_nonblock_reports_would_block");
    }
}
