//! Duplex stream: one read half, one write half.
//!
//! Each operation is tagged with an [`Operation`] and checked against the
//! halves that are present before it is routed. A missing reader fails with
//! [`ErrorKind::NotReadable`], a missing writer with
//! [`ErrorKind::NotWritable`].

use super::separator::Separator;
use super::stream::Stream;
use crate::error::{Error, ErrorKind, Result};
use crate::fd::{pipe, AccessMode};
use crate::runtime::SchedulerHandle;
use crate::tracing_compat::debug;
use std::sync::Arc;

/// Direction an [`Operation`] is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Served by the read half.
    Read,
    /// Served by the write half.
    Write,
}

/// Operations a [`DuplexStream`] routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `each`
    Each,
    /// `each_line`
    EachLine,
    /// `getc`
    Getc,
    /// `gets`
    Gets,
    /// `read`
    Read,
    /// `read_nonblock`
    ReadNonblock,
    /// `readchar`
    Readchar,
    /// `readline`
    Readline,
    /// `readlines`
    Readlines,
    /// `readpartial`
    Readpartial,
    /// `sysread`
    Sysread,
    /// `append`
    Append,
    /// `syswrite`
    Syswrite,
    /// `write`
    Write,
    /// `write_nonblock`
    WriteNonblock,
}

impl Operation {
    /// Operations served by the read half.
    pub const READ: [Self; 11] = [
        Self::Each,
        Self::EachLine,
        Self::Getc,
        Self::Gets,
        Self::Read,
        Self::ReadNonblock,
        Self::Readchar,
        Self::Readline,
        Self::Readlines,
        Self::Readpartial,
        Self::Sysread,
    ];

    /// Operations served by the write half.
    pub const WRITE: [Self; 4] = [Self::Append, Self::Syswrite, Self::Write, Self::WriteNonblock];

    /// Where this operation is routed.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Append | Self::Syswrite | Self::Write | Self::WriteNonblock => Direction::Write,
            _ => Direction::Read,
        }
    }
}

/// A stream pair behaving as one bidirectional stream.
#[derive(Debug)]
pub struct DuplexStream {
    reader: Option<Stream>,
    writer: Option<Stream>,
}

impl DuplexStream {
    /// Pairs the given halves. Either may be absent.
    #[must_use]
    pub fn new(reader: Option<Stream>, writer: Option<Stream>) -> Self {
        Self { reader, writer }
    }

    /// A loopback duplex over an in-memory pipe: bytes written come back out
    /// of the read half.
    pub fn pipe(scheduler: SchedulerHandle) -> Result<Self> {
        let (read_end, write_end) = pipe();
        let reader = Stream::open(
            Arc::new(read_end),
            Some(AccessMode::ReadOnly),
            Arc::clone(&scheduler),
        )?;
        let writer = Stream::open(Arc::new(write_end), Some(AccessMode::WriteOnly), scheduler)?;
        Ok(Self::new(Some(reader), Some(writer)))
    }

    /// The read half, if any.
    #[must_use]
    pub fn reader(&self) -> Option<&Stream> {
        self.reader.as_ref()
    }

    /// The write half, if any.
    #[must_use]
    pub fn writer(&self) -> Option<&Stream> {
        self.writer.as_ref()
    }

    /// Capability check; returns the half `op` is routed to.
    pub fn route(&mut self, op: Operation) -> Result<&mut Stream> {
        match op.direction() {
            Direction::Read => self.reader.as_mut().ok_or_else(|| {
                Error::new(ErrorKind::NotReadable)
                    .with_message(format!("not opened for reading ({op:?})"))
            }),
            Direction::Write => self.writer.as_mut().ok_or_else(|| {
                Error::new(ErrorKind::NotWritable)
                    .with_message(format!("not opened for writing ({op:?})"))
            }),
        }
    }

    /// Calls `f` with every remaining line.
    pub async fn each<F: FnMut(Vec<u8>)>(
        &mut self,
        separator: impl Into<Separator>,
        f: F,
    ) -> Result<()> {
        self.route(Operation::Each)?.each_line(separator, f).await
    }

    /// Calls `f` with every remaining line.
    pub async fn each_line<F: FnMut(Vec<u8>)>(
        &mut self,
        separator: impl Into<Separator>,
        f: F,
    ) -> Result<()> {
        self.route(Operation::EachLine)?
            .each_line(separator, f)
            .await
    }

    /// See [`Stream::getc`].
    pub async fn getc(&mut self) -> Result<Option<u8>> {
        self.route(Operation::Getc)?.getc().await
    }

    /// See [`Stream::gets`].
    pub async fn gets(&mut self, separator: impl Into<Separator>) -> Result<Option<Vec<u8>>> {
        self.route(Operation::Gets)?.gets(separator).await
    }

    /// See [`Stream::read`].
    pub async fn read(&mut self, size: Option<i64>) -> Result<Option<Vec<u8>>> {
        self.route(Operation::Read)?.read(size).await
    }

    /// See [`Stream::read_nonblock`].
    pub fn read_nonblock(&mut self, size: i64) -> Result<Vec<u8>> {
        self.route(Operation::ReadNonblock)?.read_nonblock(size)
    }

    /// See [`Stream::readchar`].
    pub async fn readchar(&mut self) -> Result<u8> {
        self.route(Operation::Readchar)?.readchar().await
    }

    /// See [`Stream::readline`].
    pub async fn readline(&mut self, separator: impl Into<Separator>) -> Result<Vec<u8>> {
        self.route(Operation::Readline)?.readline(separator).await
    }

    /// See [`Stream::readlines`].
    pub async fn readlines(&mut self, separator: impl Into<Separator>) -> Result<Vec<Vec<u8>>> {
        self.route(Operation::Readlines)?.readlines(separator).await
    }

    /// See [`Stream::readpartial`].
    pub async fn readpartial(&mut self, size: i64) -> Result<Vec<u8>> {
        self.route(Operation::Readpartial)?.readpartial(size).await
    }

    /// See [`Stream::sysread`].
    pub async fn sysread(&mut self, size: i64) -> Result<Vec<u8>> {
        self.route(Operation::Sysread)?.sysread(size).await
    }

    /// Writes `data` and returns the duplex for chaining.
    pub fn append(&mut self, data: impl AsRef<[u8]>) -> Result<&mut Self> {
        self.route(Operation::Append)?.write(data.as_ref())?;
        Ok(self)
    }

    /// See [`Stream::syswrite`].
    pub fn syswrite(&mut self, data: &[u8]) -> Result<usize> {
        self.route(Operation::Syswrite)?.syswrite(data)
    }

    /// See [`Stream::write`].
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.route(Operation::Write)?.write(data)
    }

    /// See [`Stream::write_nonblock`].
    pub fn write_nonblock(&mut self, data: &[u8]) -> Result<usize> {
        self.route(Operation::WriteNonblock)?.write_nonblock(data)
    }

    /// Closes every half that is still open.
    pub fn close(&mut self) -> Result<()> {
        for half in [self.reader.as_mut(), self.writer.as_mut()].into_iter().flatten() {
            if !half.is_closed() {
                half.close()?;
            }
        }
        debug!("duplex stream closed");
        Ok(())
    }

    /// Closes the read half; fails with `ClosedStream` if already closed.
    pub fn close_read(&mut self) -> Result<()> {
        let reader = self.route(Operation::Read)?;
        if reader.is_closed() {
            return Err(Error::closed_stream());
        }
        reader.close()
    }

    /// Closes the write half; fails with `ClosedStream` if already closed.
    pub fn close_write(&mut self) -> Result<()> {
        let writer = self.route(Operation::Write)?;
        if writer.is_closed() {
            return Err(Error::closed_stream());
        }
        writer.close()
    }

    /// True when every present half is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        [self.reader.as_ref(), self.writer.as_ref()]
            .into_iter()
            .flatten()
            .all(Stream::is_closed)
    }
}
