//! Path-level helpers.
//!
//! Each helper opens a file read-only, runs one stream operation over it and
//! closes the file again, also when the operation fails.

use crate::error::{Error, Result};
use crate::fd::{AccessMode, FileDescriptor};
use crate::io::{Separator, Stream};
use crate::runtime::SchedulerHandle;
use std::path::Path;
use std::sync::Arc;

/// Opens `path` as a stream with the given access mode.
pub fn open(path: impl AsRef<Path>, mode: AccessMode, scheduler: SchedulerHandle) -> Result<Stream> {
    let path = path.as_ref();
    let descriptor = FileDescriptor::open(path, mode)
        .map_err(|e| Error::from_io(e, &format!("open {}", path.display())))?;
    Stream::open(Arc::new(descriptor), Some(mode), scheduler)
}

/// Reads `length` bytes starting at `offset`, or the whole remainder when
/// `length` is `None`.
pub async fn read_path(
    scheduler: SchedulerHandle,
    path: impl AsRef<Path>,
    length: Option<i64>,
    offset: i64,
) -> Result<Option<Vec<u8>>> {
    if length.is_some_and(|n| n < 0) {
        return Err(Error::invalid_argument("length must not be negative"));
    }
    let offset = u64::try_from(offset)
        .map_err(|_| Error::invalid_argument("offset must not be negative"))?;
    let mut stream = open(path, AccessMode::ReadOnly, scheduler)?;
    let result: Result<Option<Vec<u8>>> = async {
        if offset != 0 {
            stream.set_pos(offset)?;
        }
        stream.read(length).await
    }
    .await;
    finish(stream, result)
}

/// Reads every line of `path`.
pub async fn readlines_path(
    scheduler: SchedulerHandle,
    path: impl AsRef<Path>,
    separator: impl Into<Separator>,
) -> Result<Vec<Vec<u8>>> {
    let mut stream = open(path, AccessMode::ReadOnly, scheduler)?;
    let result = stream.readlines(separator).await;
    finish(stream, result)
}

/// Calls `f` with every line of `path`.
pub async fn foreach<F>(
    scheduler: SchedulerHandle,
    path: impl AsRef<Path>,
    separator: impl Into<Separator>,
    mut f: F,
) -> Result<()>
where
    F: FnMut(Vec<u8>),
{
    let separator = separator.into();
    let mut stream = open(path, AccessMode::ReadOnly, scheduler)?;
    let result = async {
        while let Some(line) = stream.gets(separator.clone()).await? {
            f(line);
        }
        Ok::<_, Error>(())
    }
    .await;
    finish(stream, result)
}

fn finish<T>(mut stream: Stream, result: Result<T>) -> Result<T> {
    let closed = stream.close();
    let value = result?;
    closed?;
    Ok(value)
}
