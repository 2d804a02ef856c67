//! `std::fs::File` backend.

use super::{closed_error, AccessMode, Descriptor, RawFd};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

/// A descriptor backed by an open file.
///
/// Regular files are always readable, so readiness registrations against a
/// `FileDescriptor` complete on the next reactor turn.
#[derive(Debug)]
pub struct FileDescriptor {
    file: Mutex<Option<File>>,
    fd: RawFd,
    mode: AccessMode,
}

impl FileDescriptor {
    /// Wraps an already-open file.
    #[must_use]
    pub fn from_std(file: File, mode: AccessMode) -> Self {
        let fd = raw_fd(&file);
        Self {
            file: Mutex::new(Some(file)),
            fd,
            mode,
        }
    }

    /// Opens `path` with the given access mode.
    ///
    /// Write modes create the file if missing; nothing is truncated.
    pub fn open(path: impl AsRef<Path>, mode: AccessMode) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(mode.can_read())
            .write(mode.can_write())
            .create(mode.can_write())
            .truncate(false)
            .open(path)?;
        Ok(Self::from_std(file, mode))
    }

    fn with_file<T>(&self, f: impl FnOnce(&File) -> io::Result<T>) -> io::Result<T> {
        let guard = self.file.lock();
        match guard.as_ref() {
            Some(file) => f(file),
            None => Err(closed_error()),
        }
    }
}

#[cfg(unix)]
fn raw_fd(file: &File) -> RawFd {
    use std::os::unix::io::AsRawFd;
    file.as_raw_fd()
}

#[cfg(not(unix))]
fn raw_fd(_file: &File) -> RawFd {
    super::next_virtual_fd()
}

impl Descriptor for FileDescriptor {
    fn fd(&self) -> RawFd {
        self.fd
    }

    fn access_mode(&self) -> io::Result<AccessMode> {
        self.with_file(|_| Ok(self.mode))
    }

    fn read_nonblocking(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.with_file(|mut file| file.read(buf))
    }

    fn readable(&self) -> io::Result<bool> {
        self.with_file(|_| Ok(true))
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|mut file| file.write(buf))
    }

    fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        self.with_file(|mut file| file.seek(pos))
    }

    fn duplicate(&self) -> io::Result<Arc<dyn Descriptor>> {
        let dup = self.with_file(File::try_clone)?;
        Ok(Arc::new(Self::from_std(dup, self.mode)))
    }

    fn sync(&self) -> io::Result<()> {
        self.with_file(File::sync_all)
    }

    fn close(&self) -> io::Result<()> {
        match self.file.lock().take() {
            Some(file) => {
                drop(file);
                Ok(())
            }
            None => Err(closed_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn read_write_seek_roundtrip() {
        crate::test_utils::init_test_logging();
        let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
        tmp.write_all(b"hello world").expect("write");

        let fd = FileDescriptor::open(tmp.path(), AccessMode::ReadWrite).expect("open");
        assert!(fd.fd() >= 0);
        let mut buf = [0u8; 5];
        assert_eq!(fd.read_nonblocking(&mut buf).expect("read"), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(fd.seek(SeekFrom::Current(0)).expect("pos"), 5);
        assert_eq!(fd.seek(SeekFrom::End(0)).expect("end"), 11);
        assert_eq!(fd.write(b"!").expect("write"), 1);
        assert!(fd.readable().expect("readable"));
        fd.sync().expect("sync");
    }

    #[test]
    fn duplicate_shares_offset() {
        let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
        tmp.write_all(b"abcdef").expect("write");
        let fd = FileDescriptor::open(tmp.path(), AccessMode::ReadOnly).expect("open");
        let dup = fd.duplicate().expect("dup");
        assert_eq!(dup.access_mode().expect("mode"), AccessMode::ReadOnly);
        let mut buf = [0u8; 3];
        fd.read_nonblocking(&mut buf).expect("read");
        assert_eq!(dup.seek(SeekFrom::Current(0)).expect("pos"), 3);
    }

    #[test]
    fn close_twice_fails() {
        let tmp = tempfile::NamedTempFile::new().expect("tempfile");
        let fd = FileDescriptor::open(tmp.path(), AccessMode::ReadOnly).expect("open");
        fd.close().expect("first close");
        assert!(fd.close().is_err());
        assert!(fd.access_mode().is_err());
    }
}
