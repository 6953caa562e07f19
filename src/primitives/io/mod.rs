#![forbid(unsafe_code)]
//! Positioned file I/O underneath the file-backed log.

use std::{
    fs::{File, OpenOptions},
    io::{self, ErrorKind},
    path::Path,
    sync::Arc,
};

use tracing::trace;

use crate::types::{PenumbraError, Result};

/// Positioned reads and writes against a single file.
pub trait FileIo: Send + Sync + 'static {
    /// Fills `dst` from offset `off`; short files are an `UnexpectedEof` error.
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    /// Writes all of `src` at offset `off`.
    fn write_at(&self, off: u64, src: &[u8]) -> Result<()>;
    /// Flushes data and metadata to stable storage.
    fn sync_all(&self) -> Result<()>;
    /// Current file length in bytes.
    fn len(&self) -> Result<u64>;
    /// Returns true if the file is empty.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
    /// Truncates or extends the file to `len` bytes.
    fn truncate(&self, len: u64) -> Result<()>;
}

#[cfg(unix)]
mod platform {
    use std::{fs::File, io, os::unix::fs::FileExt};

    pub(super) fn read_some(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
        file.read_at(dst, off)
    }

    pub(super) fn write_some(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
        file.write_at(src, off)
    }
}

#[cfg(windows)]
mod platform {
    use std::{fs::File, io, os::windows::fs::FileExt};

    pub(super) fn read_some(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
        file.seek_read(dst, off)
    }

    pub(super) fn write_some(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
        file.seek_write(src, off)
    }
}

#[cfg(not(any(unix, windows)))]
mod platform {
    use std::{fs::File, io};

    pub(super) fn read_some(_file: &File, _dst: &mut [u8], _off: u64) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "positioned reads unsupported on this platform",
        ))
    }

    pub(super) fn write_some(_file: &File, _src: &[u8], _off: u64) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "positioned writes unsupported on this platform",
        ))
    }
}

/// [`FileIo`] over a shared `std::fs::File`.
#[derive(Clone)]
pub struct StdFileIo {
    inner: Arc<File>,
    read_only: bool,
}

impl StdFileIo {
    /// Wraps an already opened file.
    pub fn new(file: File) -> Self {
        Self {
            inner: Arc::new(file),
            read_only: false,
        }
    }

    /// Opens or creates a file for read-write access.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::new(file))
    }

    /// Opens an existing file for reading; writes and truncation fail.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self {
            inner: Arc::new(file),
            read_only: true,
        })
    }

    /// Whether this handle refuses mutation.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn file(&self) -> &File {
        &self.inner
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(PenumbraError::Invalid("file opened read-only"));
        }
        Ok(())
    }
}

fn read_exact(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
    while !dst.is_empty() {
        let read = platform::read_some(file, dst, off)?;
        if read == 0 {
            trace!(off, remaining = dst.len(), "io.read_exact.eof");
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "read_at reached EOF",
            ));
        }
        let (_, tail) = dst.split_at_mut(read);
        dst = tail;
        off += read as u64;
    }
    Ok(())
}

fn write_all(file: &File, mut off: u64, mut src: &[u8]) -> io::Result<()> {
    while !src.is_empty() {
        let written = platform::write_some(file, src, off)?;
        if written == 0 {
            return Err(io::Error::new(
                ErrorKind::WriteZero,
                "write_at wrote zero bytes",
            ));
        }
        src = &src[written..];
        off += written as u64;
    }
    Ok(())
}

impl FileIo for StdFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        read_exact(self.file(), off, dst).map_err(PenumbraError::from)
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        self.check_writable()?;
        trace!(off, len = src.len(), "io.write_at");
        write_all(self.file(), off, src).map_err(PenumbraError::from)
    }

    fn sync_all(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let result = self.file().sync_all().map_err(PenumbraError::from);
        if let Err(err) = &result {
            trace!(error = %err, "io.sync_all.failed");
        }
        result
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file().metadata()?.len())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.check_writable()?;
        self.file().set_len(len).map_err(PenumbraError::from)
    }
}
