//! The slice of the file system the virtual memory layer depends on.

pub mod tempfs;

use alloc::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// no space left on device
    NoSpace,
    /// offset beyond what the file can address
    BadOffset,
    /// the underlying device failed
    Io,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoSpace => write!(f, "no space left on device"),
            Self::BadOffset => write!(f, "offset out of range"),
            Self::Io => write!(f, "input/output error"),
        }
    }
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

/// An open regular file.
///
/// Reads and writes are positional, so one handle may be shared by every page
/// that maps it.
pub trait File: Send + Sync {
    /// Opens a new, independent handle to the same file. The new handle stays
    /// usable after every other handle is dropped.
    fn reopen(&self) -> Result<FileRef>;
    /// Reads up to `buf.len()` bytes at `offset`. Returns the number of bytes
    /// read, which is short only at end of file.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;
    /// Writes `buf` at `offset`. Returns the number of bytes written.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize>;
    /// Length of the file in bytes.
    fn length(&self) -> u64;
}

pub type FileRef = Arc<dyn File>;

/// Fills as much of `buf` as the file holds at `offset`, stopping early only
/// at end of file. Returns the number of bytes read.
pub fn read_full(file: &dyn File, offset: u64, buf: &mut [u8]) -> Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        let n = file.read_at(offset + done as u64, &mut buf[done..])?;
        if n == 0 {
            break;
        }
        done += n;
    }
    Ok(done)
}

/// Writes all of `buf` at `offset`.
pub fn write_all(file: &dyn File, offset: u64, buf: &[u8]) -> Result<()> {
    let mut done = 0;
    while done < buf.len() {
        let n = file.write_at(offset + done as u64, &buf[done..])?;
        if n == 0 {
            return Err(Error::NoSpace);
        }
        done += n;
    }
    Ok(())
}
