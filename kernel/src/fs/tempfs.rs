use crate::fs::{Error, File, FileRef, Result};
use crate::sync::Mutex;
use alloc::{sync::Arc, vec::Vec};
use core::cmp::min;
use log::trace;

struct TempINode {
    data: Vec<u8>,
    /// Every write as (offset, length), oldest first.
    writes: Vec<(u64, usize)>,
}

/// An in-memory file. Every handle returned by [`File::reopen`] shares the same inode.
pub struct TempFile {
    inode: Arc<Mutex<TempINode>>,
}

impl TempFile {
    pub fn new(contents: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            inode: Arc::new(Mutex::new(TempINode {
                data: contents.to_vec(),
                writes: Vec::new(),
            })),
        })
    }

    /// Snapshot of the file's bytes.
    pub fn contents(&self) -> Vec<u8> {
        self.inode.lock().data.clone()
    }

    /// Every write made through any handle so far as (offset, length), oldest first.
    pub fn write_log(&self) -> Vec<(u64, usize)> {
        self.inode.lock().writes.clone()
    }
}

impl File for TempFile {
    fn reopen(&self) -> Result<FileRef> {
        Ok(Arc::new(TempFile {
            inode: self.inode.clone(),
        }))
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let inode = self.inode.lock();
        if offset >= inode.data.len() as u64 {
            // can't read any data
            return Ok(0);
        }
        let offset = offset as usize; // fits into usize by check above
        let read_len = min(buf.len(), inode.data.len() - offset);
        buf[..read_len].copy_from_slice(&inode.data[offset..offset + read_len]);
        Ok(read_len)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize> {
        trace!("tempfs: write @ offset {} length {}", offset, buf.len());
        let mut inode = self.inode.lock();
        let offset = usize::try_from(offset).map_err(|_| Error::BadOffset)?;
        let end = offset.checked_add(buf.len()).ok_or(Error::NoSpace)?;
        if end > inode.data.len() {
            // NOTE: files with holes will not perform well.
            inode.data.resize(end, 0);
        }
        inode.data[offset..end].copy_from_slice(buf);
        inode.writes.push((offset as u64, buf.len()));
        Ok(buf.len())
    }

    fn length(&self) -> u64 {
        self.inode.lock().data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{read_full, write_all};

    #[test]
    fn read_stops_at_end_of_file() {
        let file = TempFile::new(b"hello");
        let mut buf = [0xff; 8];
        assert_eq!(read_full(&*file, 2, &mut buf), Ok(3));
        assert_eq!(&buf[..4], b"llo\xff");
        assert_eq!(file.read_at(5, &mut buf), Ok(0));
    }

    #[test]
    fn reopened_handles_share_data() {
        let file = TempFile::new(b"abc");
        let other = file.reopen().unwrap();
        write_all(&*other, 1, b"XY").unwrap();
        assert_eq!(file.contents(), b"aXY");
        assert_eq!(file.write_log(), [(1, 2)]);
    }

    #[test]
    fn write_past_end_grows_file() {
        let file = TempFile::new(b"");
        write_all(&*file, 4, b"z").unwrap();
        assert_eq!(file.length(), 5);
        assert_eq!(file.contents(), b"\0\0\0\0z");
    }
}
