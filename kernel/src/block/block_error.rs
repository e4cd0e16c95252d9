use core::error::Error;
use core::fmt::{Display, Formatter};

/// Error type for block operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// The sector is out of bounds (greater than the block size)
    SectorOutOfBounds,
    /// The buffer has an invalid size (not `BLOCK_SECTOR_SIZE`)
    BufferInvalid,
    /// Error reading from the disk
    ReadError,
    /// Error writing to the disk
    WriteError,
}

impl Display for BlockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            BlockError::SectorOutOfBounds => {
                write!(f, "sector out of bounds (greater than the block size)")
            }
            BlockError::BufferInvalid => write!(f, "invalid buffer size (not `BLOCK_SECTOR_SIZE`)"),
            BlockError::ReadError => write!(f, "error reading from the block device"),
            BlockError::WriteError => write!(f, "error writing to the block device"),
        }
    }
}

impl Error for BlockError {}
