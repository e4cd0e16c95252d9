use crate::block::BlockError;
use crate::fs;
use core::error::Error;
use core::fmt::{Display, Formatter};

/// Errors produced by the virtual memory manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// A frame or swap slot could not be obtained, or a mapping could not be installed.
    AllocationFailure,
    /// No frame is free and none can be evicted. The system cannot make progress.
    OutOfMemory,
    /// Null, kernel-space, or misaligned address.
    InvalidAddress,
    /// A size or length that cannot describe a mapping.
    InvalidArgument,
    /// No page covers the address, or the address does not start a mapping.
    NotMapped,
    /// Write to a read-only page.
    WriteProtectionViolation,
    /// A page is already registered at the address.
    DuplicateMapping,
    /// A swapped-out page's slot is missing or already free.
    CorruptSwapState,
    /// The swap device or a backing file failed.
    IoFailure,
}

impl VmError {
    /// Whether the error means memory is exhausted for everybody, not just
    /// for the faulting process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VmError::OutOfMemory)
    }
}

impl Display for VmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            VmError::AllocationFailure => write!(f, "allocation failure"),
            VmError::OutOfMemory => write!(f, "out of memory, nothing left to evict"),
            VmError::InvalidAddress => write!(f, "invalid address"),
            VmError::InvalidArgument => write!(f, "invalid argument"),
            VmError::NotMapped => write!(f, "address not mapped"),
            VmError::WriteProtectionViolation => write!(f, "write to read-only page"),
            VmError::DuplicateMapping => write!(f, "page already mapped"),
            VmError::CorruptSwapState => write!(f, "swap slot missing or already free"),
            VmError::IoFailure => write!(f, "input/output error"),
        }
    }
}

impl Error for VmError {}

impl From<BlockError> for VmError {
    fn from(_: BlockError) -> Self {
        VmError::IoFailure
    }
}

impl From<fs::Error> for VmError {
    fn from(_: fs::Error) -> Self {
        VmError::IoFailure
    }
}

pub type Result<T> = core::result::Result<T, VmError>;
