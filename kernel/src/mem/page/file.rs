use super::FileSlice;
use crate::mem::{FrameNumber, Result};
use crate::system::VmSystem;

/// A page of a memory-mapped file. Evicted contents go back to the file,
/// and only if they were modified.
#[derive(Clone, Debug)]
pub struct FilePage {
    slice: FileSlice,
    page_count: Option<usize>,
}

impl FilePage {
    pub(super) fn new(slice: FileSlice, page_count: Option<usize>) -> Self {
        Self { slice, page_count }
    }

    pub fn slice(&self) -> &FileSlice {
        &self.slice
    }

    /// Set on the first page of a mapping only.
    pub fn page_count(&self) -> Option<usize> {
        self.page_count
    }

    pub(super) fn swap_in(&self, vm: &VmSystem, frame: FrameNumber) -> Result<()> {
        self.slice.load(vm.memory(), frame)
    }

    pub(super) fn swap_out(&self, vm: &VmSystem, frame: FrameNumber, dirty: bool) -> Result<()> {
        self.write_back(vm, frame, dirty)
    }

    pub(super) fn write_back(&self, vm: &VmSystem, frame: FrameNumber, dirty: bool) -> Result<()> {
        if dirty {
            self.slice.store(vm.memory(), frame)?;
            vm.stats().record_write_back();
        }
        Ok(())
    }
}
