use crate::mem::{FrameNumber, Result, VmError};
use crate::swapping::SwapSlot;
use crate::system::VmSystem;
use vmm_shared::mem::PAGE_FRAME_SIZE;

/// Memory with no backing file. Evicted contents go to a swap slot.
#[derive(Debug, Default)]
pub struct AnonPage {
    /// Where the contents live while the page is not resident.
    slot: Option<SwapSlot>,
}

impl AnonPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self) -> Option<SwapSlot> {
        self.slot
    }

    pub(super) fn swap_in(&mut self, vm: &VmSystem, frame: FrameNumber) -> Result<()> {
        let slot = self.slot.ok_or(VmError::CorruptSwapState)?;
        let mut page = [0; PAGE_FRAME_SIZE];
        vm.swap().swap_in(slot, &mut page)?;
        vm.memory().write_page(frame, &page);
        self.slot = None;
        vm.stats().record_swap_in();
        Ok(())
    }

    pub(super) fn swap_out(&mut self, vm: &VmSystem, frame: FrameNumber) -> Result<()> {
        let mut page = [0; PAGE_FRAME_SIZE];
        vm.memory().read_page(frame, &mut page);
        self.slot = Some(vm.swap().swap_out(&page)?);
        vm.stats().record_swap_out();
        Ok(())
    }

    pub(super) fn destroy(&mut self, vm: &VmSystem) {
        if let Some(slot) = self.slot.take() {
            vm.swap().release(slot);
        }
    }
}
