use crate::block::{Block, BlockSector, BLOCK_SECTOR_SIZE};
use crate::mem::{Result, VmError};
use crate::sync::Mutex;
use log::info;
use vmm_shared::{bitmap::Bitmap, mem::PAGE_FRAME_SIZE};

const SECTORS_PER_PAGE: usize = PAGE_FRAME_SIZE / BLOCK_SECTOR_SIZE;

/// A page-sized slot on the swap device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SwapSlot(usize);

impl SwapSlot {
    pub const fn index(self) -> usize {
        self.0
    }

    fn first_sector(self) -> BlockSector {
        #[allow(clippy::cast_possible_truncation)]
        let sector = (self.0 * SECTORS_PER_PAGE) as BlockSector;
        sector
    }
}

/// The swap device, carved into page-sized slots.
///
/// A slot is occupied exactly while some anonymous page's contents live in
/// it. Slots are handed out first-fit.
pub struct SwapSpace {
    slots: Mutex<Bitmap>,
    block: Mutex<Block>,
}

impl SwapSpace {
    pub fn new(block: Block) -> Self {
        let capacity = block.get_size() as usize / SECTORS_PER_PAGE;
        info!("swap: {} slots on {}", capacity, block);
        Self {
            slots: Mutex::new(Bitmap::new(capacity)),
            block: Mutex::new(block),
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of occupied slots.
    pub fn used(&self) -> usize {
        self.slots.lock().count_ones()
    }

    /// Marks the lowest free slot occupied and returns it.
    pub fn reserve(&self) -> Option<SwapSlot> {
        self.slots.lock().scan_and_flip().map(SwapSlot)
    }

    pub fn is_occupied(&self, slot: SwapSlot) -> bool {
        let slots = self.slots.lock();
        slot.0 < slots.len() && slots.test(slot.0)
    }

    pub fn release(&self, slot: SwapSlot) {
        let mut slots = self.slots.lock();
        debug_assert!(slots.test(slot.0), "releasing free swap slot {}", slot.0);
        slots.set(slot.0, false);
    }

    /// Writes a whole page into `slot`.
    pub fn write_page(&self, slot: SwapSlot, page: &[u8; PAGE_FRAME_SIZE]) -> Result<()> {
        let mut block = self.block.lock();
        let first = slot.first_sector();
        for (i, sector) in page.chunks_exact(BLOCK_SECTOR_SIZE).enumerate() {
            block.write(first + i as BlockSector, sector)?;
        }
        Ok(())
    }

    /// Reads the page stored in `slot` without releasing it.
    pub fn read_page(&self, slot: SwapSlot, page: &mut [u8; PAGE_FRAME_SIZE]) -> Result<()> {
        let mut block = self.block.lock();
        let first = slot.first_sector();
        for (i, sector) in page.chunks_exact_mut(BLOCK_SECTOR_SIZE).enumerate() {
            block.read(first + i as BlockSector, sector)?;
        }
        Ok(())
    }

    /// Stores `page` in a fresh slot.
    ///
    /// Fails with [`VmError::AllocationFailure`] when every slot is taken. A
    /// failed write leaves no slot behind.
    pub fn swap_out(&self, page: &[u8; PAGE_FRAME_SIZE]) -> Result<SwapSlot> {
        let slot = self.reserve().ok_or(VmError::AllocationFailure)?;
        if let Err(err) = self.write_page(slot, page) {
            self.release(slot);
            return Err(err);
        }
        Ok(slot)
    }

    /// Reads `slot` back into `page` and frees it.
    ///
    /// A slot that is not occupied means the caller's bookkeeping is wrong,
    /// and [`VmError::CorruptSwapState`] is returned. A failed read keeps the
    /// slot so the contents are not lost.
    pub fn swap_in(&self, slot: SwapSlot, page: &mut [u8; PAGE_FRAME_SIZE]) -> Result<()> {
        if !self.is_occupied(slot) {
            return Err(VmError::CorruptSwapState);
        }
        self.read_page(slot, page)?;
        self.release(slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockError, BlockOp, BlockType};
    use crate::test_util::swap_block;
    use alloc::boxed::Box;
    use proptest::prelude::*;

    fn page_of(byte: u8) -> [u8; PAGE_FRAME_SIZE] {
        [byte; PAGE_FRAME_SIZE]
    }

    /// A disk whose writes fail once `writes_left` runs out.
    struct FlakyDisk {
        writes_left: usize,
    }

    impl BlockOp for FlakyDisk {
        fn read(
            &mut self,
            _sector: BlockSector,
            _buf: &mut [u8],
        ) -> core::result::Result<(), BlockError> {
            Err(BlockError::ReadError)
        }

        fn write(
            &mut self,
            _sector: BlockSector,
            _buf: &[u8],
        ) -> core::result::Result<(), BlockError> {
            if self.writes_left == 0 {
                return Err(BlockError::WriteError);
            }
            self.writes_left -= 1;
            Ok(())
        }
    }

    #[test]
    fn capacity_follows_device_size() {
        let swap = SwapSpace::new(swap_block(3));
        assert_eq!(swap.capacity(), 3);
        assert_eq!(swap.used(), 0);
    }

    #[test]
    fn exhaustion_keeps_existing_slots_intact() {
        let swap = SwapSpace::new(swap_block(2));
        let a = swap.swap_out(&page_of(1)).unwrap();
        let b = swap.swap_out(&page_of(2)).unwrap();
        assert_eq!(swap.swap_out(&page_of(3)), Err(VmError::AllocationFailure));
        assert_eq!(swap.used(), 2);

        let mut page = page_of(0);
        swap.swap_in(b, &mut page).unwrap();
        assert_eq!(page, page_of(2));
        swap.swap_in(a, &mut page).unwrap();
        assert_eq!(page, page_of(1));
        assert_eq!(swap.used(), 0);
    }

    #[test]
    fn slots_are_first_fit() {
        let swap = SwapSpace::new(swap_block(4));
        let slots: Vec<_> = (0..4).map(|_| swap.reserve().unwrap()).collect();
        swap.release(slots[2]);
        swap.release(slots[1]);
        assert_eq!(swap.reserve(), Some(slots[1]));
        assert_eq!(swap.reserve(), Some(slots[2]));
    }

    #[test]
    fn swap_in_of_free_slot_is_corrupt() {
        let swap = SwapSpace::new(swap_block(2));
        let slot = swap.swap_out(&page_of(7)).unwrap();
        let mut page = page_of(0);
        swap.swap_in(slot, &mut page).unwrap();
        assert_eq!(swap.swap_in(slot, &mut page), Err(VmError::CorruptSwapState));
        assert_eq!(
            swap.swap_in(SwapSlot(99), &mut page),
            Err(VmError::CorruptSwapState)
        );
    }

    #[test]
    fn failed_write_releases_slot() {
        let block = Block::new(
            BlockType::Swap,
            "flaky",
            (2 * SECTORS_PER_PAGE) as BlockSector,
            Box::new(FlakyDisk { writes_left: 3 }),
        );
        let swap = SwapSpace::new(block);
        assert_eq!(swap.swap_out(&page_of(1)), Err(VmError::IoFailure));
        assert_eq!(swap.used(), 0);
    }

    #[test]
    fn read_page_leaves_slot_occupied() {
        let swap = SwapSpace::new(swap_block(1));
        let slot = swap.swap_out(&page_of(5)).unwrap();
        let mut page = page_of(0);
        swap.read_page(slot, &mut page).unwrap();
        assert_eq!(page, page_of(5));
        assert!(swap.is_occupied(slot));
    }

    proptest! {
        #[test]
        fn contents_survive_a_round_trip(
            fill in proptest::collection::vec(any::<u8>(), PAGE_FRAME_SIZE),
            decoys in 0u8..4,
        ) {
            let swap = SwapSpace::new(swap_block(5));
            for i in 0..decoys {
                swap.swap_out(&page_of(i)).unwrap();
            }
            let mut page = [0; PAGE_FRAME_SIZE];
            page.copy_from_slice(&fill);

            let slot = swap.swap_out(&page).unwrap();
            let mut back = [0; PAGE_FRAME_SIZE];
            swap.swap_in(slot, &mut back).unwrap();
            prop_assert_eq!(&back[..], &fill[..]);
            prop_assert!(!swap.is_occupied(slot));
        }
    }
}
