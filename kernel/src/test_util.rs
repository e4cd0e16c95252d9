//! Fixtures shared by the unit tests.

use crate::block::{Block, BlockSector, BlockType, BLOCK_SECTOR_SIZE};
use crate::drivers::ram_disk::RamDisk;
use crate::mem::AddressSpace;
use crate::system::VmSystem;
use alloc::{boxed::Box, sync::Arc};
use std::collections::HashSet;
use vmm_shared::mem::PAGE_FRAME_SIZE;

/// A RAM-backed swap device with room for `slots` pages.
pub fn swap_block(slots: usize) -> Block {
    let sectors = BlockSector::try_from(slots * PAGE_FRAME_SIZE / BLOCK_SECTOR_SIZE).unwrap();
    Block::new(
        BlockType::Swap,
        "swap",
        sectors,
        Box::new(RamDisk::new(sectors)),
    )
}

pub fn vm(frames: usize, swap_slots: usize) -> Arc<VmSystem> {
    Arc::new(VmSystem::new(frames, swap_block(swap_slots)))
}

pub fn address_space(frames: usize, swap_slots: usize) -> AddressSpace {
    AddressSpace::new(vm(frames, swap_slots))
}

/// A page of bytes that differs for every `seed`.
pub fn pattern(seed: u8) -> [u8; PAGE_FRAME_SIZE] {
    let mut page = [0; PAGE_FRAME_SIZE];
    for (i, byte) in page.iter_mut().enumerate() {
        *byte = seed.wrapping_mul(31).wrapping_add((i % 251) as u8);
    }
    page
}

/// Checks that every bound frame is held by exactly the page it is bound to,
/// and that no page appears twice.
pub fn assert_frames_consistent(vm: &VmSystem) {
    let table = vm.frame_table();
    let mut pages = HashSet::new();
    for (frame, owner) in table.iter() {
        let page = owner.page.try_lock().expect("page locked during check");
        assert_eq!(page.frame(), Some(frame), "frame {frame:?} bound to {page:?}");
        assert_eq!(page.va(), owner.va);
        assert!(
            pages.insert(Arc::as_ptr(&owner.page)),
            "page {page:?} bound to two frames"
        );
    }
}
