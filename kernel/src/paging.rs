//! Per-process page tables.
//!
//! The virtual memory manager only needs a handful of MMU operations: install
//! and remove a translation, and read or clear the accessed and dirty bits the
//! hardware keeps. [`PageManager`] keeps x86 page table entries keyed by
//! virtual page number, and [`PageManager::access`] performs a user access the
//! way the CPU would: it either sets the bits and hands over the frame, or
//! produces the error code of the page fault.

use crate::mem::FrameNumber;
use crate::sync::Mutex;
use arbitrary_int::u20;
use hashbrown::{hash_map::Entry, HashMap};
use vmm_shared::{
    mem::{is_user_vaddr, PAGE_FRAME_SIZE},
    paging::{PageFaultErrorCode, PageTableEntry},
};

#[inline]
fn page_number(virt: usize) -> usize {
    virt / PAGE_FRAME_SIZE
}

pub struct PageManager {
    entries: Mutex<HashMap<usize, PageTableEntry>>,
}

impl Default for PageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PageManager {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Maps the page containing `virt` to `frame`.
    ///
    /// Returns `false` without changing anything if the page is already
    /// mapped, is not a user page, or the frame cannot be expressed in an
    /// entry.
    #[must_use]
    pub fn map(&self, frame: FrameNumber, virt: usize, writable: bool, user: bool) -> bool {
        if !is_user_vaddr(virt) || frame.index() > PageTableEntry::MAX_FRAME {
            return false;
        }
        #[allow(clippy::cast_possible_truncation)]
        let address = u20::new(frame.index() as u32);
        let entry = PageTableEntry::DEFAULT
            .with_present(true)
            .with_read_write(writable)
            .with_user_supervisor(user)
            .with_page_frame_address(address);

        match self.entries.lock().entry(page_number(virt)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    /// Removes the translation for the page containing `virt`, returning the
    /// entry as it was last seen by the hardware.
    pub fn unmap(&self, virt: usize) -> Option<PageTableEntry> {
        self.entries.lock().remove(&page_number(virt))
    }

    pub fn is_mapped(&self, virt: usize) -> bool {
        self.entries.lock().contains_key(&page_number(virt))
    }

    pub fn translate(&self, virt: usize) -> Option<FrameNumber> {
        let entries = self.entries.lock();
        let entry = entries.get(&page_number(virt))?;
        Some(FrameNumber::new(entry.page_frame_address().value() as usize))
    }

    pub fn is_dirty(&self, virt: usize) -> bool {
        self.entries
            .lock()
            .get(&page_number(virt))
            .is_some_and(|entry| entry.dirty())
    }

    pub fn set_dirty(&self, virt: usize, dirty: bool) {
        if let Some(entry) = self.entries.lock().get_mut(&page_number(virt)) {
            *entry = entry.with_dirty(dirty);
        }
    }

    pub fn is_accessed(&self, virt: usize) -> bool {
        self.entries
            .lock()
            .get(&page_number(virt))
            .is_some_and(|entry| entry.accessed())
    }

    pub fn set_accessed(&self, virt: usize, accessed: bool) {
        if let Some(entry) = self.entries.lock().get_mut(&page_number(virt)) {
            *entry = entry.with_accessed(accessed);
        }
    }

    /// Number of installed translations.
    pub fn mapped_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Performs a user-mode access to `virt` and runs `f` on the backing
    /// frame while the translation is held stable.
    ///
    /// On success the accessed bit is set, and the dirty bit too if `write`.
    /// Otherwise the error code of the resulting page fault is returned.
    pub fn access<R>(
        &self,
        virt: usize,
        write: bool,
        f: impl FnOnce(FrameNumber) -> R,
    ) -> Result<R, PageFaultErrorCode> {
        let code = PageFaultErrorCode::DEFAULT.with_write(write).with_user(true);
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&page_number(virt)) else {
            return Err(code);
        };
        if !entry.user_supervisor() || (write && !entry.read_write()) {
            return Err(code.with_present(true));
        }
        *entry = entry.with_accessed(true).with_dirty(entry.dirty() || write);
        let frame = FrameNumber::new(entry.page_frame_address().value() as usize);
        Ok(f(frame))
    }
}
