use crate::fs::FileRef;
use crate::mem::{
    FileSlice, FrameNumber, FrameOwner, Page, PageInit, PageRef, Result, SupplementalPageTable,
    VmError, VmType,
};
use crate::paging::PageManager;
use crate::sync::Mutex;
use crate::system::VmSystem;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};
use log::{debug, trace};
use vmm_shared::mem::{is_page_aligned, PAGE_FRAME_SIZE, USER_STACK_TOP};

/// The virtual memory of one process.
pub struct AddressSpace {
    pub(super) vm: Arc<VmSystem>,
    pub(super) page_manager: Arc<PageManager>,
    pub(super) spt: Mutex<SupplementalPageTable>,
    /// The user stack pointer, as last saved on entry to the kernel.
    stack_pointer: AtomicUsize,
}

impl AddressSpace {
    pub fn new(vm: Arc<VmSystem>) -> Self {
        let page_manager = Arc::new(PageManager::new());
        Self {
            spt: Mutex::new(SupplementalPageTable::new(vm.clone(), page_manager.clone())),
            vm,
            page_manager,
            stack_pointer: AtomicUsize::new(USER_STACK_TOP),
        }
    }

    pub fn vm(&self) -> &Arc<VmSystem> {
        &self.vm
    }

    pub fn page_manager(&self) -> &Arc<PageManager> {
        &self.page_manager
    }

    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer.load(Ordering::Relaxed)
    }

    pub fn set_stack_pointer(&self, sp: usize) {
        self.stack_pointer.store(sp, Ordering::Relaxed);
    }

    /// Number of registered pages.
    pub fn page_count(&self) -> usize {
        self.spt.lock().len()
    }

    /// The type of the page covering `va`, or what it will become if it was
    /// never loaded.
    pub fn page_type(&self, va: usize) -> Option<VmType> {
        let page = self.spt.lock().find(va)?;
        let vm_type = page.lock().vm_type();
        Some(vm_type)
    }

    /// Whether the page covering `va` currently holds a frame.
    pub fn is_resident(&self, va: usize) -> bool {
        let Some(page) = self.spt.lock().find(va) else {
            return false;
        };
        let resident = page.lock().frame().is_some();
        resident
    }

    /// Registers a page at `va` that is loaded from `init` on first access.
    pub fn allocate_page(&self, va: usize, writable: bool, init: PageInit) -> Result<()> {
        self.spt.lock().insert(Page::new(va, writable, init))?;
        Ok(())
    }

    /// Unregisters the page covering `va`, writing it back first if it is a
    /// modified file page.
    pub fn remove_page(&self, va: usize) -> bool {
        self.spt.lock().remove(va)
    }

    /// Makes the page covering `va` resident right away.
    pub fn claim_page(&self, va: usize) -> Result<()> {
        let spt = self.spt.lock();
        let page = spt.find(va).ok_or(VmError::NotMapped)?;
        self.claim(&page)
    }

    /// Gives `page_ref` a frame, fills it, and maps it.
    ///
    /// The contents are in place before the mapping appears, so no access
    /// ever sees a half-loaded page.
    pub(super) fn claim(&self, page_ref: &PageRef) -> Result<()> {
        let mut page = page_ref.lock();
        let va = page.va();
        if let Some(frame) = page.frame() {
            // Resident already. A failed eviction can leave it unmapped.
            return self.install(&page, frame);
        }

        trace!("claiming page {:#x}", va);
        let frame = self.vm.acquire_frame(FrameOwner {
            page: page_ref.clone(),
            page_manager: self.page_manager.clone(),
            va,
        })?;
        page.set_frame(Some(frame));

        if let Err(err) = page.swap_in(&self.vm, frame) {
            page.set_frame(None);
            self.vm.release_frame(frame);
            return Err(err);
        }

        if let Err(err) = self.install(&page, frame) {
            self.unload(&mut page, frame);
            return Err(err);
        }
        self.vm.unpin_frame(frame);
        Ok(())
    }

    /// Takes a loaded but unmapped page back out of `frame` and releases the
    /// frame. The contents go wherever an eviction would put them; if that
    /// fails too, the page stays resident and the next claim maps it.
    fn unload(&self, page: &mut Page, frame: FrameNumber) {
        match page.swap_out(&self.vm, &self.page_manager) {
            Ok(()) => self.vm.release_frame(frame),
            Err(err) => {
                debug!("page {:#x} kept in frame {}: {}", page.va(), frame.index(), err);
                self.vm.unpin_frame(frame);
            }
        }
    }

    fn install(&self, page: &Page, frame: FrameNumber) -> Result<()> {
        if self.page_manager.is_mapped(page.va())
            || self
                .page_manager
                .map(frame, page.va(), page.writable(), true)
        {
            Ok(())
        } else {
            Err(VmError::AllocationFailure)
        }
    }

    /// Registers the pages of an executable segment for lazy loading.
    ///
    /// The segment covers `read_bytes` bytes of `file` starting at `offset`,
    /// followed by `zero_bytes` zeros, mapped at `upage`. Nothing is read
    /// until a page is first touched.
    pub fn load_segment(
        &self,
        file: &FileRef,
        offset: u64,
        upage: usize,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> Result<()> {
        if !is_page_aligned(upage) {
            return Err(VmError::InvalidAddress);
        }
        let total = read_bytes
            .checked_add(zero_bytes)
            .ok_or(VmError::InvalidArgument)?;
        if total == 0 || !is_page_aligned(total) {
            return Err(VmError::InvalidArgument);
        }

        let mut spt = self.spt.lock();
        let mut remaining = read_bytes;
        let mut file_offset = offset;
        for i in 0..total / PAGE_FRAME_SIZE {
            let page_read_bytes = remaining.min(PAGE_FRAME_SIZE);
            let init = if page_read_bytes == 0 {
                PageInit::Zeroed
            } else {
                PageInit::Segment(FileSlice::new(file.clone(), file_offset, page_read_bytes))
            };
            let va = upage + i * PAGE_FRAME_SIZE;
            if let Err(err) = spt.insert(Page::new(va, writable, init)) {
                for j in 0..i {
                    spt.remove(upage + j * PAGE_FRAME_SIZE);
                }
                return Err(err);
            }
            remaining -= page_read_bytes;
            file_offset += page_read_bytes as u64;
        }
        Ok(())
    }

    /// Sets up the first page of the user stack, resident right away, and
    /// points the stack pointer at the top.
    pub fn setup_stack(&self) -> Result<()> {
        let va = USER_STACK_TOP - PAGE_FRAME_SIZE;
        let mut spt = self.spt.lock();
        let page = spt.insert(Page::new(va, true, PageInit::Zeroed))?;
        if let Err(err) = self.claim(&page) {
            spt.remove(va);
            return Err(err);
        }
        self.set_stack_pointer(USER_STACK_TOP);
        Ok(())
    }

    /// A copy of this address space for a child process. Loaded pages are
    /// copied into frames of the child's own.
    pub fn fork(&self) -> Result<AddressSpace> {
        let child = AddressSpace::new(self.vm.clone());
        child.set_stack_pointer(self.stack_pointer());
        {
            let src = self.spt.lock();
            child.spt.lock().copy_from(&src)?;
            debug!("forked address space with {} pages", src.len());
        }
        Ok(child)
    }

    /// Releases every page of the address space.
    pub fn kill(&self) {
        self.spt.lock().kill();
    }
}
