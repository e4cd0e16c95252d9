//! The supplemental page table: every page a process may touch, resident or not.

use crate::mem::{AnonPage, FrameNumber, FrameOwner, Page, PageKind, PageRef, Result, VmError};
use crate::paging::PageManager;
use crate::swapping::SwapSlot;
use crate::sync::Mutex;
use crate::system::VmSystem;
use alloc::{sync::Arc, vec::Vec};
use hashbrown::{hash_map::Entry, HashMap};
use log::debug;
use vmm_shared::mem::{is_page_aligned, is_user_vaddr, pg_round_down, PAGE_FRAME_SIZE};

/// Where a duplicated page's contents come from.
enum Source {
    Frame(FrameNumber),
    Swap(SwapSlot),
}

pub struct SupplementalPageTable {
    pages: HashMap<usize, PageRef>,
    vm: Arc<VmSystem>,
    page_manager: Arc<PageManager>,
}

impl SupplementalPageTable {
    pub fn new(vm: Arc<VmSystem>, page_manager: Arc<PageManager>) -> Self {
        Self {
            pages: HashMap::new(),
            vm,
            page_manager,
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// The page covering `va`.
    pub fn find(&self, va: usize) -> Option<PageRef> {
        self.pages.get(&pg_round_down(va)).cloned()
    }

    /// Registers `page`.
    ///
    /// Fails with [`VmError::InvalidAddress`] if the page is not a page-aligned
    /// user page other than the null page, and with
    /// [`VmError::DuplicateMapping`] if a page is already registered there.
    pub fn insert(&mut self, page: Page) -> Result<PageRef> {
        let va = page.va();
        if va == 0 || !is_page_aligned(va) || !is_user_vaddr(va) {
            return Err(VmError::InvalidAddress);
        }
        match self.pages.entry(va) {
            Entry::Occupied(_) => Err(VmError::DuplicateMapping),
            Entry::Vacant(slot) => {
                let page = Arc::new(Mutex::new(page));
                slot.insert(page.clone());
                Ok(page)
            }
        }
    }

    /// Unregisters the page covering `va` and releases everything it holds.
    /// Returns `false` if there was no such page.
    pub fn remove(&mut self, va: usize) -> bool {
        let Some(page) = self.pages.remove(&pg_round_down(va)) else {
            return false;
        };
        page.lock().destroy(&self.vm, &self.page_manager);
        true
    }

    /// Addresses of every registered page, in no particular order.
    pub fn addresses(&self) -> impl Iterator<Item = usize> + '_ {
        self.pages.keys().copied()
    }

    /// Makes this table a copy of `src`, giving every loaded page its own
    /// frame with the same contents.
    ///
    /// Either every page is copied or, on failure, every page added by this
    /// call is removed again.
    pub fn copy_from(&mut self, src: &SupplementalPageTable) -> Result<()> {
        let mut copied = Vec::with_capacity(src.len());
        for (&va, page) in &src.pages {
            let result = self.duplicate(&page.lock(), &src.page_manager);
            if let Err(err) = result {
                debug!("copy of page {:#x} failed: {}", va, err);
                for va in copied {
                    self.remove(va);
                }
                return Err(err);
            }
            copied.push(va);
        }
        Ok(())
    }

    fn duplicate(&mut self, src: &Page, src_pm: &PageManager) -> Result<()> {
        let (va, writable) = (src.va(), src.writable());
        let (kind, source) = match src.kind() {
            PageKind::Uninit(uninit) => {
                self.insert(Page::new(va, writable, uninit.init().clone()))?;
                return Ok(());
            }
            PageKind::Anon(anon) => {
                let source = match (src.frame(), anon.slot()) {
                    (Some(frame), _) => Source::Frame(frame),
                    (None, Some(slot)) => Source::Swap(slot),
                    (None, None) => return Err(VmError::CorruptSwapState),
                };
                (PageKind::Anon(AnonPage::new()), source)
            }
            PageKind::File(file) => {
                let kind = PageKind::File(file.clone());
                let Some(frame) = src.frame() else {
                    // Not resident, so the file has the current contents.
                    self.insert(Page::with_kind(va, writable, kind))?;
                    return Ok(());
                };
                (kind, Source::Frame(frame))
            }
        };

        let dirty = matches!(kind, PageKind::File(_)) && src_pm.is_dirty(va);
        let page = self.insert(Page::with_kind(va, writable, kind))?;
        let result = self.fill(&page, source, dirty);
        if result.is_err() {
            self.remove(va);
        }
        result
    }

    /// Gives a freshly inserted copy its own frame holding the contents of `source`.
    fn fill(&self, page_ref: &PageRef, source: Source, dirty: bool) -> Result<()> {
        let mut page = page_ref.lock();
        let va = page.va();
        let frame = self.vm.acquire_frame(FrameOwner {
            page: page_ref.clone(),
            page_manager: self.page_manager.clone(),
            va,
        })?;
        page.set_frame(Some(frame));

        match source {
            Source::Frame(src) => self.vm.memory().copy(src, frame),
            Source::Swap(slot) => {
                // The source page keeps its slot.
                let mut contents = [0; PAGE_FRAME_SIZE];
                self.vm.swap().read_page(slot, &mut contents)?;
                self.vm.memory().write_page(frame, &contents);
            }
        }

        if !self.page_manager.map(frame, va, page.writable(), true) {
            return Err(VmError::AllocationFailure);
        }
        if dirty {
            self.page_manager.set_dirty(va, true);
        }
        self.vm.unpin_frame(frame);
        Ok(())
    }

    /// Destroys every page. The table is empty afterwards.
    pub fn kill(&mut self) {
        for (_, page) in self.pages.drain() {
            page.lock().destroy(&self.vm, &self.page_manager);
        }
    }
}

impl Drop for SupplementalPageTable {
    fn drop(&mut self) {
        self.kill();
    }
}
