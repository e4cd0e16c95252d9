//! Virtual pages and the three forms they take.
//!
//! A page starts out [`PageKind::Uninit`], holding only a description of how
//! to produce its first contents. The first time it is claimed it turns into
//! the kind it was registered for: anonymous memory that goes to swap, or a
//! file-backed page that goes back to its file.

mod anon;
mod file;
mod uninit;

pub use anon::AnonPage;
pub use file::FilePage;
pub use uninit::UninitPage;

use crate::fs::{self, FileRef};
use crate::mem::{FrameNumber, PhysicalMemory, Result};
use crate::paging::PageManager;
use crate::sync::Mutex;
use crate::system::VmSystem;
use alloc::sync::Arc;
use core::{fmt, mem};
use log::warn;
use vmm_shared::mem::PAGE_FRAME_SIZE;

pub type PageRef = Arc<Mutex<Page>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmType {
    Anon,
    File,
}

/// One page worth of a file: `read_bytes` bytes starting at `offset`, then
/// zeros to the end of the page.
#[derive(Clone)]
pub struct FileSlice {
    file: FileRef,
    offset: u64,
    read_bytes: usize,
}

impl FileSlice {
    /// Panics if `read_bytes` exceeds a page.
    pub fn new(file: FileRef, offset: u64, read_bytes: usize) -> Self {
        assert!(read_bytes <= PAGE_FRAME_SIZE);
        Self {
            file,
            offset,
            read_bytes,
        }
    }

    pub fn file(&self) -> &FileRef {
        &self.file
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn read_bytes(&self) -> usize {
        self.read_bytes
    }

    pub fn zero_bytes(&self) -> usize {
        PAGE_FRAME_SIZE - self.read_bytes
    }

    /// Fills `frame` from the file. Whatever lies past the end of the file
    /// reads as zeros.
    fn load(&self, memory: &PhysicalMemory, frame: FrameNumber) -> Result<()> {
        let mut page = [0; PAGE_FRAME_SIZE];
        fs::read_full(&*self.file, self.offset, &mut page[..self.read_bytes])?;
        memory.write_page(frame, &page);
        Ok(())
    }

    /// Writes the file-backed part of `frame` to the file.
    fn store(&self, memory: &PhysicalMemory, frame: FrameNumber) -> Result<()> {
        let mut page = [0; PAGE_FRAME_SIZE];
        let data = &mut page[..self.read_bytes];
        memory.read(frame, 0, data);
        fs::write_all(&*self.file, self.offset, data)?;
        Ok(())
    }
}

impl fmt::Debug for FileSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSlice")
            .field("offset", &self.offset)
            .field("read_bytes", &self.read_bytes)
            .field("zero_bytes", &self.zero_bytes())
            .finish()
    }
}

/// How a page gets its first contents.
#[derive(Clone, Debug)]
pub enum PageInit {
    /// Zero-filled anonymous memory, such as stack or bss.
    Zeroed,
    /// Anonymous memory whose first contents come from an executable.
    Segment(FileSlice),
    /// A page of a memory-mapped file. The first page of a mapping records
    /// how many pages the mapping spans.
    Mapped {
        slice: FileSlice,
        page_count: Option<usize>,
    },
}

impl PageInit {
    /// The kind of page this turns into once loaded.
    pub fn vm_type(&self) -> VmType {
        match self {
            PageInit::Zeroed | PageInit::Segment(_) => VmType::Anon,
            PageInit::Mapped { .. } => VmType::File,
        }
    }
}

pub enum PageKind {
    Uninit(UninitPage),
    Anon(AnonPage),
    File(FilePage),
}

pub struct Page {
    va: usize,
    writable: bool,
    frame: Option<FrameNumber>,
    kind: PageKind,
}

impl Page {
    /// A page at `va` that is loaded from `init` on first use.
    pub fn new(va: usize, writable: bool, init: PageInit) -> Self {
        Self::with_kind(va, writable, PageKind::Uninit(UninitPage::new(init)))
    }

    pub(crate) fn with_kind(va: usize, writable: bool, kind: PageKind) -> Self {
        Self {
            va,
            writable,
            frame: None,
            kind,
        }
    }

    pub fn va(&self) -> usize {
        self.va
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    /// The frame holding the page, if it is resident.
    pub fn frame(&self) -> Option<FrameNumber> {
        self.frame
    }

    pub fn kind(&self) -> &PageKind {
        &self.kind
    }

    /// The page's type. Pages that were never loaded report the type they
    /// will become.
    pub fn vm_type(&self) -> VmType {
        match &self.kind {
            PageKind::Uninit(uninit) => uninit.init().vm_type(),
            PageKind::Anon(_) => VmType::Anon,
            PageKind::File(_) => VmType::File,
        }
    }

    pub fn is_loaded(&self) -> bool {
        !matches!(self.kind, PageKind::Uninit(_))
    }

    /// For the first page of a file mapping, the number of pages it spans.
    pub fn mapping_page_count(&self) -> Option<usize> {
        match &self.kind {
            PageKind::Uninit(uninit) => match uninit.init() {
                PageInit::Mapped { page_count, .. } => *page_count,
                _ => None,
            },
            PageKind::File(file) => file.page_count(),
            PageKind::Anon(_) => None,
        }
    }

    pub(crate) fn set_frame(&mut self, frame: Option<FrameNumber>) {
        self.frame = frame;
    }

    /// Fills `frame` with the page's contents. An uninitialized page becomes
    /// its target kind, but only once its contents have loaded.
    pub(crate) fn swap_in(&mut self, vm: &VmSystem, frame: FrameNumber) -> Result<()> {
        match &mut self.kind {
            PageKind::Uninit(uninit) => {
                uninit.load(vm.memory(), frame)?;
                self.materialize();
            }
            PageKind::Anon(anon) => anon.swap_in(vm, frame)?,
            PageKind::File(file) => file.swap_in(vm, frame)?,
        }
        Ok(())
    }

    fn materialize(&mut self) {
        let kind = mem::replace(&mut self.kind, PageKind::Anon(AnonPage::new()));
        self.kind = match kind {
            PageKind::Uninit(uninit) => uninit.into_kind(),
            kind => kind,
        };
    }

    /// Moves the page's contents out of its frame and forgets the frame.
    ///
    /// The mapping is removed first so the contents cannot change while they
    /// are saved. On failure the page stays resident and its mapping is put
    /// back.
    pub(crate) fn swap_out(&mut self, vm: &VmSystem, pm: &PageManager) -> Result<()> {
        let Some(frame) = self.frame else {
            return Ok(());
        };
        let dirty = pm.unmap(self.va).is_some_and(|entry| entry.dirty());

        let result = match &mut self.kind {
            PageKind::Uninit(_) => {
                unreachable!("page {:#x} evicted before it was loaded", self.va)
            }
            PageKind::Anon(anon) => anon.swap_out(vm, frame),
            PageKind::File(file) => file.swap_out(vm, frame, dirty),
        };

        match result {
            Ok(()) => {
                self.frame = None;
                Ok(())
            }
            Err(err) => {
                if pm.map(frame, self.va, self.writable, true) {
                    pm.set_dirty(self.va, dirty);
                }
                Err(err)
            }
        }
    }

    /// Releases everything the page holds: its mapping, its swap slot, and
    /// its frame. A dirty file-backed page is written back first.
    pub(crate) fn destroy(&mut self, vm: &VmSystem, pm: &PageManager) {
        let dirty = pm.unmap(self.va).is_some_and(|entry| entry.dirty());
        match &mut self.kind {
            PageKind::Uninit(_) => {}
            PageKind::Anon(anon) => anon.destroy(vm),
            PageKind::File(file) => {
                if let Some(frame) = self.frame {
                    if let Err(err) = file.write_back(vm, frame, dirty) {
                        warn!("lost write-back of page {:#x}: {}", self.va, err);
                    }
                }
            }
        }
        if let Some(frame) = self.frame.take() {
            vm.release_frame(frame);
        }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("va", &format_args!("{:#x}", self.va))
            .field("writable", &self.writable)
            .field("frame", &self.frame)
            .field("type", &self.vm_type())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
