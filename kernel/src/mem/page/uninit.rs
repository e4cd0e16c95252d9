use super::{AnonPage, FilePage, PageInit, PageKind};
use crate::mem::{FrameNumber, PhysicalMemory, Result};

/// A page that has never been touched.
pub struct UninitPage {
    init: PageInit,
}

impl UninitPage {
    pub(super) fn new(init: PageInit) -> Self {
        Self { init }
    }

    pub fn init(&self) -> &PageInit {
        &self.init
    }

    /// Produces the page's first contents in `frame`.
    pub(super) fn load(&self, memory: &PhysicalMemory, frame: FrameNumber) -> Result<()> {
        match &self.init {
            PageInit::Zeroed => {
                memory.zero(frame);
                Ok(())
            }
            PageInit::Segment(slice) | PageInit::Mapped { slice, .. } => slice.load(memory, frame),
        }
    }

    pub(super) fn into_kind(self) -> PageKind {
        match self.init {
            PageInit::Zeroed | PageInit::Segment(_) => PageKind::Anon(AnonPage::new()),
            PageInit::Mapped { slice, page_count } => {
                PageKind::File(FilePage::new(slice, page_count))
            }
        }
    }
}
