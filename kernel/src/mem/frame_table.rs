//! Which page each physical frame holds.
//!
//! The frame table is the only place that knows a frame's owner, and the
//! eviction policy only ever looks at frames through it.

use crate::mem::{FrameNumber, PageRef};
use crate::paging::PageManager;
use crate::swapping::{ClockEviction, PageReplacementPolicy};
use alloc::{boxed::Box, sync::Arc};

/// The page a frame holds and the page table the page is mapped through.
#[derive(Clone)]
pub struct FrameOwner {
    pub page: PageRef,
    pub page_manager: Arc<PageManager>,
    pub va: usize,
}

pub struct Binding {
    pub owner: FrameOwner,
    /// A pinned frame is never chosen for eviction. Frames are pinned while
    /// being filled and while being evicted.
    pub pinned: bool,
}

pub struct FrameTable {
    bindings: Box<[Option<Binding>]>,
    policy: Box<dyn PageReplacementPolicy>,
}

impl FrameTable {
    pub fn new(num_frames: usize) -> Self {
        Self::with_policy(num_frames, Box::new(ClockEviction::default()))
    }

    pub fn with_policy(num_frames: usize, policy: Box<dyn PageReplacementPolicy>) -> Self {
        Self {
            bindings: (0..num_frames).map(|_| None).collect(),
            policy,
        }
    }

    /// Hands `frame` to `owner`, replacing any previous owner. The frame
    /// starts out pinned.
    pub fn bind(&mut self, frame: FrameNumber, owner: FrameOwner) {
        self.bindings[frame.index()] = Some(Binding {
            owner,
            pinned: true,
        });
    }

    pub fn unbind(&mut self, frame: FrameNumber) -> Option<FrameOwner> {
        self.bindings[frame.index()]
            .take()
            .map(|binding| binding.owner)
    }

    pub fn owner(&self, frame: FrameNumber) -> Option<&FrameOwner> {
        self.bindings[frame.index()]
            .as_ref()
            .map(|binding| &binding.owner)
    }

    pub fn is_pinned(&self, frame: FrameNumber) -> bool {
        self.bindings[frame.index()]
            .as_ref()
            .is_some_and(|binding| binding.pinned)
    }

    pub fn set_pinned(&mut self, frame: FrameNumber, pinned: bool) {
        if let Some(binding) = &mut self.bindings[frame.index()] {
            binding.pinned = pinned;
        }
    }

    pub fn bound_frames(&self) -> usize {
        self.bindings.iter().filter(|b| b.is_some()).count()
    }

    /// Every bound frame with its owner.
    pub fn iter(&self) -> impl Iterator<Item = (FrameNumber, &FrameOwner)> {
        self.bindings.iter().enumerate().filter_map(|(i, binding)| {
            binding
                .as_ref()
                .map(|binding| (FrameNumber::new(i), &binding.owner))
        })
    }

    /// Asks the replacement policy for the next frame to evict.
    pub fn select_victim(&mut self) -> Option<FrameNumber> {
        self.policy
            .select_victim(&self.bindings)
            .map(FrameNumber::new)
    }
}
