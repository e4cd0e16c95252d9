//! State shared by every address space: physical memory, the frame table
//! and the swap device.

use crate::block::Block;
use crate::mem::{FrameNumber, FrameOwner, FrameTable, PhysicalMemory, Result, VmError};
use crate::swapping::{PageReplacementPolicy, SwapSpace};
use crate::sync::{Mutex, MutexGuard};
use alloc::boxed::Box;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use log::{debug, error, info};

/// Counters for paging activity.
#[derive(Default)]
pub struct VmStats {
    page_faults: AtomicUsize,
    evictions: AtomicUsize,
    swap_outs: AtomicUsize,
    swap_ins: AtomicUsize,
    write_backs: AtomicUsize,
}

impl VmStats {
    pub fn page_faults(&self) -> usize {
        self.page_faults.load(Ordering::Relaxed)
    }
    pub fn evictions(&self) -> usize {
        self.evictions.load(Ordering::Relaxed)
    }
    pub fn swap_outs(&self) -> usize {
        self.swap_outs.load(Ordering::Relaxed)
    }
    pub fn swap_ins(&self) -> usize {
        self.swap_ins.load(Ordering::Relaxed)
    }
    pub fn write_backs(&self) -> usize {
        self.write_backs.load(Ordering::Relaxed)
    }

    pub(crate) fn record_fault(&self) {
        self.page_faults.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn record_swap_out(&self) {
        self.swap_outs.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn record_swap_in(&self) {
        self.swap_ins.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn record_write_back(&self) {
        self.write_backs.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for VmStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} faults, {} evictions, {} swap outs, {} swap ins, {} write backs",
            self.page_faults(),
            self.evictions(),
            self.swap_outs(),
            self.swap_ins(),
            self.write_backs()
        )
    }
}

pub struct VmSystem {
    memory: PhysicalMemory,
    frames: Mutex<FrameTable>,
    swap: SwapSpace,
    stats: VmStats,
}

impl VmSystem {
    /// A system with `num_frames` page frames for user pages, swapping to `swap_block`.
    pub fn new(num_frames: usize, swap_block: Block) -> Self {
        Self::with_policy(
            num_frames,
            swap_block,
            Box::new(crate::swapping::ClockEviction::default()),
        )
    }

    pub fn with_policy(
        num_frames: usize,
        swap_block: Block,
        policy: Box<dyn PageReplacementPolicy>,
    ) -> Self {
        let swap = SwapSpace::new(swap_block);
        info!(
            "vm: {} user frames, {} swap slots",
            num_frames,
            swap.capacity()
        );
        Self {
            memory: PhysicalMemory::new(num_frames),
            frames: Mutex::new(FrameTable::with_policy(num_frames, policy)),
            swap,
            stats: VmStats::default(),
        }
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    pub fn swap(&self) -> &SwapSpace {
        &self.swap
    }

    pub fn stats(&self) -> &VmStats {
        &self.stats
    }

    pub fn bound_frames(&self) -> usize {
        self.frames.lock().bound_frames()
    }

    pub fn free_frames(&self) -> usize {
        self.memory.free_frames()
    }

    pub fn frame_table(&self) -> MutexGuard<'_, FrameTable> {
        self.frames.lock()
    }

    /// Gets a zero-filled frame for `owner`, evicting another page if
    /// physical memory is full.
    ///
    /// The frame comes back bound to `owner` and pinned. The caller unpins it
    /// once the page's contents are in place.
    pub fn acquire_frame(&self, owner: FrameOwner) -> Result<FrameNumber> {
        if let Some(frame) = self.memory.alloc_zeroed() {
            self.frames.lock().bind(frame, owner);
            return Ok(frame);
        }
        self.evict(owner)
    }

    pub fn unpin_frame(&self, frame: FrameNumber) {
        self.frames.lock().set_pinned(frame, false);
    }

    /// Unbinds `frame` and returns it to physical memory.
    pub fn release_frame(&self, frame: FrameNumber) {
        self.frames.lock().unbind(frame);
        self.memory.dealloc(frame);
    }

    /// Takes a frame away from its current page and gives it to `owner`.
    fn evict(&self, owner: FrameOwner) -> Result<FrameNumber> {
        // Each round either evicts, loses a race for a page lock, or finds a
        // victim that cannot be saved. Two full sweeps without success means
        // no frame can be freed.
        let attempts = 2 * self.memory.num_frames();
        let mut last_err = None;

        for _ in 0..attempts {
            let mut table = self.frames.lock();
            let Some(frame) = table.select_victim() else {
                break;
            };
            let Some(victim) = table.owner(frame).cloned() else {
                continue;
            };
            // Never wait on a page lock while holding the frame table.
            let Some(mut page) = victim.page.try_lock() else {
                continue;
            };
            table.set_pinned(frame, true);
            drop(table);

            debug!(
                "evicting page {:#x} from frame {}",
                victim.va,
                frame.index()
            );
            if let Err(err) = page.swap_out(self, &victim.page_manager) {
                drop(page);
                self.unpin_frame(frame);
                debug!("page {:#x} stays in frame {}: {}", victim.va, frame.index(), err);
                last_err = Some(err);
                continue;
            }
            drop(page);

            self.memory.zero(frame);
            self.frames.lock().bind(frame, owner);
            self.stats.record_eviction();
            return Ok(frame);
        }

        error!("vm: no frame can be evicted");
        Err(last_err.unwrap_or(VmError::OutOfMemory))
    }
}

impl fmt::Display for VmSystem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}/{} frames bound, {}/{} swap slots used; {}",
            self.bound_frames(),
            self.memory.num_frames(),
            self.swap.used(),
            self.swap.capacity(),
            self.stats
        )
    }
}
