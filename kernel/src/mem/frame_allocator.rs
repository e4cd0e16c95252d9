//! The physical frame pool the virtual memory manager draws from.

mod placement_algorithms;

use crate::sync::Mutex;
use alloc::{boxed::Box, vec::Vec};
use bitbybit::bitfield;
use placement_algorithms::{NextFit, PlacementAlgorithm};
use vmm_shared::mem::PAGE_FRAME_SIZE;

/// Index of a physical page frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameNumber(usize);

impl FrameNumber {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

#[bitfield(u8, default = 0)]
pub struct CoreMapEntry {
    #[bit(0, rw)]
    allocated: bool,
}

struct FrameAllocatorSolution {
    core_map: Box<[CoreMapEntry]>,
    placement_algorithm: NextFit,
    frames_allocated: usize,
}

impl FrameAllocatorSolution {
    fn alloc(&mut self) -> Option<FrameNumber> {
        if self.frames_allocated == self.core_map.len() {
            return None;
        }

        let range = self.placement_algorithm.place(&self.core_map, 1)?;
        for i in range.clone() {
            assert!(!self.core_map[i].allocated());
            self.core_map[i] = self.core_map[i].with_allocated(true);
        }
        self.frames_allocated += range.len();

        Some(FrameNumber::new(range.start))
    }

    fn dealloc(&mut self, frame: FrameNumber) {
        let entry = &mut self.core_map[frame.index()];
        assert!(entry.allocated(), "double free of frame {}", frame.index());
        *entry = entry.with_allocated(false);
        self.frames_allocated -= 1;
    }
}

/// A fixed pool of page frames.
///
/// Every frame sits behind its own lock, so copying into one frame never
/// waits on a copy into another.
pub struct PhysicalMemory {
    frames: Box<[Mutex<[u8; PAGE_FRAME_SIZE]>]>,
    allocator: Mutex<FrameAllocatorSolution>,
}

impl PhysicalMemory {
    pub fn new(num_frames: usize) -> Self {
        let frames: Vec<_> = (0..num_frames)
            .map(|_| Mutex::new([0; PAGE_FRAME_SIZE]))
            .collect();
        Self {
            frames: frames.into_boxed_slice(),
            allocator: Mutex::new(FrameAllocatorSolution {
                core_map: (0..num_frames).map(|_| CoreMapEntry::DEFAULT).collect(),
                placement_algorithm: NextFit::default(),
                frames_allocated: 0,
            }),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn free_frames(&self) -> usize {
        self.num_frames() - self.allocator.lock().frames_allocated
    }

    /// Takes a frame out of the pool and zero-fills it.
    pub fn alloc_zeroed(&self) -> Option<FrameNumber> {
        let frame = self.allocator.lock().alloc()?;
        self.zero(frame);
        Some(frame)
    }

    /// Returns `frame` to the pool. Panics if it was not allocated.
    pub fn dealloc(&self, frame: FrameNumber) {
        self.allocator.lock().dealloc(frame);
    }

    pub fn zero(&self, frame: FrameNumber) {
        self.frames[frame.index()].lock().fill(0);
    }

    /// Copies `buf.len()` bytes starting at `offset` within `frame` into `buf`.
    pub fn read(&self, frame: FrameNumber, offset: usize, buf: &mut [u8]) {
        let data = self.frames[frame.index()].lock();
        buf.copy_from_slice(&data[offset..offset + buf.len()]);
    }

    /// Copies `buf` into `frame` starting at `offset`.
    pub fn write(&self, frame: FrameNumber, offset: usize, buf: &[u8]) {
        let mut data = self.frames[frame.index()].lock();
        data[offset..offset + buf.len()].copy_from_slice(buf);
    }

    pub fn read_page(&self, frame: FrameNumber, page: &mut [u8; PAGE_FRAME_SIZE]) {
        page.copy_from_slice(&*self.frames[frame.index()].lock());
    }

    pub fn write_page(&self, frame: FrameNumber, page: &[u8; PAGE_FRAME_SIZE]) {
        self.frames[frame.index()].lock().copy_from_slice(page);
    }

    /// Copies the contents of `src` into `dst`.
    pub fn copy(&self, src: FrameNumber, dst: FrameNumber) {
        if src == dst {
            return;
        }
        let mut page = [0; PAGE_FRAME_SIZE];
        self.read_page(src, &mut page);
        self.write_page(dst, &page);
    }
}
