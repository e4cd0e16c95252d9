use crate::mem::{AddressSpace, FrameNumber, Result, VmError};
use alloc::vec;
use alloc::vec::Vec;
use vmm_shared::mem::{pg_offset, OFFSET, PAGE_FRAME_SIZE};

impl AddressSpace {
    /// Copies `data` into user memory at `pointer`, faulting pages in as needed.
    pub fn copy_to_user(&self, pointer: usize, data: &[u8]) -> Result<()> {
        self.for_each_user_chunk(pointer, data.len(), true, |frame, offset, done, len| {
            self.vm
                .memory()
                .write(frame, offset, &data[done..done + len]);
        })
    }

    /// Fills `buf` from user memory at `pointer`, faulting pages in as needed.
    pub fn copy_from_user(&self, pointer: usize, buf: &mut [u8]) -> Result<()> {
        self.for_each_user_chunk(pointer, buf.len(), false, |frame, offset, done, len| {
            self.vm
                .memory()
                .read(frame, offset, &mut buf[done..done + len]);
        })
    }

    /// Reads `count` bytes of user memory at `pointer` into a kernel buffer.
    pub fn check_and_copy_user_memory(&self, pointer: usize, count: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0; count];
        self.copy_from_user(pointer, &mut bytes)?;
        Ok(bytes)
    }

    /// Walks `[pointer, pointer + count)` page by page, calling `f` with the
    /// frame, the offset within it, the bytes done so far and the chunk
    /// length.
    fn for_each_user_chunk(
        &self,
        pointer: usize,
        count: usize,
        write: bool,
        mut f: impl FnMut(FrameNumber, usize, usize, usize),
    ) -> Result<()> {
        let range_end = pointer.checked_add(count).ok_or(VmError::InvalidAddress)?;
        // Trying to reach kernel memory.
        if range_end > OFFSET {
            return Err(VmError::InvalidAddress);
        }

        let mut done = 0;
        while done < count {
            let addr = pointer + done;
            let offset = pg_offset(addr);
            let len = (PAGE_FRAME_SIZE - offset).min(count - done);
            self.access_user_page(addr, write, |frame| f(frame, offset, done, len))?;
            done += len;
        }
        Ok(())
    }

    /// Runs `f` on the frame behind `addr`, resolving page faults the way the
    /// CPU would: by retrying the access after the fault handler returns.
    fn access_user_page(
        &self,
        addr: usize,
        write: bool,
        mut f: impl FnMut(FrameNumber),
    ) -> Result<()> {
        loop {
            match self.page_manager.access(addr, write, &mut f) {
                Ok(()) => return Ok(()),
                Err(code) => self.resolve_fault(addr, code)?,
            }
        }
    }
}
