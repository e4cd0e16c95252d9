use crate::fs::FileRef;
use crate::mem::{AddressSpace, FileSlice, Page, PageInit, Result, VmError, VmType};
use log::{debug, warn};
use vmm_shared::mem::{is_page_aligned, pages_for, OFFSET, PAGE_FRAME_SIZE};

impl AddressSpace {
    /// Maps `length` bytes of `file`, starting at `offset`, at `addr`.
    ///
    /// Pages are loaded lazily. Bytes past the end of the file read as zeros
    /// and are never written back. The mapping holds its own handle to the
    /// file, so it outlives the caller's. Returns `addr`.
    pub fn mmap(
        &self,
        addr: usize,
        length: usize,
        writable: bool,
        file: &FileRef,
        offset: u64,
    ) -> Result<usize> {
        if addr == 0 || !is_page_aligned(addr) || offset % PAGE_FRAME_SIZE as u64 != 0 {
            return Err(VmError::InvalidAddress);
        }
        if length == 0 {
            return Err(VmError::InvalidArgument);
        }
        addr.checked_add(length)
            .filter(|&end| end <= OFFSET)
            .ok_or(VmError::InvalidAddress)?;

        let file = file.reopen()?;
        let file_length = file.length();
        if file_length == 0 {
            return Err(VmError::InvalidArgument);
        }

        let page_count = pages_for(length);
        let mut remaining =
            usize::try_from(file_length.saturating_sub(offset)).map_or(length, |n| n.min(length));
        let mut file_offset = offset;

        let mut spt = self.spt.lock();
        for i in 0..page_count {
            let read_bytes = remaining.min(PAGE_FRAME_SIZE);
            let init = PageInit::Mapped {
                slice: FileSlice::new(file.clone(), file_offset, read_bytes),
                page_count: (i == 0).then_some(page_count),
            };
            let va = addr + i * PAGE_FRAME_SIZE;
            if let Err(err) = spt.insert(Page::new(va, writable, init)) {
                for j in 0..i {
                    spt.remove(addr + j * PAGE_FRAME_SIZE);
                }
                return Err(err);
            }
            remaining -= read_bytes;
            file_offset += read_bytes as u64;
        }

        debug!("mmap {:#x}: {} pages at file offset {}", addr, page_count, offset);
        Ok(addr)
    }

    /// Unmaps the mapping that starts at `addr`, writing modified pages back
    /// to the file.
    pub fn munmap(&self, addr: usize) -> Result<()> {
        if !is_page_aligned(addr) {
            return Err(VmError::InvalidAddress);
        }
        let mut spt = self.spt.lock();
        let first = spt.find(addr).ok_or(VmError::NotMapped)?;
        let page_count = first.lock().mapping_page_count();
        let page_count = page_count.ok_or(VmError::NotMapped)?;
        drop(first);

        for i in 0..page_count {
            let va = addr + i * PAGE_FRAME_SIZE;
            let vm_type = spt.find(va).map(|page| page.lock().vm_type());
            match vm_type {
                Some(VmType::File) => {
                    spt.remove(va);
                }
                // Registered after the mapping's own page was removed.
                Some(VmType::Anon) => {
                    warn!("munmap {:#x}: page {:#x} is not part of it", addr, va);
                }
                None => warn!("munmap {:#x}: page {:#x} already gone", addr, va),
            }
        }
        debug!("munmap {:#x}: {} pages", addr, page_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{tempfs::TempFile, File};
    use crate::test_util::{address_space, pattern};
    use alloc::sync::Arc;

    const MAP: usize = 0x1000_0000;

    fn three_page_file() -> (Arc<TempFile>, FileRef) {
        let mut contents = Vec::new();
        for seed in 0..3 {
            contents.extend_from_slice(&pattern(seed));
        }
        let file = TempFile::new(&contents);
        let handle: FileRef = file.clone();
        (file, handle)
    }

    #[test]
    fn only_modified_pages_are_written_back() {
        let (file, handle) = three_page_file();
        let before = file.contents();
        let space = address_space(4, 0);
        assert_eq!(
            space.mmap(MAP, 3 * PAGE_FRAME_SIZE, true, &handle, 0),
            Ok(MAP)
        );
        assert_eq!(space.page_type(MAP + PAGE_FRAME_SIZE), Some(VmType::File));

        let mut page = [0; PAGE_FRAME_SIZE];
        for i in 0..3 {
            space.copy_from_user(MAP + i * PAGE_FRAME_SIZE, &mut page).unwrap();
            assert_eq!(page, pattern(i as u8));
        }
        space
            .copy_to_user(MAP + PAGE_FRAME_SIZE + 100, b"changed")
            .unwrap();

        space.munmap(MAP).unwrap();
        assert_eq!(space.page_count(), 0);
        assert_eq!(space.vm().bound_frames(), 0);
        assert_eq!(file.write_log(), [(PAGE_FRAME_SIZE as u64, PAGE_FRAME_SIZE)]);

        let after = file.contents();
        let middle = PAGE_FRAME_SIZE + 100..PAGE_FRAME_SIZE + 107;
        assert_eq!(&after[middle.clone()], b"changed");
        assert_eq!(after[..middle.start], before[..middle.start]);
        assert_eq!(after[middle.end..], before[middle.end..]);
    }

    #[test]
    fn tail_past_end_of_file_is_zero_and_stays_in_memory() {
        let file = TempFile::new(&[7; 5000]);
        let handle: FileRef = file.clone();
        let space = address_space(2, 0);
        space.mmap(MAP, 5000, true, &handle, 0).unwrap();
        assert_eq!(space.page_count(), 2);

        let mut page = [0; PAGE_FRAME_SIZE];
        space.copy_from_user(MAP + PAGE_FRAME_SIZE, &mut page).unwrap();
        assert!(page[..904].iter().all(|&b| b == 7));
        assert!(page[904..].iter().all(|&b| b == 0));

        space.copy_to_user(MAP + PAGE_FRAME_SIZE, &[1; 2000]).unwrap();
        space.munmap(MAP).unwrap();
        assert_eq!(file.length(), 5000);
        assert_eq!(file.write_log(), [(PAGE_FRAME_SIZE as u64, 904)]);
    }

    #[test]
    fn mapping_at_an_offset() {
        let (_file, handle) = three_page_file();
        let space = address_space(1, 0);
        space
            .mmap(MAP, PAGE_FRAME_SIZE, false, &handle, 2 * PAGE_FRAME_SIZE as u64)
            .unwrap();
        let mut page = [0; PAGE_FRAME_SIZE];
        space.copy_from_user(MAP, &mut page).unwrap();
        assert_eq!(page, pattern(2));
    }

    #[test]
    fn evicted_dirty_pages_go_back_to_the_file() {
        let (file, handle) = three_page_file();
        let space = address_space(1, 0);
        space.mmap(MAP, 2 * PAGE_FRAME_SIZE, true, &handle, 0).unwrap();

        space.copy_to_user(MAP, b"first").unwrap();
        let mut page = [0; PAGE_FRAME_SIZE];
        space.copy_from_user(MAP + PAGE_FRAME_SIZE, &mut page).unwrap();
        assert_eq!(file.write_log(), [(0, PAGE_FRAME_SIZE)]);
        assert_eq!(&file.contents()[..5], b"first");

        // The clean page is dropped without a write.
        space.copy_from_user(MAP, &mut page).unwrap();
        assert_eq!(&page[..5], b"first");
        assert_eq!(file.write_log().len(), 1);
        assert_eq!(space.vm().swap().used(), 0);
    }

    #[test]
    fn overlapping_mapping_is_rolled_back() {
        let (_file, handle) = three_page_file();
        let space = address_space(1, 0);
        space
            .allocate_page(MAP + 2 * PAGE_FRAME_SIZE, true, PageInit::Zeroed)
            .unwrap();
        assert_eq!(
            space.mmap(MAP, 3 * PAGE_FRAME_SIZE, true, &handle, 0),
            Err(VmError::DuplicateMapping)
        );
        assert_eq!(space.page_count(), 1);
        assert_eq!(space.page_type(MAP), None);
    }

    #[test]
    fn bad_arguments() {
        let (_file, handle) = three_page_file();
        let empty: FileRef = TempFile::new(&[]);
        let space = address_space(1, 0);
        let len = PAGE_FRAME_SIZE;
        assert_eq!(space.mmap(0, len, true, &handle, 0), Err(VmError::InvalidAddress));
        assert_eq!(space.mmap(MAP + 1, len, true, &handle, 0), Err(VmError::InvalidAddress));
        assert_eq!(space.mmap(MAP, len, true, &handle, 1), Err(VmError::InvalidAddress));
        assert_eq!(space.mmap(MAP, 0, true, &handle, 0), Err(VmError::InvalidArgument));
        assert_eq!(space.mmap(MAP, len, true, &empty, 0), Err(VmError::InvalidArgument));
        assert_eq!(
            space.mmap(OFFSET - len, 2 * len, true, &handle, 0),
            Err(VmError::InvalidAddress)
        );
        assert_eq!(
            space.mmap(MAP, usize::MAX, true, &handle, 0),
            Err(VmError::InvalidAddress)
        );
        assert_eq!(space.page_count(), 0);
    }

    #[test]
    fn munmap_needs_the_start_of_a_mapping() {
        let (_file, handle) = three_page_file();
        let space = address_space(1, 0);
        space.mmap(MAP, 2 * PAGE_FRAME_SIZE, true, &handle, 0).unwrap();
        space.allocate_page(0x1000, true, PageInit::Zeroed).unwrap();

        assert_eq!(space.munmap(MAP + PAGE_FRAME_SIZE), Err(VmError::NotMapped));
        assert_eq!(space.munmap(0x1000), Err(VmError::NotMapped));
        assert_eq!(space.munmap(0x5000_0000), Err(VmError::NotMapped));
        assert_eq!(space.munmap(MAP + 8), Err(VmError::InvalidAddress));
        assert_eq!(space.page_count(), 3);

        space.munmap(MAP).unwrap();
        assert_eq!(space.page_count(), 1);
        assert_eq!(space.munmap(MAP), Err(VmError::NotMapped));
    }

    #[test]
    fn munmap_leaves_pages_registered_in_its_gaps() {
        let (_file, handle) = three_page_file();
        let space = address_space(2, 0);
        space.mmap(MAP, 3 * PAGE_FRAME_SIZE, true, &handle, 0).unwrap();
        let gap = MAP + PAGE_FRAME_SIZE;
        assert!(space.remove_page(gap));
        space.allocate_page(gap, true, PageInit::Zeroed).unwrap();
        space.copy_to_user(gap, b"keep").unwrap();

        space.munmap(MAP).unwrap();
        assert_eq!(space.page_count(), 1);
        assert_eq!(space.page_type(gap), Some(VmType::Anon));
        assert_eq!(space.check_and_copy_user_memory(gap, 4).unwrap(), b"keep");
    }

    #[test]
    fn mapping_survives_a_loaded_first_page() {
        let (_file, handle) = three_page_file();
        let space = address_space(2, 0);
        space.mmap(MAP, 2 * PAGE_FRAME_SIZE, true, &handle, 0).unwrap();
        space.claim_page(MAP).unwrap();
        space.munmap(MAP).unwrap();
        assert_eq!(space.page_count(), 0);
    }
}
