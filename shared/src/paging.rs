// https://wiki.osdev.org/Paging
// https://wiki.osdev.org/Exceptions#Page_Fault

use arbitrary_int::u20;
use bitbybit::bitfield;

#[bitfield(u32, default = 0)]
pub struct PageTableEntry {
    #[bit(0, rw)]
    present: bool,
    #[bit(1, rw)]
    read_write: bool,
    #[bit(2, rw)]
    user_supervisor: bool,
    #[bit(3, rw)]
    write_through: bool,
    #[bit(4, rw)]
    cache_disable: bool,
    #[bit(5, rw)]
    accessed: bool,
    #[bit(6, rw)]
    dirty: bool,
    #[bit(8, rw)]
    global: bool,
    #[bits(12..=31, rw)]
    page_frame_address: u20,
}

impl PageTableEntry {
    /// Largest frame number an entry can point at.
    pub const MAX_FRAME: usize = (1 << 20) - 1;
}

/// The error code the CPU pushes along with a page fault.
#[bitfield(u32, default = 0)]
pub struct PageFaultErrorCode {
    /// Set when the page was present and the access broke its protection,
    /// clear when the page was not present at all.
    #[bit(0, rw)]
    present: bool,
    #[bit(1, rw)]
    write: bool,
    #[bit(2, rw)]
    user: bool,
    #[bit(4, rw)]
    instruction_fetch: bool,
}

impl PageFaultErrorCode {
    #[inline]
    pub fn not_present(&self) -> bool {
        !self.present()
    }
}
