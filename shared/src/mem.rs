use crate::sizes::{KB, MB};

// Page size is 4KB. This is a property of x86 processors.
pub const PAGE_FRAME_SIZE: usize = 4 * KB;

// Any virtual address at or above OFFSET belongs to the kernel.
pub const OFFSET: usize = 0x80000000;

/// The user stack grows down from here.
pub const USER_STACK_TOP: usize = OFFSET;
/// The user stack never grows more than this far below [`USER_STACK_TOP`].
pub const MAX_STACK_SIZE: usize = MB;
/// How far below the stack pointer an access may land and still count as a
/// stack access. `pusha` writes 32 bytes below the stack pointer before
/// adjusting it.
pub const STACK_SLACK: usize = 32;

#[inline]
pub const fn pg_round_down(addr: usize) -> usize {
    addr & !(PAGE_FRAME_SIZE - 1)
}

#[inline]
pub const fn pg_offset(addr: usize) -> usize {
    addr & (PAGE_FRAME_SIZE - 1)
}

#[inline]
pub const fn is_page_aligned(addr: usize) -> bool {
    pg_offset(addr) == 0
}

#[inline]
pub const fn is_user_vaddr(addr: usize) -> bool {
    addr < OFFSET
}

#[inline]
pub const fn is_kernel_vaddr(addr: usize) -> bool {
    addr >= OFFSET
}

/// Number of pages needed to hold `bytes` bytes.
#[inline]
pub const fn pages_for(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_FRAME_SIZE)
}
