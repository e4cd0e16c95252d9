//! Demand paging.
//!
//! Pages are registered in a process's [`SupplementalPageTable`] long before
//! they have any memory behind them. The first access faults, and the fault
//! resolver asks the frame pool for a frame, evicting some other page if the
//! pool is dry, and loads the page's contents into it.

mod address_space;
mod fault;
pub mod frame_allocator;
pub mod frame_table;
mod mmap;
pub mod page;
pub mod spt;
mod user;
mod vm_error;

pub use address_space::AddressSpace;
pub use frame_allocator::{FrameNumber, PhysicalMemory};
pub use frame_table::{FrameOwner, FrameTable};
pub use page::{
    AnonPage, FilePage, FileSlice, Page, PageInit, PageKind, PageRef, UninitPage, VmType,
};
pub use spt::SupplementalPageTable;
pub use vm_error::{Result, VmError};
