//! Demand-paged virtual memory for a teaching kernel.
//!
//! Every user page is described by a [`mem::Page`] in its process's
//! [`mem::SupplementalPageTable`], materialized lazily on the first fault,
//! and evicted to swap or written back to its file when physical frames run
//! out. The pieces the manager consumes from the rest of the kernel (the
//! frame pool, the MMU, block devices and files) are kept small so the whole
//! subsystem runs on the host under `cargo test`.

#![cfg_attr(target_os = "none", no_std)]

extern crate alloc;

pub mod block;
pub mod drivers;
pub mod fs;
pub mod mem;
pub mod paging;
pub mod swapping;
pub mod sync;
pub mod system;

#[cfg(test)]
mod test_util;

pub use mem::{AddressSpace, VmError};
pub use system::VmSystem;
