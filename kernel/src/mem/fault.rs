use crate::mem::{AddressSpace, Page, PageInit, Result, VmError};
use log::{debug, trace};
use vmm_shared::{
    mem::{is_kernel_vaddr, pg_round_down, MAX_STACK_SIZE, STACK_SLACK, USER_STACK_TOP},
    paging::PageFaultErrorCode,
};

impl AddressSpace {
    /// Resolves a page fault at `addr`.
    ///
    /// On success the faulting access can be retried. An error means the
    /// access was illegal and the process must be terminated, unless the
    /// error [is fatal](VmError::is_fatal), in which case the whole system
    /// is out of memory.
    pub fn resolve_fault(&self, addr: usize, code: PageFaultErrorCode) -> Result<()> {
        trace!(
            "page fault at {:#x} ({}, {})",
            addr,
            if code.write() { "write" } else { "read" },
            if code.not_present() {
                "not present"
            } else {
                "protection"
            }
        );
        self.vm.stats().record_fault();

        if addr == 0 || is_kernel_vaddr(addr) {
            return Err(VmError::InvalidAddress);
        }

        let mut spt = self.spt.lock();
        let page = match spt.find(addr) {
            Some(page) => page,
            None if code.not_present() && self.is_stack_access(addr) => {
                let va = pg_round_down(addr);
                debug!("growing stack to {:#x}", va);
                spt.insert(Page::new(va, true, PageInit::Zeroed))?
            }
            None => return Err(VmError::NotMapped),
        };

        {
            let page = page.lock();
            if code.write() && !page.writable() {
                return Err(VmError::WriteProtectionViolation);
            }
            if !code.not_present() {
                // The page is mapped and the access is allowed: another
                // thread resolved the fault first.
                return Ok(());
            }
        }

        self.claim(&page)
    }

    /// Whether a fault at `addr` looks like the stack growing: within the
    /// stack's reach and no further than [`STACK_SLACK`] below the stack
    /// pointer.
    fn is_stack_access(&self, addr: usize) -> bool {
        (USER_STACK_TOP - MAX_STACK_SIZE..USER_STACK_TOP).contains(&addr)
            && addr + STACK_SLACK >= self.stack_pointer()
    }
}
