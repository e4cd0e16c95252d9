//! Kernel locks.
//!
//! With the `ticket_mutex` feature every lock is a FIFO ticket lock, so a
//! thread spinning on the frame table cannot be starved by a steady stream of
//! faults on other CPUs. Without it a plain test-and-set spin lock is used.

#[cfg(feature = "ticket_mutex")]
pub type Mutex<T> = spin::mutex::TicketMutex<T>;
#[cfg(feature = "ticket_mutex")]
pub type MutexGuard<'a, T> = spin::mutex::TicketMutexGuard<'a, T>;

#[cfg(not(feature = "ticket_mutex"))]
pub type Mutex<T> = spin::mutex::SpinMutex<T>;
#[cfg(not(feature = "ticket_mutex"))]
pub type MutexGuard<'a, T> = spin::mutex::SpinMutexGuard<'a, T>;
