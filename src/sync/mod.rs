//! # Synchronization
//!
//! The interrupt-masking critical section protecting all kernel state, and
//! the three inter-task primitives built on top of the scheduler's
//! block/wake machinery: [`Mutex`], [`Semaphore`], and [`EventFlags`].
//!
//! Every kernel entry point — API calls, the tick and context-switch
//! handlers, ISR-side gives — wraps its work in [`critical_section`];
//! scheduler methods themselves never mask interrupts. The `Mutex`
//! primitive is layered strictly on top of this and is never used to
//! protect kernel internals.

pub mod event_flags;
pub mod mutex;
pub mod semaphore;

pub use event_flags::{EventFlags, WaitMode};
pub use mutex::Mutex;
pub use semaphore::Semaphore;

/// Bound on a blocking call, in ticks. `Ticks(0)` polls: the operation
/// either completes immediately or fails with `Timeout` without blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// Wait indefinitely.
    Forever,
    /// Give up after this many ticks with `KernelError::Timeout`.
    Ticks(u32),
}

/// Execute a closure with interrupts masked.
///
/// This is the only mechanism guarding shared kernel state. Interrupts are
/// disabled on entry and restored on exit; nesting is safe. Keep the
/// enclosed work short — it bounds interrupt latency for the whole system.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    cortex_m::interrupt::free(|_| f())
}

/// Host build: tests drive the scheduler from a single thread, so the
/// critical section reduces to a plain call.
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}
