//! # Error Model
//!
//! Recoverable errors are surfaced as [`KernelError`] through the
//! [`Result`] alias; every public kernel operation returns one. Fatal
//! conditions — stack overflow, pool corruption — are not errors: task
//! state may be unreliable at that point, so they are routed to a single
//! user-supplied fault handler and never return.

use crate::task::TaskId;

/// Result type alias for kernel operations.
pub type Result<T> = core::result::Result<T, KernelError>;

/// Recoverable kernel errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// A fixed-capacity pool has no free slot. The caller may retry after
    /// another object is released, or fail gracefully.
    PoolExhausted,
    /// A bounded wait expired before the resource became available. The
    /// expected outcome of any blocking call with a tick timeout.
    Timeout,
    /// The operation does not apply in the current state — unlocking a
    /// mutex the caller does not own, giving a semaphore already at its
    /// maximum, suspending a blocked task, or passing an out-of-range
    /// priority or stack size.
    InvalidState,
}

/// Fatal conditions. No safe continuation exists once one is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// A task's stack guard was corrupted — detected at a context switch.
    StackOverflow(TaskId),
    /// A pool free list was asked to release a slot that is not allocated.
    PoolCorruption,
}

/// User-supplied fault handler. Must not return; typical implementations
/// log over a debug channel and park the processor or reset it.
pub type FaultHandler = fn(Fault) -> !;

static mut FAULT_HANDLER: Option<FaultHandler> = None;

/// Install the fault handler invoked on fatal conditions.
///
/// Call once during system bring-up, before `kernel::start()`. Without a
/// handler the kernel parks the processor (on the host it panics, which is
/// what the test suite observes).
pub fn set_fault_handler(handler: FaultHandler) {
    crate::sync::critical_section(|| unsafe {
        *core::ptr::addr_of_mut!(FAULT_HANDLER) = Some(handler);
    });
}

/// Raise a fatal fault. Diverges into the user handler or the default sink.
pub(crate) fn raise(fault: Fault) -> ! {
    let handler = crate::sync::critical_section(|| unsafe {
        *core::ptr::addr_of!(FAULT_HANDLER)
    });
    if let Some(handler) = handler {
        handler(fault);
    }
    crate::arch::port::halt(fault)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic]
    fn unhandled_fault_panics_on_host() {
        raise(Fault::PoolCorruption);
    }
}
