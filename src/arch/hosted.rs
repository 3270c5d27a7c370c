//! # Hosted Port
//!
//! No-op port for host builds. Unit tests construct a `Scheduler` and
//! drive `tick()`/`schedule()` directly, playing the role of the SysTick
//! and PendSV handlers, so nothing here touches real hardware.

use crate::error::Fault;
use crate::task::{TaskControlBlock, TaskEntry};

/// No hardware frame to fabricate: the saved stack pointer stays at the
/// stack top set by TCB initialization.
pub fn init_stack(_tcb: &mut TaskControlBlock, _entry: TaskEntry) {}

/// Context switches are performed by the test calling `schedule()`.
pub fn trigger_context_switch() {}

pub fn wait_for_interrupt() {
    core::hint::spin_loop();
}

/// Pretend the full interval elapsed; the tickless tests verify the
/// compensation arithmetic against this.
pub fn suppress_ticks_and_sleep(span: u32) -> u32 {
    span
}

/// Fatal faults surface as panics so the test harness can observe them.
pub fn halt(fault: Fault) -> ! {
    panic!("fatal kernel fault: {:?}", fault);
}
