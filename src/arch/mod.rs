//! # Architecture Port Layer
//!
//! Hardware abstraction boundary for the scheduler. The kernel consumes a
//! small port surface — stack frame initialization, a way to pend a
//! context switch, the tick source, low-power wait — and nothing else.
//!
//! Bare-metal ARM builds get the Cortex-M4 port; every other target gets
//! the hosted stub, which lets the entire scheduler state machine run
//! under the host test harness.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use cortex_m4 as port;

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub mod hosted;
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub use hosted as port;
