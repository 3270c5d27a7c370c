//! # KiteOS Configuration
//!
//! Compile-time constants governing the kernel. All limits are fixed at
//! compile time — no dynamic allocation anywhere in the system.

/// Maximum number of tasks the system can manage simultaneously, including
/// the idle task. Bounds the static TCB pool. Increase with care — each
/// slot carries `STACK_SIZE` bytes of RAM.
pub const MAX_TASKS: usize = 8;

/// Number of priority levels. Priorities are `0..MAX_PRIORITIES`, where a
/// **higher numeric value means higher priority**. Level 0 is reserved for
/// the idle task; application tasks use `1..MAX_PRIORITIES`.
pub const MAX_PRIORITIES: usize = 8;

/// SysTick frequency in Hz. Determines scheduler tick granularity.
pub const TICK_HZ: u32 = 1000;

/// Round-robin time slice in ticks. A task at the same priority as other
/// ready tasks is preempted after this many ticks and rotated to the back
/// of its priority bucket.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Per-task stack size in bytes. Must cover the deepest call chain plus the
/// hardware exception frame (32 bytes) and the software-saved context
/// (32 bytes for R4–R11).
pub const STACK_SIZE: usize = 1024;

/// Number of `u32` guard words planted at the low end of every task stack.
/// The guard is checked on each context switch; a corrupted guard means the
/// task overflowed its stack and is fatal.
pub const STACK_GUARD_WORDS: usize = 4;

/// Fill pattern for unused stack memory and guard words.
pub const STACK_FILL: u32 = 0xA5A5_A5A5;

/// Capacity of the mutex pool.
pub const MAX_MUTEXES: usize = 8;

/// Capacity of the counting-semaphore pool.
pub const MAX_SEMAPHORES: usize = 8;

/// Capacity of the event-flag-group pool.
pub const MAX_EVENT_FLAGS: usize = 4;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Upper bound on the number of ticks a single tickless-idle interval may
/// suppress. The SysTick counter is 24 bits wide, so one reprogrammed
/// interval can span at most `0xFF_FFFF` core cycles.
pub const MAX_SUPPRESSED_TICKS: u32 = 0xFF_FFFF / (SYSTEM_CLOCK_HZ / TICK_HZ);
