//! # KiteOS
//!
//! A preemptive, priority-based Real-Time Operating System (RTOS) kernel
//! for ARM Cortex-M4 microcontrollers.
//!
//! ## Overview
//!
//! KiteOS schedules a fixed set of statically allocated tasks under strict
//! priority preemption: the highest-priority Ready task is always the one
//! running, equal-priority tasks share the CPU round-robin, and the idle
//! task soaks up the rest — entering tickless low-power sleep whenever the
//! system is quiescent. Three synchronization primitives are layered on the
//! scheduler's block/wake machinery:
//!
//! - **Mutex** — recursive, with priority inheritance to bound inversion
//! - **Semaphore** — bounded counting, ISR-safe give with deferred wakeup
//! - **EventFlags** — 32-bit flag groups with Any/All match and auto-clear
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                   Application Tasks                     │
//! ├────────────────────────────────────────────────────────┤
//! │                Kernel API (kernel.rs)                   │
//! │   init() · create_task() · start() · yield_now() ·     │
//! │   sleep_*() · suspend/resume · notify                   │
//! ├──────────────┬────────────────────┬────────────────────┤
//! │  Scheduler   │  Sync Primitives   │  Queues            │
//! │  scheduler.rs│  sync/             │  queue.rs          │
//! │  ─ tick()    │  ─ Mutex           │  ─ ReadyQueue      │
//! │  ─ schedule()│  ─ Semaphore       │  ─ WaitQueue       │
//! │  ─ tickless  │  ─ EventFlags      │  ─ SleepQueue      │
//! ├──────────────┴────────────────────┴────────────────────┤
//! │        Task Model (task.rs) · Pools (pool.rs)           │
//! │        TCB · TaskState · TaskStack · StaticPool         │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │    PendSV · SysTick · Context Switch · Stack Init       │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! Priorities run `0..MAX_PRIORITIES` with **higher numeric value = higher
//! priority**; level 0 belongs to the idle task. Concurrency exists only
//! between task code and interrupt handlers on the single core: all kernel
//! state is guarded by a short interrupt-masking critical section, and the
//! only suspension points are the blocking primitive calls, `yield_now`,
//! the `sleep_*` functions, and time-slice expiry.
//!
//! Every blocking operation takes a tick-denominated timeout and returns
//! `Result`; timeouts are the expected outcome of a bounded wait, not an
//! exceptional condition. Fatal conditions (stack overflow, pool
//! corruption) bypass `Result` entirely and land in a single user-supplied
//! fault handler.
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **No `alloc`**: pure `core` plus `heapless` fixed-capacity collections
//! - **Fixed TCB pool**: `StaticPool<TaskControlBlock, MAX_TASKS>`
//! - **Per-task stack**: `[u8; STACK_SIZE]` inline in the TCB, guarded
//!   against overflow at every context switch
//! - **Critical sections**: `cortex_m::interrupt::free()` for shared state
//!
//! On non-ARM targets the `arch::hosted` stub replaces the port layer so
//! the whole scheduler state machine runs under the host test harness.

#![no_std]

pub mod arch;
pub mod config;
pub mod error;
pub mod kernel;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod sync;
pub mod task;
pub(crate) mod trace;
