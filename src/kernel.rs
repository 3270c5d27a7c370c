//! # Kernel
//!
//! Top-level kernel initialization and the public API surface.
//!
//! The kernel owns the single global [`Scheduler`] instance and routes all
//! access to it through a critical section, so the API is safe to call
//! from task context with the tick interrupt live. The architecture port
//! drives the same instance from the SysTick and PendSV handlers.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← Create the idle task
//!         ├─► kernel::create_task() ← Register tasks (×N)
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Configure SysTick
//!               ├─► Set exception priorities
//!               └─► Dispatch the first task via the port layer
//! ```

use crate::arch::port;
use crate::error::{KernelError, Result};
use crate::scheduler::{Progress, Scheduler, TaskHandle};
use crate::sync::{self, Timeout};
use crate::task::{TaskEntry, TaskId};

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// The kernel context. Accessed only through `with_kernel`, which masks
/// interrupts for the duration of the closure.
static mut KERNEL: Scheduler = Scheduler::new();

/// Run a closure against the global scheduler inside the critical section.
///
/// All public API functions and all ISR glue go through here; nothing else
/// touches `KERNEL`. Masking interrupts serializes task context against
/// the SysTick and PendSV handlers on a single core.
pub(crate) fn with_kernel<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    sync::critical_section(|| unsafe { f(&mut *core::ptr::addr_of_mut!(KERNEL)) })
}

/// Pend a context switch if the last operation left one requested.
pub(crate) fn switch_if_needed() {
    if with_kernel(|k| k.needs_reschedule) {
        port::trigger_context_switch();
    }
}

// ---------------------------------------------------------------------------
// Idle task
// ---------------------------------------------------------------------------

/// The idle task: runs at priority 0 when nothing else is Ready.
///
/// Each pass asks the scheduler for a tickless window. When one exists the
/// whole plan-sleep-compensate sequence runs inside the critical section,
/// so a wake racing the decision pends its interrupt and shortens the
/// sleep instead of being lost. Otherwise the processor waits for the next
/// interrupt at the normal tick cadence.
extern "C" fn idle_entry() -> ! {
    loop {
        let suppressed = with_kernel(|k| match k.tickless_plan() {
            Some(span) => {
                let elapsed = port::suppress_ticks_and_sleep(span);
                k.advance_idle_ticks(elapsed);
                true
            }
            None => false,
        });
        if !suppressed {
            port::wait_for_interrupt();
        }
        switch_if_needed();
    }
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel: creates the idle task. Call exactly once, before
/// any other kernel function.
pub fn init() -> Result<()> {
    with_kernel(|k| k.init(idle_entry)).map(|_| ())
}

/// Create a new task and make it Ready.
///
/// `priority` is in `1..MAX_PRIORITIES` (higher value = higher priority);
/// `stack_size` is validated against the fixed per-task stack slot. If the
/// new task outranks the caller it runs immediately.
pub fn create_task(
    entry: TaskEntry,
    stack_size: usize,
    priority: u8,
    name: &'static str,
) -> Result<TaskHandle> {
    let handle = with_kernel(|k| k.create_task(entry, stack_size, priority, name))?;
    switch_if_needed();
    Ok(handle)
}

/// Start the scheduler. **Does not return.**
///
/// Requires `init()` and at least one task; without any task the processor
/// is parked instead.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    port::configure_systick(&mut core_peripherals.SYST);
    port::set_exception_priorities();

    if !with_kernel(|k| k.task_count() > 0) {
        loop {
            cortex_m::asm::wfi();
        }
    }
    let first_sp = with_kernel(|k| k.resume_context());
    unsafe { port::start_first_task(first_sp) }
}

/// Voluntarily give up the remainder of the current time slice.
pub fn yield_now() {
    with_kernel(|k| k.yield_current());
    switch_if_needed();
}

/// Sleep the calling task for a number of ticks.
pub fn sleep_for(ticks: u32) -> Result<()> {
    with_kernel(|k| k.sleep_for(ticks))?;
    switch_if_needed();
    Ok(())
}

/// Sleep the calling task until an absolute tick. A tick already in the
/// past returns immediately.
pub fn sleep_until(wake_tick: u64) -> Result<()> {
    with_kernel(|k| k.sleep_until(wake_tick))?;
    switch_if_needed();
    Ok(())
}

/// Remove a task from scheduling until [`resume`].
pub fn suspend(task: TaskHandle) -> Result<()> {
    with_kernel(|k| k.suspend(task.id()))?;
    switch_if_needed();
    Ok(())
}

/// Make a suspended task Ready again.
pub fn resume(task: TaskHandle) -> Result<()> {
    with_kernel(|k| k.resume(task.id()))?;
    switch_if_needed();
    Ok(())
}

/// Terminate a task and return its TCB slot to the pool. Terminating the
/// calling task takes effect at the next context switch.
pub fn terminate(task: TaskHandle) -> Result<()> {
    with_kernel(|k| k.terminate(task.id()))?;
    switch_if_needed();
    Ok(())
}

/// Terminate the calling task. The switch away is the task's last act.
pub fn exit_current() -> Result<()> {
    with_kernel(|k| match k.current_task() {
        Some(tid) => k.terminate(tid),
        None => Err(KernelError::InvalidState),
    })?;
    switch_if_needed();
    Ok(())
}

/// Deliver a direct-to-task notification value. Wakes the target if it is
/// blocked in [`wait_notification`]; otherwise the value is latched.
pub fn notify(task: TaskHandle, value: u32) -> Result<()> {
    with_kernel(|k| k.notify(task.id(), value))?;
    switch_if_needed();
    Ok(())
}

/// Wait for a notification, returning its value. A latched value is
/// consumed without blocking.
pub fn wait_notification(timeout: Timeout) -> Result<u32> {
    match with_kernel(|k| k.notification_wait(timeout))? {
        Progress::Done(value) => Ok(value),
        Progress::Pending => {
            port::trigger_context_switch();
            with_kernel(|k| k.take_current_wake_outcome())
        }
    }
}

/// Monotonic tick count since start, tickless skips included.
pub fn ticks() -> u64 {
    with_kernel(|k| k.ticks())
}

/// Id of the calling (running) task.
pub fn current_task() -> Option<TaskId> {
    with_kernel(|k| k.current_task())
}

// ---------------------------------------------------------------------------
// ISR entry points (called from the Cortex-M4 port)
// ---------------------------------------------------------------------------

/// SysTick body: advance kernel time and pend a switch if one is due.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn tick_from_isr() {
    let needed = with_kernel(|k| {
        k.tick();
        k.needs_reschedule
    });
    if needed {
        port::trigger_context_switch();
    }
}

/// PendSV save half: record the outgoing task's stack pointer.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn save_context_from_isr(psp: usize) {
    with_kernel(|k| k.save_context(psp));
}

/// PendSV restore half: dispatch and return the incoming stack pointer.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn resume_context_from_isr() -> usize {
    with_kernel(|k| k.resume_context())
}
