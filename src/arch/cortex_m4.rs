//! # Cortex-M4 Port
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! context switching via PendSV, SysTick configuration and tickless
//! reprogramming, initial stack frames, and the first-task launch.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): used by tasks in Thread mode
//!
//! On exception entry the hardware stacks R0–R3, R12, LR, PC, and xPSR onto
//! the process stack. The PendSV handler saves and restores R4–R11, which
//! completes the full context. The saved stack pointer is handed to the
//! scheduler as a byte offset into the task's own stack buffer; this module
//! is the only place offsets become real pointers.
//!
//! ## Interrupt Priorities
//!
//! SysTick and PendSV both run at the lowest priority (0xFF), so a context
//! switch never preempts an application ISR and PendSV fires only once all
//! other handlers have unwound.

use core::arch::{asm, naked_asm};
use core::ptr;

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m_rt::exception;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::error::Fault;
use crate::task::{TaskControlBlock, TaskEntry, TaskStack};

/// Interrupt Control and State Register.
const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
/// System Handler Priority Register 3 (PendSV, SysTick).
const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
const PENDSVSET: u32 = 1 << 28;

// SysTick registers, accessed raw so the tickless path does not need the
// (singleton) peripheral struct owned by `kernel::start`.
const SYST_CSR: *mut u32 = 0xE000_E010 as *mut u32;
const SYST_RVR: *mut u32 = 0xE000_E014 as *mut u32;
const SYST_CVR: *mut u32 = 0xE000_E018 as *mut u32;
const CSR_ENABLE: u32 = 1 << 0;
const CSR_TICKINT: u32 = 1 << 1;
const CSR_CLKSOURCE: u32 = 1 << 2;
const CSR_COUNTFLAG: u32 = 1 << 16;

/// Core cycles per scheduler tick.
const CYCLES_PER_TICK: u32 = SYSTEM_CLOCK_HZ / TICK_HZ;

/// Initial xPSR for a fresh task: Thumb bit set, everything else clear.
const INITIAL_XPSR: u32 = 0x0100_0000;

// ---------------------------------------------------------------------------
// Stack initialization
// ---------------------------------------------------------------------------

/// Build the initial context frame on a task's stack so the first switch
/// into it looks like an ordinary exception return.
///
/// Layout, high to low address: xPSR, PC (entry), LR (exit trap), R12,
/// R3–R0 (hardware frame), then R11–R4 (software frame). The saved stack
/// pointer is recorded in the TCB as an offset to the software frame base.
pub fn init_stack(tcb: &mut TaskControlBlock, entry: TaskEntry) {
    let base = tcb.stack.base();
    let top = base + TaskStack::top_offset();
    unsafe {
        let mut sp = top as *mut u32;

        sp = sp.sub(1);
        ptr::write(sp, INITIAL_XPSR);
        sp = sp.sub(1);
        // Bit 0 must be clear in a stacked PC.
        ptr::write(sp, entry as usize as u32 & !1);
        sp = sp.sub(1);
        ptr::write(sp, task_exit_trap as usize as u32);
        // R12, R3, R2, R1, R0: left as fill pattern.
        sp = sp.sub(5);
        // R11..R4: left as fill pattern.
        sp = sp.sub(8);

        tcb.sp_offset = sp as usize - base;
    }
}

/// Landing pad for a task that returns from its entry function. Entries are
/// declared diverging, so reaching this means the stack frame was
/// corrupted; park the core.
extern "C" fn task_exit_trap() -> ! {
    cortex_m::interrupt::disable();
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Tick source
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the processor clock.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    syst.set_reload(CYCLES_PER_TICK - 1);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Set PendSV and SysTick to the lowest exception priority.
pub fn set_exception_priorities() {
    unsafe {
        // SHPR3 bits [23:16] = PendSV, [31:24] = SysTick.
        let val = ptr::read_volatile(SHPR3) | (0xFF << 16) | (0xFF << 24);
        ptr::write_volatile(SHPR3, val);
    }
}

/// SysTick handler: advance kernel time, pend a switch if one became due.
#[exception]
fn SysTick() {
    crate::kernel::tick_from_isr();
}

// ---------------------------------------------------------------------------
// Context switch
// ---------------------------------------------------------------------------

/// Pend a PendSV exception. The switch itself runs once every other
/// handler has unwound, keeping interrupt latency unaffected.
#[inline]
pub fn trigger_context_switch() {
    unsafe {
        ptr::write_volatile(ICSR, PENDSVSET);
    }
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// Park until the next interrupt at the normal tick cadence.
#[inline]
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

extern "C" fn pendsv_save(psp: usize) {
    crate::kernel::save_context_from_isr(psp);
}

extern "C" fn pendsv_resume() -> usize {
    crate::kernel::resume_context_from_isr()
}

/// PendSV handler: the context switch.
///
/// Saves R4–R11 below the hardware frame on the outgoing task's process
/// stack, records the resulting stack pointer in its TCB, asks the
/// scheduler for the next task, and unwinds into that task's saved frame.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        // Save the outgoing context under the hardware-stacked frame.
        "mrs r0, psp",
        "isb",
        "stmdb r0!, {{r4-r11}}",
        // r3 is pushed only to keep the stack 8-byte aligned for the calls.
        "push {{r3, lr}}",
        "bl {save}",
        "bl {resume}",
        "pop {{r3, lr}}",
        // r0 holds the incoming task's stack pointer.
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "isb",
        "bx lr",
        save = sym pendsv_save,
        resume = sym pendsv_resume,
    );
}

/// Launch the first task. Called once from `kernel::start`; never returns.
///
/// `sp` points at the task's software frame. Thread mode is switched onto
/// the process stack and the fabricated hardware frame is consumed by
/// hand, ending in a branch to the task entry.
pub unsafe fn start_first_task(sp: usize) -> ! {
    asm!(
        // Skip the software frame; the first dispatch has nothing to
        // restore into R4-R11.
        "adds r0, #32",
        "msr psp, r0",
        // CONTROL.SPSEL = 1: Thread mode runs on PSP from here on.
        "movs r0, #2",
        "msr control, r0",
        "isb",
        // Consume the fabricated hardware frame. r4 takes the LR slot
        // (unused: entries diverge), r5 the PC, r6 the xPSR.
        "pop {{r0-r3, r12}}",
        "pop {{r4}}",
        "pop {{r5}}",
        "pop {{r6}}",
        "cpsie i",
        "dsb",
        "isb",
        "bx r5",
        in("r0") sp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// Tickless idle
// ---------------------------------------------------------------------------

/// Reprogram SysTick for a single `span`-tick interval, sleep, and report
/// how many whole ticks actually elapsed.
///
/// Called by the idle task with interrupts masked, so the decision to
/// sleep cannot race a wake: an interrupt arriving after the mask pends
/// and ends the WFI immediately. When the full interval runs out the
/// final tick is left to the pending SysTick interrupt, which fires
/// through the normal `tick()` path once interrupts unmask — so `span - 1`
/// ticks are folded in here and the counter still lands exactly on the
/// wake deadline.
pub fn suppress_ticks_and_sleep(span: u32) -> u32 {
    unsafe {
        // Stop the counter while the long interval is programmed.
        ptr::write_volatile(SYST_CSR, CSR_CLKSOURCE | CSR_TICKINT);
        let remaining = ptr::read_volatile(SYST_CVR);
        let reload = remaining + CYCLES_PER_TICK * (span - 1);
        ptr::write_volatile(SYST_RVR, reload);
        ptr::write_volatile(SYST_CVR, 0);
        ptr::write_volatile(SYST_CSR, CSR_CLKSOURCE | CSR_TICKINT | CSR_ENABLE);

        cortex_m::asm::dsb();
        cortex_m::asm::wfi();
        cortex_m::asm::isb();

        // Stop again; COUNTFLAG tells whether the interval completed or an
        // earlier interrupt ended the sleep. Reading CSR clears the flag.
        let csr = ptr::read_volatile(SYST_CSR);
        ptr::write_volatile(SYST_CSR, CSR_CLKSOURCE | CSR_TICKINT);

        let elapsed = if csr & CSR_COUNTFLAG != 0 {
            // Interval ran out; the pending tick interrupt delivers the
            // final tick.
            span - 1
        } else {
            let left = ptr::read_volatile(SYST_CVR);
            (reload - left) / CYCLES_PER_TICK
        };

        // Back to the normal one-tick cadence.
        ptr::write_volatile(SYST_RVR, CYCLES_PER_TICK - 1);
        ptr::write_volatile(SYST_CVR, 0);
        ptr::write_volatile(SYST_CSR, CSR_CLKSOURCE | CSR_TICKINT | CSR_ENABLE);

        elapsed
    }
}

// ---------------------------------------------------------------------------
// Fault sink
// ---------------------------------------------------------------------------

/// Default fatal-fault sink when no user handler is installed: mask
/// interrupts and park the core. Task state is not trusted at this point.
pub fn halt(_fault: Fault) -> ! {
    cortex_m::interrupt::disable();
    loop {
        cortex_m::asm::bkpt();
    }
}
