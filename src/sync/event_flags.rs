//! # Event Flag Groups
//!
//! A 32-bit flag word multiple tasks can wait on, each with its own match
//! condition: any bit of a mask, or all of them, with optional auto-clear
//! on wake. Setting bits evaluates every waiter against the updated word
//! in priority order and only wakes those whose own condition became true;
//! auto-clear masks are accumulated during the scan and applied after it,
//! so every waiter of the same set sees the same snapshot.

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::error::{KernelError, Result};
use crate::kernel;
use crate::queue::WaitQueue;
use crate::scheduler::{Progress, Scheduler};
use crate::sync::Timeout;
use crate::task::{TaskId, WaitTarget, WakeOutcome};

/// Waiter match mode: wake on any bit of the mask, or only on all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitMode {
    Any,
    All,
}

/// Pool-resident state of one event group.
pub(crate) struct EventFlagsControl {
    pub(crate) bits: u32,
    pub(crate) waiters: WaitQueue,
}

impl EventFlagsControl {
    pub(crate) const EMPTY: Self = Self {
        bits: 0,
        waiters: WaitQueue::new(),
    };
}

#[inline]
fn condition_met(bits: u32, mask: u32, all: bool) -> bool {
    if all {
        bits & mask == mask
    } else {
        bits & mask != 0
    }
}

// ---------------------------------------------------------------------------
// Scheduler operations
// ---------------------------------------------------------------------------

impl Scheduler {
    pub(crate) fn event_create(&mut self) -> Result<u8> {
        let index = self.event_flags.alloc()?;
        self.event_flags.slot_mut(index).bits = 0;
        Ok(index as u8)
    }

    pub(crate) fn event_wait(
        &mut self,
        index: u8,
        mask: u32,
        mode: WaitMode,
        timeout: Timeout,
        auto_clear: bool,
    ) -> Result<Progress> {
        if mask == 0 {
            return Err(KernelError::InvalidState);
        }
        let cur = self.ensure_can_block()?;
        let bits = self
            .event_flags
            .get(index as usize)
            .ok_or(KernelError::InvalidState)?
            .bits;
        let all = mode == WaitMode::All;
        if condition_met(bits, mask, all) {
            if auto_clear {
                self.event_flags.slot_mut(index as usize).bits &= !mask;
            }
            return Ok(Progress::Done(bits));
        }
        if timeout == Timeout::Ticks(0) {
            return Err(KernelError::Timeout);
        }
        let priority = {
            let tcb = self.tasks.slot_mut(cur.index());
            tcb.event_mask = mask;
            tcb.event_all = all;
            tcb.event_auto_clear = auto_clear;
            tcb.effective_priority
        };
        self.event_flags
            .slot_mut(index as usize)
            .waiters
            .insert(cur, priority);
        self.block_task(cur, WaitTarget::EventFlags(index), timeout);
        Ok(Progress::Pending)
    }

    /// Set bits and wake every waiter whose condition became true. Returns
    /// the flag word after any auto-clears.
    pub(crate) fn event_set(&mut self, index: u8, mask: u32) -> Result<u32> {
        let control = self
            .event_flags
            .get_mut(index as usize)
            .ok_or(KernelError::InvalidState)?;
        control.bits |= mask;
        let bits_now = control.bits;

        // Evaluate all waiters against the same snapshot before any clear
        // takes effect.
        let mut woken: Vec<TaskId, MAX_TASKS> = Vec::new();
        for tid in self.event_flags.slot(index as usize).waiters.tasks() {
            let tcb = self.tasks.slot(tid.index());
            if condition_met(bits_now, tcb.event_mask, tcb.event_all) {
                let _ = woken.push(tid);
            }
        }

        let mut clear = 0u32;
        for &tid in woken.iter() {
            self.event_flags.slot_mut(index as usize).waiters.remove(tid);
            let tcb = self.tasks.slot(tid.index());
            if tcb.event_auto_clear {
                clear |= tcb.event_mask;
            }
            self.wake_task(tid, WakeOutcome::Signaled(bits_now));
        }

        let control = self.event_flags.slot_mut(index as usize);
        control.bits &= !clear;
        Ok(control.bits)
    }

    /// Clear bits; returns the flag word before the clear.
    pub(crate) fn event_clear(&mut self, index: u8, mask: u32) -> Result<u32> {
        let control = self
            .event_flags
            .get_mut(index as usize)
            .ok_or(KernelError::InvalidState)?;
        let previous = control.bits;
        control.bits &= !mask;
        Ok(previous)
    }

    pub(crate) fn event_get(&self, index: u8) -> Result<u32> {
        self.event_flags
            .get(index as usize)
            .map(|control| control.bits)
            .ok_or(KernelError::InvalidState)
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A group of 32 event flags. Copyable handle to pool-resident state.
#[derive(Debug, Clone, Copy)]
pub struct EventFlags {
    index: u8,
}

impl EventFlags {
    /// Allocate an event group with all flags clear.
    pub fn new() -> Result<Self> {
        kernel::with_kernel(|k| k.event_create()).map(|index| Self { index })
    }

    /// Set flags, waking waiters whose condition becomes true. Returns the
    /// flag word after auto-clears.
    pub fn set_bits(&self, mask: u32) -> Result<u32> {
        let bits = kernel::with_kernel(|k| k.event_set(self.index, mask))?;
        kernel::switch_if_needed();
        Ok(bits)
    }

    /// Clear flags; returns the word as it was before.
    pub fn clear_bits(&self, mask: u32) -> Result<u32> {
        kernel::with_kernel(|k| k.event_clear(self.index, mask))
    }

    /// Current flag word.
    pub fn get(&self) -> Result<u32> {
        kernel::with_kernel(|k| k.event_get(self.index))
    }

    /// Wait until `mask` matches per `mode`, blocking up to `timeout`.
    /// Returns the flag word at wake time; with `auto_clear` the matched
    /// mask is removed from the group once the wait completes.
    pub fn wait(
        &self,
        mask: u32,
        mode: WaitMode,
        timeout: Timeout,
        auto_clear: bool,
    ) -> Result<u32> {
        match kernel::with_kernel(|k| k.event_wait(self.index, mask, mode, timeout, auto_clear))? {
            Progress::Done(bits) => Ok(bits),
            Progress::Pending => {
                crate::arch::port::trigger_context_switch();
                kernel::with_kernel(|k| k.take_current_wake_outcome())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::task::TaskState;

    extern "C" fn noop_entry() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn booted() -> Scheduler {
        let mut sched = Scheduler::new();
        sched.init(noop_entry).unwrap();
        sched
    }

    fn run_tick(sched: &mut Scheduler) {
        sched.tick();
        if sched.needs_reschedule {
            sched.schedule();
        }
    }

    #[test]
    fn wait_returns_immediately_when_condition_already_true() {
        let mut sched = booted();
        sched.create_task(noop_entry, 256, 3, "a").unwrap();
        sched.schedule();
        let e = sched.event_create().unwrap();
        sched.event_set(e, 0b0110).unwrap();
        assert_eq!(
            sched.event_wait(e, 0b0010, WaitMode::Any, Timeout::Forever, false),
            Ok(Progress::Done(0b0110))
        );
        // Auto-clear consumes the matched mask.
        assert_eq!(
            sched.event_wait(e, 0b0110, WaitMode::All, Timeout::Forever, true),
            Ok(Progress::Done(0b0110))
        );
        assert_eq!(sched.event_get(e), Ok(0));
    }

    #[test]
    fn all_mode_ignores_partial_sets() {
        let mut sched = booted();
        let a = sched.create_task(noop_entry, 256, 3, "a").unwrap();
        sched.schedule();
        let e = sched.event_create().unwrap();
        assert_eq!(
            sched.event_wait(e, 0b0011, WaitMode::All, Timeout::Forever, false),
            Ok(Progress::Pending)
        );
        sched.schedule();

        // A subset of the mask must not wake the waiter.
        sched.event_set(e, 0b0001).unwrap();
        assert_eq!(sched.task_state(a.id()), TaskState::Blocked);

        // Completing the mask wakes it exactly then.
        sched.event_set(e, 0b0010).unwrap();
        sched.schedule();
        assert_eq!(sched.current_task(), Some(a.id()));
        assert_eq!(sched.take_current_wake_outcome(), Ok(0b0011));
    }

    #[test]
    fn any_mode_wakes_on_first_matching_bit() {
        let mut sched = booted();
        let a = sched.create_task(noop_entry, 256, 3, "a").unwrap();
        sched.schedule();
        let e = sched.event_create().unwrap();
        assert_eq!(
            sched.event_wait(e, 0b1100, WaitMode::Any, Timeout::Forever, false),
            Ok(Progress::Pending)
        );
        sched.schedule();

        sched.event_set(e, 0b0100).unwrap();
        sched.schedule();
        assert_eq!(sched.current_task(), Some(a.id()));
        assert_eq!(sched.take_current_wake_outcome(), Ok(0b0100));
    }

    #[test]
    fn unrelated_bits_do_not_wake_unrelated_waiters() {
        let mut sched = booted();
        let a = sched.create_task(noop_entry, 256, 3, "a").unwrap();
        sched.schedule();
        let e = sched.event_create().unwrap();
        assert_eq!(
            sched.event_wait(e, 0b1000, WaitMode::Any, Timeout::Forever, false),
            Ok(Progress::Pending)
        );
        sched.schedule();

        sched.event_set(e, 0b0111).unwrap();
        assert_eq!(sched.task_state(a.id()), TaskState::Blocked);
    }

    #[test]
    fn auto_clear_applies_after_all_waiters_evaluated() {
        let mut sched = booted();
        let a = sched.create_task(noop_entry, 256, 3, "a").unwrap();
        let b = sched.create_task(noop_entry, 256, 2, "b").unwrap();
        sched.schedule();
        let e = sched.event_create().unwrap();

        // Both tasks wait on the same bit; the higher-priority one clears.
        assert_eq!(
            sched.event_wait(e, 0b0001, WaitMode::Any, Timeout::Forever, true),
            Ok(Progress::Pending)
        );
        sched.schedule();
        assert_eq!(sched.current_task(), Some(b.id()));
        assert_eq!(
            sched.event_wait(e, 0b0001, WaitMode::Any, Timeout::Forever, false),
            Ok(Progress::Pending)
        );
        sched.schedule();

        let after = sched.event_set(e, 0b0001).unwrap();
        // Both waiters saw the bit; the auto-clear landed afterwards.
        assert_eq!(after, 0);
        sched.schedule();
        assert_eq!(sched.current_task(), Some(a.id()));
        assert_eq!(sched.take_current_wake_outcome(), Ok(0b0001));
        sched.suspend(a.id()).unwrap();
        sched.schedule();
        assert_eq!(sched.current_task(), Some(b.id()));
        assert_eq!(sched.take_current_wake_outcome(), Ok(0b0001));
    }

    #[test]
    fn wait_times_out_and_leaves_queue() {
        let mut sched = booted();
        let a = sched.create_task(noop_entry, 256, 3, "a").unwrap();
        sched.schedule();
        let e = sched.event_create().unwrap();
        assert_eq!(
            sched.event_wait(e, 0b0001, WaitMode::Any, Timeout::Ticks(2), false),
            Ok(Progress::Pending)
        );
        sched.schedule();
        run_tick(&mut sched);
        run_tick(&mut sched);
        assert_eq!(sched.current_task(), Some(a.id()));
        assert_eq!(
            sched.take_current_wake_outcome(),
            Err(KernelError::Timeout)
        );
        // A later set finds no stale waiter.
        assert_eq!(sched.event_set(e, 0b0001), Ok(0b0001));
    }

    #[test]
    fn clear_bits_returns_previous_word() {
        let mut sched = booted();
        let e = sched.event_create().unwrap();
        sched.event_set(e, 0b1010).unwrap();
        assert_eq!(sched.event_clear(e, 0b0010), Ok(0b1010));
        assert_eq!(sched.event_get(e), Ok(0b1000));
    }

    #[test]
    fn zero_mask_wait_is_rejected() {
        let mut sched = booted();
        sched.create_task(noop_entry, 256, 3, "a").unwrap();
        sched.schedule();
        let e = sched.event_create().unwrap();
        assert_eq!(
            sched.event_wait(e, 0, WaitMode::Any, Timeout::Forever, false),
            Err(KernelError::InvalidState)
        );
    }
}
