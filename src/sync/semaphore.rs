//! # Counting Semaphore
//!
//! Bounded counting semaphore with priority-ordered waiters. A `give` with
//! waiters present hands the count directly to the highest-priority waiter
//! instead of incrementing, so the count can never overshoot and a woken
//! waiter never races a third task for the count it was given.
//!
//! `give_from_isr` is the one kernel operation legal in interrupt context:
//! it bumps the count and flags the semaphore for the scheduler, which
//! resolves the wakeup at the next safe point (tick or schedule pass)
//! rather than switching contexts inside the interrupt.

use crate::error::{KernelError, Result};
use crate::kernel;
use crate::queue::WaitQueue;
use crate::scheduler::{Progress, Scheduler};
use crate::sync::Timeout;
use crate::task::{WaitTarget, WakeOutcome};

/// Pool-resident state of one semaphore.
pub(crate) struct SemaphoreControl {
    pub(crate) count: u32,
    pub(crate) max_count: u32,
    pub(crate) waiters: WaitQueue,
}

impl SemaphoreControl {
    pub(crate) const EMPTY: Self = Self {
        count: 0,
        max_count: 0,
        waiters: WaitQueue::new(),
    };
}

// ---------------------------------------------------------------------------
// Scheduler operations
// ---------------------------------------------------------------------------

impl Scheduler {
    pub(crate) fn semaphore_create(&mut self, initial: u32, max_count: u32) -> Result<u8> {
        if max_count == 0 || initial > max_count {
            return Err(KernelError::InvalidState);
        }
        let index = self.semaphores.alloc()?;
        let control = self.semaphores.slot_mut(index);
        control.count = initial;
        control.max_count = max_count;
        Ok(index as u8)
    }

    pub(crate) fn semaphore_take(&mut self, index: u8, timeout: Timeout) -> Result<Progress> {
        let cur = self.ensure_can_block()?;
        let control = self
            .semaphores
            .get_mut(index as usize)
            .ok_or(KernelError::InvalidState)?;
        if control.count > 0 {
            control.count -= 1;
            return Ok(Progress::Done(0));
        }
        if timeout == Timeout::Ticks(0) {
            return Err(KernelError::Timeout);
        }
        let priority = self.tasks.slot(cur.index()).effective_priority;
        self.semaphores
            .slot_mut(index as usize)
            .waiters
            .insert(cur, priority);
        self.block_task(cur, WaitTarget::Semaphore(index), timeout);
        Ok(Progress::Pending)
    }

    pub(crate) fn semaphore_try_take(&mut self, index: u8) -> Result<bool> {
        let control = self
            .semaphores
            .get_mut(index as usize)
            .ok_or(KernelError::InvalidState)?;
        if control.count > 0 {
            control.count -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub(crate) fn semaphore_give(&mut self, index: u8) -> Result<()> {
        let waiter = self
            .semaphores
            .get_mut(index as usize)
            .ok_or(KernelError::InvalidState)?
            .waiters
            .pop_front();
        match waiter {
            Some(tid) => {
                // Direct handoff: the count passes to the waiter without
                // ever becoming observable.
                self.wake_task(tid, WakeOutcome::Signaled(0));
                Ok(())
            }
            None => {
                let control = self.semaphores.slot_mut(index as usize);
                if control.count >= control.max_count {
                    return Err(KernelError::InvalidState);
                }
                control.count += 1;
                Ok(())
            }
        }
    }

    /// Interrupt-side give: count the token, flag the semaphore, let the
    /// scheduler wake the waiter at the next safe point.
    pub(crate) fn semaphore_give_from_isr(&mut self, index: u8) -> Result<()> {
        let control = self
            .semaphores
            .get_mut(index as usize)
            .ok_or(KernelError::InvalidState)?;
        if control.count >= control.max_count {
            return Err(KernelError::InvalidState);
        }
        control.count += 1;
        self.deferred_gives |= 1 << index;
        Ok(())
    }

    /// Deliver tokens flagged by `give_from_isr` to blocked waiters. A
    /// running task that took the count in the meantime simply consumed the
    /// give first; the waiter stays blocked for the next one.
    pub(crate) fn semaphore_resolve_deferred(&mut self, index: u8) {
        loop {
            let control = self.semaphores.slot_mut(index as usize);
            if control.count == 0 {
                break;
            }
            let Some(tid) = control.waiters.pop_front() else {
                break;
            };
            control.count -= 1;
            self.wake_task(tid, WakeOutcome::Signaled(0));
        }
    }

    #[cfg(test)]
    pub(crate) fn semaphore_count(&self, index: u8) -> u32 {
        self.semaphores.slot(index as usize).count
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A counting semaphore. Copyable handle to pool-resident state; lives for
/// the lifetime of the system.
#[derive(Debug, Clone, Copy)]
pub struct Semaphore {
    index: u8,
}

impl Semaphore {
    /// Allocate a semaphore holding `initial` tokens, bounded by
    /// `max_count`.
    pub fn new(initial: u32, max_count: u32) -> Result<Self> {
        kernel::with_kernel(|k| k.semaphore_create(initial, max_count))
            .map(|index| Self { index })
    }

    /// Take a token, blocking up to `timeout` when none is available.
    pub fn take(&self, timeout: Timeout) -> Result<()> {
        match kernel::with_kernel(|k| k.semaphore_take(self.index, timeout))? {
            Progress::Done(_) => Ok(()),
            Progress::Pending => {
                crate::arch::port::trigger_context_switch();
                kernel::with_kernel(|k| k.take_current_wake_outcome()).map(|_| ())
            }
        }
    }

    /// Take without blocking. Returns whether a token was claimed.
    pub fn try_take(&self) -> bool {
        kernel::with_kernel(|k| k.semaphore_try_take(self.index)).unwrap_or(false)
    }

    /// Return a token, waking the highest-priority waiter if one is
    /// blocked. `InvalidState` past `max_count`.
    pub fn give(&self) -> Result<()> {
        kernel::with_kernel(|k| k.semaphore_give(self.index))?;
        kernel::switch_if_needed();
        Ok(())
    }

    /// Return a token from interrupt context. The wakeup is deferred to
    /// the scheduler's next pass; this call never context-switches.
    pub fn give_from_isr(&self) -> Result<()> {
        kernel::with_kernel(|k| k.semaphore_give_from_isr(self.index))?;
        // Pend the switch so the wake resolves as soon as the ISR unwinds.
        crate::arch::port::trigger_context_switch();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
