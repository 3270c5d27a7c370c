//! # Mutex
//!
//! Mutual exclusion with priority inheritance and recursive locking.
//!
//! When a task blocks on a mutex held by a lower-priority task, the owner
//! is boosted to the waiter's effective priority so a middle-priority task
//! cannot keep the lock pinned down (bounded priority inversion). On
//! unlock the owner falls back to the highest priority it still owes to
//! any other mutex it holds, ownership passes directly to the top waiter,
//! and that waiter is boosted from the remaining queue if needed.
//!
//! Deadlock (two tasks waiting on each other's mutexes) is not detected;
//! lock ordering is a programmer-discipline requirement.

use crate::error::{KernelError, Result};
use crate::kernel;
use crate::queue::WaitQueue;
use crate::scheduler::{Progress, Scheduler};
use crate::sync::Timeout;
use crate::task::{TaskId, WaitTarget, WakeOutcome};

/// Pool-resident state of one mutex.
pub(crate) struct MutexControl {
    pub(crate) owner: Option<TaskId>,
    /// Recursion depth; `unlock` must be called once per successful lock.
    pub(crate) lock_count: u32,
    pub(crate) waiters: WaitQueue,
}

impl MutexControl {
    pub(crate) const EMPTY: Self = Self {
        owner: None,
        lock_count: 0,
        waiters: WaitQueue::new(),
    };
}

// ---------------------------------------------------------------------------
// Scheduler operations
// ---------------------------------------------------------------------------

impl Scheduler {
    pub(crate) fn mutex_create(&mut self) -> Result<u8> {
        let index = self.mutexes.alloc()?;
        let control = self.mutexes.slot_mut(index);
        control.owner = None;
        control.lock_count = 0;
        Ok(index as u8)
    }

    pub(crate) fn mutex_lock(&mut self, index: u8, timeout: Timeout) -> Result<Progress> {
        let cur = self.ensure_can_block()?;
        let owner = self
            .mutexes
            .get(index as usize)
            .ok_or(KernelError::InvalidState)?
            .owner;
        match owner {
            None => {
                let control = self.mutexes.slot_mut(index as usize);
                control.owner = Some(cur);
                control.lock_count = 1;
                let _ = self.tasks.slot_mut(cur.index()).held_mutexes.push(index);
                Ok(Progress::Done(0))
            }
            Some(owner) if owner == cur => {
                self.mutexes.slot_mut(index as usize).lock_count += 1;
                Ok(Progress::Done(0))
            }
            Some(owner) => {
                if timeout == Timeout::Ticks(0) {
                    return Err(KernelError::Timeout);
                }
                let cur_priority = self.tasks.slot(cur.index()).effective_priority;
                // Inheritance boost: the owner must be able to run ahead of
                // every task this caller outranks.
                if cur_priority > self.tasks.slot(owner.index()).effective_priority {
                    self.set_effective_priority(owner, cur_priority);
                }
                self.mutexes
                    .slot_mut(index as usize)
                    .waiters
                    .insert(cur, cur_priority);
                self.block_task(cur, WaitTarget::Mutex(index), timeout);
                Ok(Progress::Pending)
            }
        }
    }

    pub(crate) fn mutex_try_lock(&mut self, index: u8) -> Result<bool> {
        let cur = self.ensure_can_block()?;
        let owner = self
            .mutexes
            .get(index as usize)
            .ok_or(KernelError::InvalidState)?
            .owner;
        match owner {
            None => {
                let control = self.mutexes.slot_mut(index as usize);
                control.owner = Some(cur);
                control.lock_count = 1;
                let _ = self.tasks.slot_mut(cur.index()).held_mutexes.push(index);
                Ok(true)
            }
            Some(owner) if owner == cur => {
                self.mutexes.slot_mut(index as usize).lock_count += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    pub(crate) fn mutex_unlock(&mut self, index: u8) -> Result<()> {
        let cur = self.current.ok_or(KernelError::InvalidState)?;
        self.mutex_unlock_inner(cur, index)
    }

    /// Release one level of `owner`'s hold on a mutex. Also used by task
    /// termination to hand every held mutex to its waiters.
    pub(crate) fn mutex_unlock_inner(&mut self, owner: TaskId, index: u8) -> Result<()> {
        let control = self
            .mutexes
            .get(index as usize)
            .ok_or(KernelError::InvalidState)?;
        if control.owner != Some(owner) {
            return Err(KernelError::InvalidState);
        }
        if control.lock_count > 1 {
            self.mutexes.slot_mut(index as usize).lock_count -= 1;
            return Ok(());
        }

        {
            let held = &mut self.tasks.slot_mut(owner.index()).held_mutexes;
            if let Some(position) = held.iter().position(|&held_index| held_index == index) {
                held.remove(position);
            }
        }
        // Undo this mutex's share of the inheritance boost: the owner keeps
        // the highest priority still owed to its other held mutexes.
        let restored = self.inherited_priority_for(owner);
        self.set_effective_priority(owner, restored);

        let next_owner = self.mutexes.slot_mut(index as usize).waiters.pop_front();
        match next_owner {
            Some(next) => {
                // Direct ownership transfer: the waiter wakes already
                // holding the lock, so no third task can slip in between.
                {
                    let control = self.mutexes.slot_mut(index as usize);
                    control.owner = Some(next);
                    control.lock_count = 1;
                }
                let _ = self.tasks.slot_mut(next.index()).held_mutexes.push(index);
                let boosted = self.inherited_priority_for(next);
                if boosted > self.tasks.slot(next.index()).effective_priority {
                    self.set_effective_priority(next, boosted);
                }
                self.wake_task(next, WakeOutcome::Signaled(0));
            }
            None => {
                let control = self.mutexes.slot_mut(index as usize);
                control.owner = None;
                control.lock_count = 0;
            }
        }
        // Dropping the boost may leave a ready task outranking the caller.
        self.check_preemption();
        Ok(())
    }

    /// Re-derive the owner's boost after a waiter left the queue without
    /// taking the lock (timeout or termination).
    pub(crate) fn mutex_disinherit(&mut self, index: u8) {
        if let Some(owner) = self.mutexes.slot(index as usize).owner {
            let entitled = self.inherited_priority_for(owner);
            if entitled < self.tasks.slot(owner.index()).effective_priority {
                self.set_effective_priority(owner, entitled);
            }
        }
    }

    /// Effective priority a task is entitled to: its base priority, raised
    /// to the highest-priority waiter across every mutex it still holds.
    pub(crate) fn inherited_priority_for(&self, tid: TaskId) -> u8 {
        let tcb = self.tasks.slot(tid.index());
        let mut priority = tcb.base_priority;
        for &held in tcb.held_mutexes.iter() {
            if let Some(front) = self.mutexes.slot(held as usize).waiters.front_priority() {
                if front > priority {
                    priority = front;
                }
            }
        }
        priority
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A mutual exclusion primitive with priority inheritance.
///
/// The handle is a small copyable reference to pool-resident state; clones
/// refer to the same mutex. Mutexes live for the lifetime of the system —
/// there is no delete operation, so a handle can be stored freely.
#[derive(Debug, Clone, Copy)]
pub struct Mutex {
    index: u8,
}

impl Mutex {
    /// Allocate a mutex from the static pool.
    pub fn new() -> Result<Self> {
        kernel::with_kernel(|k| k.mutex_create()).map(|index| Self { index })
    }

    /// Acquire the mutex, blocking up to `timeout`.
    ///
    /// Re-locking by the owner nests; `unlock` must be called once per
    /// acquisition.
    pub fn lock(&self, timeout: Timeout) -> Result<()> {
        match kernel::with_kernel(|k| k.mutex_lock(self.index, timeout))? {
            Progress::Done(_) => Ok(()),
            Progress::Pending => {
                crate::arch::port::trigger_context_switch();
                // Running again: the unlocker either handed us ownership or
                // the timeout fired.
                kernel::with_kernel(|k| k.take_current_wake_outcome()).map(|_| ())
            }
        }
    }

    /// Acquire without blocking. Returns whether the lock was taken (or
    /// recursively re-taken).
    pub fn try_lock(&self) -> bool {
        kernel::with_kernel(|k| k.mutex_try_lock(self.index)).unwrap_or(false)
    }

    /// Release one level of ownership. `InvalidState` if the caller does
    /// not own the mutex.
    pub fn unlock(&self) -> Result<()> {
        kernel::with_kernel(|k| k.mutex_unlock(self.index))?;
        kernel::switch_if_needed();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
