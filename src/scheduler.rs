//! # Scheduler
//!
//! The kernel's central state machine: strictly priority-based preemptive
//! scheduling with round-robin rotation among equal-priority tasks.
//!
//! ## Scheduling Algorithm
//!
//! At each SysTick interrupt:
//! 1. **Resolve deferred ISR wakes** flagged by `give_from_isr`
//! 2. **Wake expired tasks**: sleep queue entries whose `wake_tick` arrived
//!    become Ready; timed waits are pulled out of their wait queue with a
//!    `TimedOut` outcome
//! 3. **Decrement the time slice**: on expiry, request rotation if a
//!    same-priority peer is ready
//! 4. A requested switch is serviced at the next safe point (PendSV on the
//!    Cortex-M4 port): the current task's context is saved to its own
//!    stack, the highest-priority Ready task is popped and dispatched
//!
//! The Running task is always the highest-priority Ready task; the idle
//! task (priority 0, created by `init`) runs when nothing else is Ready.
//!
//! ## Structure
//!
//! All mutable kernel state — the TCB pool, the primitive pools, the ready,
//! wait and sleep queues, the tick counter — lives in this one struct. The
//! synchronization primitives extend it with their own operations in
//! `sync/`; nothing mutates scheduler state from outside a critical
//! section (see `sync::critical_section`), and scheduler methods never
//! mask interrupts themselves.

use crate::config::{
    DEFAULT_TIME_SLICE, MAX_EVENT_FLAGS, MAX_MUTEXES, MAX_PRIORITIES, MAX_SEMAPHORES,
    MAX_SUPPRESSED_TICKS, MAX_TASKS, STACK_SIZE,
};
use crate::error::{self, Fault, KernelError, Result};
use crate::pool::StaticPool;
use crate::queue::{ReadyQueue, SleepQueue};
use crate::sync::event_flags::EventFlagsControl;
use crate::sync::mutex::MutexControl;
use crate::sync::semaphore::SemaphoreControl;
use crate::sync::Timeout;
use crate::task::{TaskControlBlock, TaskEntry, TaskId, TaskState, WaitTarget, WakeOutcome};
use crate::trace::trace;

// The ready bitmap is a u32 and deferred ISR gives are flagged in a u32.
const _: () = assert!(MAX_PRIORITIES <= 32);
const _: () = assert!(MAX_SEMAPHORES <= 32);
const _: () = assert!(MAX_TASKS <= u8::MAX as usize);

/// Opaque handle to a created task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskHandle(pub(crate) TaskId);

impl TaskHandle {
    /// The task's stable identifier.
    #[inline]
    pub fn id(self) -> TaskId {
        self.0
    }
}

/// How far a blocking operation got inside the critical section. `Pending`
/// means the caller was moved to a wait queue and must context-switch, then
/// collect its wake outcome once it runs again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    Done(u32),
    Pending,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The kernel context object. One static instance lives in `kernel`; tests
/// construct their own and drive it through the hosted port.
pub struct Scheduler {
    pub(crate) tasks: StaticPool<TaskControlBlock, MAX_TASKS>,
    pub(crate) mutexes: StaticPool<MutexControl, MAX_MUTEXES>,
    pub(crate) semaphores: StaticPool<SemaphoreControl, MAX_SEMAPHORES>,
    pub(crate) event_flags: StaticPool<EventFlagsControl, MAX_EVENT_FLAGS>,

    /// Ready tasks, bucketed by effective priority.
    pub(crate) ready: ReadyQueue,
    /// Sleeping tasks and timed waits, ordered by wake tick.
    pub(crate) sleepers: SleepQueue,

    /// The task currently running, `None` until the first dispatch.
    pub(crate) current: Option<TaskId>,
    /// The idle task, created by `init`.
    idle: Option<TaskId>,

    /// Monotonic tick counter, including compensated tickless skips.
    tick_count: u64,

    /// Set whenever a state change requires a context switch; consumed by
    /// `schedule()`.
    pub(crate) needs_reschedule: bool,

    /// Bitmask of semaphore slots given from ISR context; resolved at the
    /// next tick or schedule pass rather than inside the interrupt.
    pub(crate) deferred_gives: u32,

    context_switches: u64,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: StaticPool::new([TaskControlBlock::EMPTY; MAX_TASKS]),
            mutexes: StaticPool::new([MutexControl::EMPTY; MAX_MUTEXES]),
            semaphores: StaticPool::new([SemaphoreControl::EMPTY; MAX_SEMAPHORES]),
            event_flags: StaticPool::new([EventFlagsControl::EMPTY; MAX_EVENT_FLAGS]),
            ready: ReadyQueue::new(),
            sleepers: SleepQueue::new(),
            current: None,
            idle: None,
            tick_count: 0,
            needs_reschedule: false,
            deferred_gives: 0,
            context_switches: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Task lifecycle
    // -----------------------------------------------------------------------

    /// Create the idle task at priority 0. Must run once before `start`.
    pub fn init(&mut self, idle_entry: TaskEntry) -> Result<TaskHandle> {
        if self.idle.is_some() {
            return Err(KernelError::InvalidState);
        }
        let handle = self.spawn(idle_entry, 0, "idle")?;
        self.idle = Some(handle.0);
        Ok(handle)
    }

    /// Register a new application task.
    ///
    /// `priority` must be in `1..MAX_PRIORITIES` (0 is the idle task) and
    /// `stack_size` must fit the fixed per-slot stack; both are surfaced as
    /// `InvalidState`. A full TCB pool is `PoolExhausted`. If the new task
    /// outranks the running one, a preemption is requested.
    pub fn create_task(
        &mut self,
        entry: TaskEntry,
        stack_size: usize,
        priority: u8,
        name: &'static str,
    ) -> Result<TaskHandle> {
        if priority == 0 || priority as usize >= MAX_PRIORITIES || stack_size > STACK_SIZE {
            return Err(KernelError::InvalidState);
        }
        self.spawn(entry, priority, name)
    }

    fn spawn(&mut self, entry: TaskEntry, priority: u8, name: &'static str) -> Result<TaskHandle> {
        let index = self.tasks.alloc()?;
        let tid = TaskId::new(index);
        let tcb = self.tasks.slot_mut(index);
        tcb.init(tid, name, priority);
        crate::arch::port::init_stack(tcb, entry);
        self.ready.push_back(tid, priority);
        self.check_preemption();
        trace!("spawn {=str} id={=u8} prio={=u8}", name, tid.0, priority);
        Ok(TaskHandle(tid))
    }

    /// Mark a task for termination and reclaim its slot.
    ///
    /// A task that is not currently running is reclaimed immediately; the
    /// running task is reclaimed at the next context switch. Mutexes held
    /// by the task are released first, exactly as `unlock` would, so
    /// waiters are never stranded. The idle task cannot be terminated.
    pub fn terminate(&mut self, tid: TaskId) -> Result<()> {
        if !self.tasks.is_live(tid.index()) || Some(tid) == self.idle {
            return Err(KernelError::InvalidState);
        }
        if self.tasks.slot(tid.index()).state == TaskState::Terminated {
            return Err(KernelError::InvalidState);
        }

        while let Some(&mutex) = self.tasks.slot(tid.index()).held_mutexes.first() {
            // Releases inheritance and hands ownership to the top waiter.
            let _ = self.mutex_unlock_inner(tid, mutex);
        }

        let (state, priority, blocked_on) = {
            let tcb = self.tasks.slot(tid.index());
            (tcb.state, tcb.effective_priority, tcb.blocked_on)
        };
        match state {
            TaskState::Ready => {
                self.ready.remove(tid, priority);
            }
            TaskState::Sleeping => {
                self.sleepers.remove(tid);
            }
            TaskState::Blocked => {
                if let Some(target) = blocked_on {
                    self.remove_from_wait_queue(tid, target);
                }
                self.sleepers.remove(tid);
            }
            TaskState::Running | TaskState::Suspended => {}
            TaskState::Terminated => {}
        }

        self.tasks.slot_mut(tid.index()).state = TaskState::Terminated;
        if self.current == Some(tid) {
            // Deferred reclamation: the slot is freed once the task has
            // been switched away from.
            self.needs_reschedule = true;
        } else {
            self.reclaim(tid);
        }
        Ok(())
    }

    /// Remove a task from scheduling until `resume`.
    ///
    /// Suspending a Blocked task is refused (`InvalidState`) rather than
    /// silently abandoning its wait; a Sleeping task loses its pending
    /// wake and resumes Ready.
    pub fn suspend(&mut self, tid: TaskId) -> Result<()> {
        if !self.tasks.is_live(tid.index()) || Some(tid) == self.idle {
            return Err(KernelError::InvalidState);
        }
        let (state, priority) = {
            let tcb = self.tasks.slot(tid.index());
            (tcb.state, tcb.effective_priority)
        };
        match state {
            TaskState::Ready => {
                self.ready.remove(tid, priority);
            }
            TaskState::Running => {
                self.needs_reschedule = true;
            }
            TaskState::Sleeping => {
                self.sleepers.remove(tid);
            }
            TaskState::Suspended => return Ok(()),
            TaskState::Blocked | TaskState::Terminated => {
                return Err(KernelError::InvalidState)
            }
        }
        self.tasks.slot_mut(tid.index()).state = TaskState::Suspended;
        Ok(())
    }

    /// Return a suspended task to the ready queue.
    pub fn resume(&mut self, tid: TaskId) -> Result<()> {
        if !self.tasks.is_live(tid.index())
            || self.tasks.slot(tid.index()).state != TaskState::Suspended
        {
            return Err(KernelError::InvalidState);
        }
        self.make_ready(tid, None);
        Ok(())
    }

    fn reclaim(&mut self, tid: TaskId) {
        if self.tasks.free(tid.index()).is_err() {
            error::raise(Fault::PoolCorruption);
        }
    }

    // -----------------------------------------------------------------------
    // Tick handling
    // -----------------------------------------------------------------------

    /// Advance the kernel by one tick. Invoked from the tick interrupt.
    pub fn tick(&mut self) {
        self.tick_count += 1;
        self.drain_deferred_gives();
        self.wake_expired();

        if let Some(cur) = self.current {
            let tcb = self.tasks.slot_mut(cur.index());
            if tcb.state == TaskState::Running && tcb.time_slice_remaining > 0 {
                tcb.time_slice_remaining -= 1;
                if tcb.time_slice_remaining == 0 {
                    tcb.time_slice_remaining = DEFAULT_TIME_SLICE;
                    let priority = tcb.effective_priority;
                    // Rotate only when a peer is actually waiting at this
                    // level; a lone task keeps the CPU.
                    if self.ready.any_at(priority) {
                        self.needs_reschedule = true;
                    }
                }
            }
        }
    }

    /// Release every sleep-queue entry whose deadline has arrived. Timed
    /// waits leave their wait queue with a `TimedOut` outcome — never
    /// earlier than the requested tick.
    fn wake_expired(&mut self) {
        while let Some(tid) = self.sleepers.pop_due(self.tick_count) {
            let (state, blocked_on) = {
                let tcb = self.tasks.slot(tid.index());
                (tcb.state, tcb.blocked_on)
            };
            match state {
                TaskState::Sleeping => self.make_ready(tid, None),
                TaskState::Blocked => {
                    if let Some(target) = blocked_on {
                        self.remove_from_wait_queue(tid, target);
                    }
                    self.make_ready(tid, Some(WakeOutcome::TimedOut));
                }
                _ => {}
            }
        }
    }

    /// Resolve semaphore gives flagged from interrupt context.
    pub(crate) fn drain_deferred_gives(&mut self) {
        while self.deferred_gives != 0 {
            let index = self.deferred_gives.trailing_zeros() as u8;
            self.deferred_gives &= !(1 << index);
            self.semaphore_resolve_deferred(index);
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Pick the next task to run and make it current.
    ///
    /// The single dispatch point: requeues the outgoing task (back of its
    /// bucket — round-robin rotation), reclaims it if terminated, and pops
    /// the highest-priority Ready task. The outgoing task's stack guard is
    /// verified here; corruption is a fatal fault.
    ///
    /// Callers hold the critical section; on target this runs inside the
    /// PendSV handler.
    pub fn schedule(&mut self) -> Option<TaskId> {
        self.drain_deferred_gives();

        if let Some(prev) = self.current {
            if !self.tasks.slot(prev.index()).stack.guard_intact() {
                error::raise(Fault::StackOverflow(prev));
            }
            let tcb = self.tasks.slot_mut(prev.index());
            match tcb.state {
                TaskState::Running => {
                    tcb.state = TaskState::Ready;
                    let priority = tcb.effective_priority;
                    self.ready.push_back(prev, priority);
                }
                TaskState::Terminated => self.reclaim(prev),
                _ => {}
            }
        }

        let next = match self.ready.pop_highest() {
            Some(tid) => tid,
            None => {
                // Nothing runnable at all: only possible before init()
                // created the idle task.
                self.needs_reschedule = false;
                return None;
            }
        };
        self.tasks.slot_mut(next.index()).state = TaskState::Running;
        if self.current != Some(next) {
            self.context_switches += 1;
            trace!("switch id={=u8}", next.0);
        }
        self.current = Some(next);
        self.needs_reschedule = false;
        Some(next)
    }

    /// Give up the rest of the current time slice voluntarily.
    pub fn yield_current(&mut self) {
        if let Some(cur) = self.current {
            let tcb = self.tasks.slot_mut(cur.index());
            if tcb.state == TaskState::Running {
                tcb.time_slice_remaining = DEFAULT_TIME_SLICE;
                self.needs_reschedule = true;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Sleeping
    // -----------------------------------------------------------------------

    /// Sleep until an absolute tick. A deadline at or before the current
    /// tick returns immediately.
    pub fn sleep_until(&mut self, wake_tick: u64) -> Result<()> {
        let cur = self.ensure_can_block()?;
        if wake_tick <= self.tick_count {
            return Ok(());
        }
        let tcb = self.tasks.slot_mut(cur.index());
        tcb.state = TaskState::Sleeping;
        tcb.wake_tick = wake_tick;
        self.sleepers.insert(cur, wake_tick);
        self.needs_reschedule = true;
        Ok(())
    }

    /// Sleep for a relative number of ticks.
    pub fn sleep_for(&mut self, ticks: u32) -> Result<()> {
        self.sleep_until(self.tick_count + u64::from(ticks))
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    /// Deliver a direct-to-task notification. Wakes the target if it is
    /// waiting for one; otherwise the value is latched until it asks.
    pub fn notify(&mut self, tid: TaskId, value: u32) -> Result<()> {
        if !self.tasks.is_live(tid.index()) {
            return Err(KernelError::InvalidState);
        }
        let tcb = self.tasks.slot_mut(tid.index());
        if tcb.state == TaskState::Blocked && tcb.blocked_on == Some(WaitTarget::Notification) {
            tcb.notification_value = value;
            self.wake_task(tid, WakeOutcome::Signaled(value));
        } else {
            tcb.latch_notification(value);
        }
        Ok(())
    }

    /// First half of `wait_notification`: consume a latched value or block.
    pub(crate) fn notification_wait(&mut self, timeout: Timeout) -> Result<Progress> {
        let cur = self.ensure_can_block()?;
        let tcb = self.tasks.slot_mut(cur.index());
        if tcb.notified {
            tcb.notified = false;
            return Ok(Progress::Done(tcb.notification_value));
        }
        if timeout == Timeout::Ticks(0) {
            return Err(KernelError::Timeout);
        }
        self.block_task(cur, WaitTarget::Notification, timeout);
        Ok(Progress::Pending)
    }

    // -----------------------------------------------------------------------
    // Blocking infrastructure (shared by the primitives)
    // -----------------------------------------------------------------------

    /// The current task, provided blocking is legal right now (the idle
    /// task must never block).
    pub(crate) fn ensure_can_block(&self) -> Result<TaskId> {
        let cur = self.current.ok_or(KernelError::InvalidState)?;
        if Some(cur) == self.idle {
            return Err(KernelError::InvalidState);
        }
        Ok(cur)
    }

    /// Move a task into the Blocked state and arm its timeout. The caller
    /// has already inserted it into the primitive's wait queue.
    pub(crate) fn block_task(&mut self, tid: TaskId, target: WaitTarget, timeout: Timeout) {
        let now = self.tick_count;
        let tcb = self.tasks.slot_mut(tid.index());
        tcb.state = TaskState::Blocked;
        tcb.blocked_on = Some(target);
        tcb.wake_outcome = None;
        if let Timeout::Ticks(ticks) = timeout {
            tcb.wake_tick = now + u64::from(ticks);
            let wake_tick = tcb.wake_tick;
            self.sleepers.insert(tid, wake_tick);
        }
        self.needs_reschedule = true;
        trace!("block id={=u8}", tid.0);
    }

    /// Wake a blocked task with the given outcome. The caller has already
    /// removed it from the primitive's wait queue.
    pub(crate) fn wake_task(&mut self, tid: TaskId, outcome: WakeOutcome) {
        self.sleepers.remove(tid);
        self.make_ready(tid, Some(outcome));
    }

    /// Collect the wake outcome after resuming from a `Pending` block.
    pub(crate) fn take_current_wake_outcome(&mut self) -> Result<u32> {
        let cur = self.current.ok_or(KernelError::InvalidState)?;
        match self.tasks.slot_mut(cur.index()).wake_outcome.take() {
            Some(WakeOutcome::Signaled(value)) => Ok(value),
            Some(WakeOutcome::TimedOut) => Err(KernelError::Timeout),
            None => Err(KernelError::InvalidState),
        }
    }

    fn make_ready(&mut self, tid: TaskId, outcome: Option<WakeOutcome>) {
        let tcb = self.tasks.slot_mut(tid.index());
        tcb.blocked_on = None;
        if let Some(outcome) = outcome {
            tcb.wake_outcome = Some(outcome);
        }
        tcb.state = TaskState::Ready;
        tcb.time_slice_remaining = DEFAULT_TIME_SLICE;
        let priority = tcb.effective_priority;
        self.ready.push_back(tid, priority);
        self.check_preemption();
    }

    /// Request a switch if the top Ready task outranks the running one.
    pub(crate) fn check_preemption(&mut self) {
        let top = match self.ready.highest_priority() {
            Some(priority) => priority,
            None => return,
        };
        match self.current {
            Some(cur) if self.tasks.slot(cur.index()).state == TaskState::Running => {
                if top > self.tasks.slot(cur.index()).effective_priority {
                    self.needs_reschedule = true;
                }
            }
            _ => self.needs_reschedule = true,
        }
    }

    /// Change a task's effective priority (inheritance boost or restore),
    /// keeping whichever queue holds it consistently ordered.
    pub(crate) fn set_effective_priority(&mut self, tid: TaskId, new_priority: u8) {
        let (old, state, blocked_on) = {
            let tcb = self.tasks.slot(tid.index());
            (tcb.effective_priority, tcb.state, tcb.blocked_on)
        };
        if old == new_priority {
            return;
        }
        self.tasks.slot_mut(tid.index()).effective_priority = new_priority;
        match state {
            TaskState::Ready => {
                self.ready.remove(tid, old);
                self.ready.push_back(tid, new_priority);
                self.check_preemption();
            }
            TaskState::Blocked => {
                if let Some(target) = blocked_on {
                    self.reposition_waiter(tid, target, new_priority);
                }
            }
            _ => {}
        }
    }

    fn reposition_waiter(&mut self, tid: TaskId, target: WaitTarget, priority: u8) {
        match target {
            WaitTarget::Mutex(index) => self
                .mutexes
                .slot_mut(index as usize)
                .waiters
                .reposition(tid, priority),
            WaitTarget::Semaphore(index) => self
                .semaphores
                .slot_mut(index as usize)
                .waiters
                .reposition(tid, priority),
            WaitTarget::EventFlags(index) => self
                .event_flags
                .slot_mut(index as usize)
                .waiters
                .reposition(tid, priority),
            WaitTarget::Notification => {}
        }
    }

    fn remove_from_wait_queue(&mut self, tid: TaskId, target: WaitTarget) {
        match target {
            WaitTarget::Mutex(index) => {
                self.mutexes.slot_mut(index as usize).waiters.remove(tid);
                // The departed waiter may have been the reason for the
                // owner's inheritance boost.
                self.mutex_disinherit(index);
            }
            WaitTarget::Semaphore(index) => {
                self.semaphores.slot_mut(index as usize).waiters.remove(tid);
            }
            WaitTarget::EventFlags(index) => {
                self.event_flags.slot_mut(index as usize).waiters.remove(tid);
            }
            WaitTarget::Notification => {}
        }
    }

    // -----------------------------------------------------------------------
    // Tickless idle
    // -----------------------------------------------------------------------

    /// Number of tick interrupts that may safely be suppressed, or `None`
    /// when a normal tick cadence is required.
    ///
    /// Only meaningful while the idle task runs and nothing is Ready: the
    /// span reaches to the nearest pending wake (it must be more than one
    /// tick away) or, with no sleeper at all, to the longest interval the
    /// tick source can cover.
    pub fn tickless_plan(&self) -> Option<u32> {
        let cur = self.current?;
        if Some(cur) != self.idle || !self.ready.is_empty() || self.needs_reschedule {
            return None;
        }
        match self.sleepers.next_wake() {
            Some(wake_tick) => {
                let delta = wake_tick.saturating_sub(self.tick_count);
                if delta <= 1 {
                    return None;
                }
                Some(delta.min(u64::from(MAX_SUPPRESSED_TICKS)) as u32)
            }
            None => Some(MAX_SUPPRESSED_TICKS),
        }
    }

    /// Fold a completed tickless interval back into kernel time: the tick
    /// counter jumps by the ticks that actually elapsed and every due wake
    /// fires, so elapsed-time semantics stay exact across the skip.
    pub fn advance_idle_ticks(&mut self, elapsed: u32) {
        self.tick_count += u64::from(elapsed);
        self.drain_deferred_gives();
        self.wake_expired();
        trace!("tickless +{=u32}", elapsed);
    }

    // -----------------------------------------------------------------------
    // Context plumbing (Cortex-M4 port)
    // -----------------------------------------------------------------------

    /// Record the current task's saved stack pointer as an offset into its
    /// own stack buffer. Called from the PendSV save path.
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    pub(crate) fn save_context(&mut self, psp: usize) {
        if let Some(cur) = self.current {
            let tcb = self.tasks.slot_mut(cur.index());
            tcb.sp_offset = psp - tcb.stack.base();
        }
    }

    /// Dispatch the next task and return its stack pointer address for the
    /// PendSV restore path.
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    pub(crate) fn resume_context(&mut self) -> usize {
        let next = match self.schedule() {
            Some(tid) => tid,
            // No task was ever created; stay on the current context.
            None => match self.current {
                Some(tid) => tid,
                None => error::raise(Fault::PoolCorruption),
            },
        };
        let tcb = self.tasks.slot(next.index());
        tcb.stack.base() + tcb.sp_offset
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Monotonic tick count since start, tickless skips included.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.tick_count
    }

    /// Whether a context-switch request is waiting to be serviced. The tick
    /// source checks this after `tick()` to decide whether to pend a
    /// switch.
    #[inline]
    pub fn reschedule_pending(&self) -> bool {
        self.needs_reschedule
    }

    /// Id of the running task.
    #[inline]
    pub fn current_task(&self) -> Option<TaskId> {
        self.current
    }

    /// Total context switches performed.
    #[inline]
    pub fn context_switches(&self) -> u64 {
        self.context_switches
    }

    /// Number of live tasks, idle included.
    pub fn task_count(&self) -> usize {
        self.tasks.live_count()
    }

    #[cfg(test)]
    pub(crate) fn task_state(&self, tid: TaskId) -> TaskState {
        self.tasks.slot(tid.index()).state
    }

    #[cfg(test)]
    pub(crate) fn effective_priority_of(&self, tid: TaskId) -> u8 {
        self.tasks.slot(tid.index()).effective_priority
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
