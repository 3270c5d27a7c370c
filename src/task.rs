//! # Task Control Block
//!
//! Defines the task model: execution state, priorities, the owned stack
//! region, and the wait bookkeeping used by the synchronization primitives.
//! TCBs live in the scheduler's static pool; all state transitions are
//! performed by the scheduler, never by task code directly.

use heapless::Vec;

use crate::config::{
    DEFAULT_TIME_SLICE, MAX_MUTEXES, STACK_FILL, STACK_GUARD_WORDS, STACK_SIZE,
};

const FILL_BYTE: u8 = (STACK_FILL & 0xFF) as u8;
const GUARD_BYTES: usize = STACK_GUARD_WORDS * 4;

// ---------------------------------------------------------------------------
// Task identity
// ---------------------------------------------------------------------------

/// A task entry point: a diverging function executed in Thread mode. Tasks
/// never return; a task that is done calls `kernel::exit_current`.
pub type TaskEntry = extern "C" fn() -> !;

/// Stable identifier for a task: the index of its slot in the TCB pool.
/// Unique for the task's lifetime; a reclaimed slot may be reissued to a
/// later task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(pub(crate) u8);

impl TaskId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u8)
    }

    /// Pool-slot index backing this id.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌──────────┐      schedule()      ┌─────────┐
///   │  Ready   │ ───────────────────► │ Running │
///   └──────────┘   preempt / yield    └─────────┘
///        ▲ ◄───────────────────────────┬────┬───┐
///        │                             │    │   │
///        │  wake / timeout   block on  │    │   │ terminate
///        ├───────────────┐  primitive  ▼    │   ▼
///        │               └──────┌──────────┐│ ┌────────────┐
///        │                      │ Blocked  ││ │ Terminated │
///        │                      └──────────┘│ └────────────┘
///        │  tick arrives   sleep_for/until  ▼
///        └──────────────────────┌──────────┐
///                               │ Sleeping │
///                               └──────────┘
/// ```
///
/// `Suspended` is entered and left only via the explicit suspend/resume
/// calls and is reachable from `Ready`, `Running`, and `Sleeping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Runnable, waiting in its ready-queue priority bucket.
    Ready,
    /// Currently executing. At most one task is in this state.
    Running,
    /// Waiting on a mutex, semaphore, event group, or notification.
    Blocked,
    /// Waiting for a tick deadline (`sleep_for` / `sleep_until`).
    Sleeping,
    /// Removed from scheduling until explicitly resumed.
    Suspended,
    /// Finished; slot pending or already returned to the pool.
    Terminated,
}

/// What a blocked task is waiting on. Indices refer to the scheduler's
/// primitive pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitTarget {
    Mutex(u8),
    Semaphore(u8),
    EventFlags(u8),
    Notification,
}

/// Why a blocked task was made ready again. Written by the waker (or the
/// timeout scan), consumed by the blocking call when the task resumes.
/// The payload carries the event-flag snapshot or notification value; it is
/// zero for mutex and semaphore wakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeOutcome {
    Signaled(u32),
    TimedOut,
}

// ---------------------------------------------------------------------------
// Stack region
// ---------------------------------------------------------------------------

/// A task's stack: an owned, 8-aligned byte region (AAPCS requires 8-byte
/// stack alignment). The saved context is represented as a byte offset into
/// this buffer; only the Cortex-M4 port turns offsets into real pointers.
///
/// The lowest [`STACK_GUARD_WORDS`] words hold the fill pattern and act as
/// an overflow guard, checked at every context switch.
#[repr(align(8))]
pub struct TaskStack([u8; STACK_SIZE]);

impl TaskStack {
    pub const fn new() -> Self {
        Self([FILL_BYTE; STACK_SIZE])
    }

    /// Refill the whole region with the fill pattern (guard included).
    pub fn reset(&mut self) {
        self.0 = [FILL_BYTE; STACK_SIZE];
    }

    /// Base address of the region.
    #[inline]
    pub fn base(&self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Offset of the initial stack top: the end of the buffer, rounded down
    /// to 8 bytes. Stacks grow downward.
    #[inline]
    pub const fn top_offset() -> usize {
        STACK_SIZE & !0x07
    }

    /// Whether the overflow guard at the low end is still intact.
    pub fn guard_intact(&self) -> bool {
        self.0[..GUARD_BYTES].iter().all(|&b| b == FILL_BYTE)
    }

    #[cfg(test)]
    pub(crate) fn corrupt_guard(&mut self) {
        self.0[0] = !FILL_BYTE;
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// The scheduler's record for one task. Owned exclusively by the scheduler
/// once created; stored inline in the static TCB pool together with the
/// task's stack.
pub struct TaskControlBlock {
    /// Slot index in the TCB pool, stable for the task's lifetime.
    pub id: TaskId,

    /// Debug name, shown in trace output.
    pub name: &'static str,

    /// Current execution state.
    pub state: TaskState,

    /// Priority assigned at creation. Higher numeric value = higher
    /// priority; 0 is the idle task.
    pub base_priority: u8,

    /// Scheduling priority after inheritance boosts. Always
    /// `>= base_priority`; restored on unlock.
    pub effective_priority: u8,

    /// Ticks left in the current round-robin quantum.
    pub time_slice_remaining: u32,

    /// Absolute tick at which a Sleeping or timed-Blocked task is released.
    /// Meaningful only while the task sits in the sleep queue.
    pub wake_tick: u64,

    /// The primitive this task is blocked on, if any.
    pub blocked_on: Option<WaitTarget>,

    /// Pending wake result, set by the waker or the timeout scan.
    pub wake_outcome: Option<WakeOutcome>,

    /// Mutexes currently owned, used to compute and undo inheritance.
    pub held_mutexes: Vec<u8, MAX_MUTEXES>,

    /// One-slot notification latch.
    pub notified: bool,
    /// Value delivered with the most recent notification.
    pub notification_value: u32,

    /// Event-flag wait condition, valid while blocked on an event group:
    /// the bits waited for, whether all of them are required, and whether
    /// the matched bits are cleared on wake.
    pub event_mask: u32,
    pub event_all: bool,
    pub event_auto_clear: bool,

    /// Saved stack pointer as a byte offset into `stack`.
    pub sp_offset: usize,

    /// The task's owned stack region.
    pub stack: TaskStack,
}

impl TaskControlBlock {
    /// Unallocated slot contents, used to build the static pool.
    pub const EMPTY: Self = Self {
        id: TaskId(0),
        name: "",
        state: TaskState::Terminated,
        base_priority: 0,
        effective_priority: 0,
        time_slice_remaining: 0,
        wake_tick: 0,
        blocked_on: None,
        wake_outcome: None,
        held_mutexes: Vec::new(),
        notified: false,
        notification_value: 0,
        event_mask: 0,
        event_all: false,
        event_auto_clear: false,
        sp_offset: 0,
        stack: TaskStack::new(),
    };

    /// Re-initialize a freshly allocated slot for a new task. The initial
    /// context frame is built separately by the port layer.
    pub fn init(&mut self, id: TaskId, name: &'static str, priority: u8) {
        self.id = id;
        self.name = name;
        self.state = TaskState::Ready;
        self.base_priority = priority;
        self.effective_priority = priority;
        self.time_slice_remaining = DEFAULT_TIME_SLICE;
        self.wake_tick = 0;
        self.blocked_on = None;
        self.wake_outcome = None;
        self.held_mutexes.clear();
        self.notified = false;
        self.notification_value = 0;
        self.stack.reset();
        self.sp_offset = TaskStack::top_offset();
    }

    /// Record a pending notification; returns the previous latch state.
    pub fn latch_notification(&mut self, value: u32) -> bool {
        let was = self.notified;
        self.notified = true;
        self.notification_value = value;
        was
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == TaskState::Ready
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_resets_slot() {
        let mut tcb = TaskControlBlock::EMPTY;
        tcb.notified = true;
        tcb.held_mutexes.push(3).unwrap();

        tcb.init(TaskId::new(2), "sensor", 5);
        assert_eq!(tcb.id, TaskId::new(2));
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.base_priority, 5);
        assert_eq!(tcb.effective_priority, 5);
        assert_eq!(tcb.time_slice_remaining, DEFAULT_TIME_SLICE);
        assert!(!tcb.notified);
        assert!(tcb.held_mutexes.is_empty());
        assert_eq!(tcb.sp_offset, TaskStack::top_offset());
    }

    #[test]
    fn stack_guard_detects_overflow() {
        let mut stack = TaskStack::new();
        assert!(stack.guard_intact());
        stack.corrupt_guard();
        assert!(!stack.guard_intact());
        stack.reset();
        assert!(stack.guard_intact());
    }

    #[test]
    fn stack_top_is_aligned() {
        assert_eq!(TaskStack::top_offset() % 8, 0);
        assert!(TaskStack::top_offset() <= STACK_SIZE);
    }

    #[test]
    fn notification_latch() {
        let mut tcb = TaskControlBlock::EMPTY;
        assert!(!tcb.latch_notification(7));
        assert_eq!(tcb.notification_value, 7);
        // A second notification before consumption overwrites the value
        // and reports the latch was already set.
        assert!(tcb.latch_notification(9));
        assert_eq!(tcb.notification_value, 9);
    }
}
