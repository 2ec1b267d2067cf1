//! Cooperative Scheduler - Task control blocks and blocking bounded queues
//!
//! # Purpose
//! Provides the scheduling core for a small cooperative RTOS: task control
//! blocks, FIFO wait-lists, fixed-capacity message queues that suspend
//! senders when full and receivers when empty, and a scheduler façade that
//! resumes waiters in arrival order.
//!
//! # Integration Points
//! - Depends on: the host's context switch (see [`TaskSwitch`])
//! - Provides to: any component exchanging fixed-size messages between tasks
//! - Capabilities required: none (single address space, single thread)
//!
//! # Architecture
//! ```text
//! Scheduler
//!   ├─ TaskTable (arena of TCBs, handles are TaskId)
//!   ├─ ReadyQueue: [prio 255] → ... → [prio 0]   (FIFO per level)
//!   └─ parked operations of suspended tasks
//!
//! BoundedQueue<T>
//!   ├─ ring buffer: capacity × T (copied in, copied out)
//!   ├─ waiting_to_send:    [TaskId] → [TaskId]
//!   └─ waiting_to_receive: [TaskId] → [TaskId]
//! ```
//!
//! A send on a full queue appends the sender to `waiting_to_send` and the
//! scheduler suspends it. The next receive frees a slot, pops the head of
//! `waiting_to_send`, and the scheduler resumes that task and retries its
//! send before returning. Receives on an empty queue work symmetrically.
//!
//! # Testing Strategy
//! - Unit tests: per-module state transitions
//! - Integration tests: ordering, wake-up and copy semantics end to end
//! - Benchmarks: send/receive throughput with and without blocking

use core::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

/// Verbose scheduler tracing, compiled in with the `debug-scheduler` feature
macro_rules! sched_debug {
    ($($arg:tt)*) => {
        if cfg!(feature = "debug-scheduler") {
            log::debug!($($arg)*);
        }
    };
}

static NEXT_OBJECT_ID: AtomicUsize = AtomicUsize::new(1);

/// Fresh identifier for a task table or a queue
pub(crate) fn next_object_id() -> usize {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

mod mailbox;
mod queue;
mod ready;
mod scheduler;
mod switch;
mod tcb;
mod wait_list;

pub use mailbox::Mailbox;
pub use queue::{create_queue, BoundedQueue, QueueId, ReceiveOutcome, SendOutcome};
pub use ready::ReadyQueue;
pub use scheduler::{Completion, ReceiveStatus, Scheduler, SendStatus};
pub use switch::{NullSwitch, SwitchEvent, SwitchLog, TaskSwitch};
pub use tcb::{
    Priority, TableId, TaskConfig, TaskId, TaskState, TaskTable, Tcb, DEFAULT_PRIORITY,
    MAX_PRIORITY,
};
pub use wait_list::{ListRole, WaitList};

/// Error types for scheduling and queue operations
///
/// A full or empty queue is not an error: it is reported as
/// [`SendOutcome::Blocked`] / [`ReceiveOutcome::Blocked`] and consumed by
/// the [`Scheduler`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    #[error("Queue capacity must be at least 1")]
    InvalidCapacity,

    #[error("{task} is already waiting in a list")]
    DoubleBlock { task: TaskId },

    /// Unknown, deleted, or owned by a different task table than the one
    /// (or the queue) it was used with
    #[error("{task} is not a live task of this task table")]
    TaskNotFound { task: TaskId },

    #[error("{task} is blocked on a queue and cannot be deleted")]
    TaskBusy { task: TaskId },

    #[error("{task} is not waiting on {queue}")]
    NotWaiting { task: TaskId, queue: QueueId },
}

pub type Result<T> = core::result::Result<T, SchedError>;
