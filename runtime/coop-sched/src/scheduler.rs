//! Scheduler - Task bookkeeping and blocking queue operations
//!
//! The scheduler owns every TCB, the ready queue, and the pending operation
//! of each suspended task. It drives [`BoundedQueue`] on behalf of tasks:
//!
//! - `send` / `receive` that cannot proceed park the operation (the message
//!   of a blocked sender stays with the scheduler, not the queue) and
//!   suspend the task through the host's [`TaskSwitch`]
//! - whenever a queue operation pops a waiter, the waiter is resumed and its
//!   parked operation retried against the same queue before the call
//!   returns; the outcome is kept as a [`Completion`] for the woken task
//!
//! ## Usage
//!
//! ```rust
//! use coop_sched::{create_queue, Completion, ReceiveStatus, Scheduler, SendStatus, TaskConfig};
//!
//! let mut sched = Scheduler::new();
//! let mut queue = create_queue::<u32>(1).unwrap();
//! let reader = sched.spawn(TaskConfig::new("reader")).unwrap();
//! let writer = sched.spawn(TaskConfig::new("writer")).unwrap();
//!
//! assert_eq!(sched.receive(&mut queue, reader).unwrap(), ReceiveStatus::Suspended);
//! assert_eq!(sched.send(&mut queue, writer, 42).unwrap(), SendStatus::Delivered);
//! assert_eq!(sched.take_completion(reader), Some(Completion::Received(42)));
//! ```
//!
//! ## Scheduling Model
//!
//! Single-threaded and cooperative: whichever task calls into the scheduler
//! is the running task, and it keeps running until it blocks or yields.
//! Because wake-ups are retried before control returns to any other task,
//! a woken task never finds its freed slot (or its message) taken by
//! someone else.

use std::collections::{HashMap, VecDeque};

use crate::queue::{BoundedQueue, ReceiveOutcome, SendOutcome};
use crate::ready::ReadyQueue;
use crate::switch::{NullSwitch, TaskSwitch};
use crate::tcb::{TaskConfig, TaskId, TaskState, TaskTable, Tcb};
use crate::{Result, SchedError};

/// Result of [`Scheduler::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SendStatus {
    /// The message is in the queue
    Delivered,

    /// The queue was full; the task is suspended and its send will complete
    /// when a receiver frees a slot
    Suspended,
}

/// Result of [`Scheduler::receive`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum ReceiveStatus<T> {
    Received(T),

    /// The queue was empty; the task is suspended and its receive will
    /// complete when a sender supplies data
    Suspended,
}

/// How a suspended task's operation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion<T> {
    Sent,
    Received(T),
    Cancelled,
}

/// Operation a suspended task will retry when woken
#[derive(Debug, Clone, Copy)]
enum Parked<T> {
    Send(T),
    Receive,
}

/// Scheduler façade
///
/// `T` is the message type of the queues the scheduled tasks use.
pub struct Scheduler<T: Copy, S: TaskSwitch = NullSwitch> {
    tasks: TaskTable,
    ready: ReadyQueue,

    /// Currently running task
    current: Option<TaskId>,

    /// Pending operations of suspended tasks
    parked: HashMap<TaskId, Parked<T>>,

    /// Outcomes of operations finished while their task was suspended
    completions: HashMap<TaskId, Completion<T>>,

    switch: S,
}

impl<T: Copy> Scheduler<T, NullSwitch> {
    /// Create a scheduler with no host switch
    pub fn new() -> Self {
        Self::with_switch(NullSwitch)
    }
}

impl<T: Copy> Default for Scheduler<T, NullSwitch> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, S: TaskSwitch> Scheduler<T, S> {
    /// Create a scheduler driving the given host switch
    pub fn with_switch(switch: S) -> Self {
        Self {
            tasks: TaskTable::new(),
            ready: ReadyQueue::new(),
            current: None,
            parked: HashMap::new(),
            completions: HashMap::new(),
            switch,
        }
    }

    /// Create a task and make it ready
    pub fn spawn(&mut self, config: TaskConfig) -> Result<TaskId> {
        let id = self.tasks.create(config);
        self.ready.push(&mut self.tasks, id)?;
        Ok(id)
    }

    #[inline]
    pub fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    /// Get a live TCB
    pub fn task(&self, id: TaskId) -> Result<&Tcb> {
        self.tasks.lookup(id)
    }

    /// Get the currently running task
    #[inline]
    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    #[inline]
    pub fn ready(&self) -> &ReadyQueue {
        &self.ready
    }

    /// Number of ready tasks
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    #[inline]
    pub fn switch(&self) -> &S {
        &self.switch
    }

    #[inline]
    pub fn switch_mut(&mut self) -> &mut S {
        &mut self.switch
    }

    /// Check if a task has a suspended operation
    pub fn is_parked(&self, id: TaskId) -> bool {
        self.parked.contains_key(&id)
    }

    /// Take the outcome of a task's last suspended operation
    pub fn take_completion(&mut self, id: TaskId) -> Option<Completion<T>> {
        self.completions.remove(&id)
    }

    /// Send `message` to `queue` as `task`
    ///
    /// Returns `Delivered` if the message was queued immediately. On a full
    /// queue the message is parked, the task suspended, and `Suspended`
    /// returned; the send completes (`Completion::Sent`) when a receiver
    /// frees a slot.
    ///
    /// # Errors
    /// - `TaskNotFound` for unknown or deleted tasks, or when `queue` already
    ///   serves another scheduler
    /// - `DoubleBlock` if `task` is already waiting; nothing changes
    pub fn send(
        &mut self,
        queue: &mut BoundedQueue<T>,
        task: TaskId,
        message: T,
    ) -> Result<SendStatus> {
        self.enter(task)?;

        match queue.send(&mut self.tasks, task, message)? {
            SendOutcome::Queued { woken } => {
                self.wake(queue, woken)?;
                Ok(SendStatus::Delivered)
            }
            SendOutcome::Blocked => {
                self.park(task, Parked::Send(message));
                Ok(SendStatus::Suspended)
            }
        }
    }

    /// Receive from `queue` as `task`
    ///
    /// Returns the message if one was queued. On an empty queue the task is
    /// suspended and `Suspended` returned; the message arrives later as
    /// `Completion::Received`.
    ///
    /// # Errors
    /// - `TaskNotFound` for unknown or deleted tasks, or when `queue` already
    ///   serves another scheduler
    /// - `DoubleBlock` if `task` is already waiting; nothing changes
    pub fn receive(
        &mut self,
        queue: &mut BoundedQueue<T>,
        task: TaskId,
    ) -> Result<ReceiveStatus<T>> {
        self.enter(task)?;

        match queue.receive(&mut self.tasks, task)? {
            ReceiveOutcome::Dequeued { message, woken } => {
                self.wake(queue, woken)?;
                Ok(ReceiveStatus::Received(message))
            }
            ReceiveOutcome::Blocked => {
                self.park(task, Parked::Receive);
                Ok(ReceiveStatus::Suspended)
            }
        }
    }

    /// Abandon a task's wait on `queue`
    ///
    /// The task leaves the wait-list, its parked operation is dropped
    /// (`Completion::Cancelled`) and it becomes ready. No other waiter is
    /// woken.
    ///
    /// # Errors
    /// - `TaskNotFound` for unknown or deleted tasks
    /// - `NotWaiting` if the task is not blocked on `queue`
    pub fn cancel(&mut self, queue: &mut BoundedQueue<T>, task: TaskId) -> Result<()> {
        let waiting_here = self.tasks.lookup(task)?.blocked_on() == Some(queue.id());
        if !waiting_here || !queue.cancel(&mut self.tasks, task) {
            return Err(SchedError::NotWaiting {
                task,
                queue: queue.id(),
            });
        }

        self.parked.remove(&task);
        self.completions.insert(task, Completion::Cancelled);
        self.ready.push(&mut self.tasks, task)?;
        log::debug!("[sched] {} cancelled wait on {}", task, queue.id());
        self.switch.resume(task);
        Ok(())
    }

    /// Delete a task
    ///
    /// # Errors
    /// - `TaskNotFound` for unknown or deleted tasks
    /// - `TaskBusy` if the task is blocked on a queue (cancel it first)
    pub fn delete(&mut self, task: TaskId) -> Result<()> {
        let tcb = self.tasks.lookup(task)?;
        if tcb.is_blocked() {
            return Err(SchedError::TaskBusy { task });
        }
        if tcb.state() == TaskState::Ready {
            self.ready.remove(&mut self.tasks, task);
        }
        if self.current == Some(task) {
            self.current = None;
        }
        self.completions.remove(&task);
        self.tasks.delete(task)
    }

    /// Pick the next task to run
    ///
    /// The running task (if any) goes back to the tail of its ready level,
    /// then the oldest task of the highest ready priority becomes current.
    /// Returns `None` when nothing is ready.
    pub fn dispatch(&mut self) -> Result<Option<TaskId>> {
        if let Some(prev) = self.current.take() {
            self.requeue(prev)?;
        }

        let Some(next) = self.ready.pop(&mut self.tasks) else {
            return Ok(None);
        };
        self.tasks.lookup_mut(next)?.set_state(TaskState::Running);
        self.current = Some(next);
        sched_debug!("[sched] dispatch {} ({} ready)", next, self.ready.len());
        Ok(Some(next))
    }

    /// Give up the CPU: a running task goes back to the ready queue
    ///
    /// No-op for tasks that are not running.
    pub fn yield_now(&mut self, task: TaskId) -> Result<()> {
        if self.tasks.lookup(task)?.state() != TaskState::Running {
            return Ok(());
        }
        if self.current == Some(task) {
            self.current = None;
        }
        self.ready.push(&mut self.tasks, task)
    }

    /// Make `task` the running task before it touches a queue
    fn enter(&mut self, task: TaskId) -> Result<()> {
        match self.tasks.lookup(task)?.state() {
            TaskState::BlockedOnSend { .. } | TaskState::BlockedOnReceive { .. } => {
                log::warn!("[sched] {} called into a queue while blocked", task);
                return Err(SchedError::DoubleBlock { task });
            }
            TaskState::Ready => {
                self.ready.remove(&mut self.tasks, task);
            }
            TaskState::Running | TaskState::Deleted => {}
        }

        if let Some(prev) = self.current.filter(|&c| c != task) {
            self.requeue(prev)?;
        }
        self.tasks.lookup_mut(task)?.set_state(TaskState::Running);
        self.current = Some(task);
        Ok(())
    }

    /// Put a still-running task back on the ready queue
    fn requeue(&mut self, task: TaskId) -> Result<()> {
        let running = matches!(
            self.tasks.lookup(task).map(Tcb::state),
            Ok(TaskState::Running)
        );
        if running {
            self.ready.push(&mut self.tasks, task)?;
        }
        Ok(())
    }

    /// Suspend a task that a queue just put on a wait-list
    fn park(&mut self, task: TaskId, op: Parked<T>) {
        self.parked.insert(task, op);
        if self.current == Some(task) {
            self.current = None;
        }
        log::debug!("[sched] {} suspended", task);
        self.switch.suspend(task);
    }

    /// Resume every task popped by an operation on `queue`, in FIFO order
    ///
    /// A retried operation can itself pop a waiter from the opposite list;
    /// that waiter is handled after the ones already pending.
    fn wake(&mut self, queue: &mut BoundedQueue<T>, first: Option<TaskId>) -> Result<()> {
        let mut pending: VecDeque<TaskId> = first.into_iter().collect();
        while let Some(task) = pending.pop_front() {
            if let Some(next) = self.retry(queue, task)? {
                pending.push_back(next);
            }
        }
        Ok(())
    }

    /// Resume a popped waiter and complete its parked operation
    ///
    /// Returns the waiter popped by the retried operation, if any.
    fn retry(&mut self, queue: &mut BoundedQueue<T>, task: TaskId) -> Result<Option<TaskId>> {
        self.tasks.lookup_mut(task)?.set_state(TaskState::Ready);
        self.switch.resume(task);

        let Some(op) = self.parked.remove(&task) else {
            // Blocked through the raw queue API: nothing to retry
            log::warn!("[sched] {} woken with no pending operation", task);
            self.ready.push(&mut self.tasks, task)?;
            return Ok(None);
        };

        let (completion, woken) = match op {
            Parked::Send(message) => match queue.send(&mut self.tasks, task, message)? {
                SendOutcome::Queued { woken } => (Completion::Sent, woken),
                SendOutcome::Blocked => {
                    log::warn!("[sched] {} lost its slot on {}", task, queue.id());
                    self.park(task, op);
                    return Ok(None);
                }
            },
            Parked::Receive => match queue.receive(&mut self.tasks, task)? {
                ReceiveOutcome::Dequeued { message, woken } => {
                    (Completion::Received(message), woken)
                }
                ReceiveOutcome::Blocked => {
                    log::warn!("[sched] {} lost its message on {}", task, queue.id());
                    self.park(task, op);
                    return Ok(None);
                }
            },
        };

        log::debug!(
            "[sched] {} resumed, {} on {}",
            task,
            completion_kind(&completion),
            queue.id()
        );
        self.completions.insert(task, completion);
        self.ready.push(&mut self.tasks, task)?;
        Ok(woken)
    }
}

fn completion_kind<T>(completion: &Completion<T>) -> &'static str {
    match completion {
        Completion::Sent => "sent",
        Completion::Received(_) => "received",
        Completion::Cancelled => "cancelled",
    }
}

impl<T: Copy, S: TaskSwitch> core::fmt::Debug for Scheduler<T, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks.live_count())
            .field("ready", &self.ready.len())
            .field("current", &self.current)
            .field("parked", &self.parked.len())
            .field("completions", &self.completions.len())
            .finish()
    }
}
