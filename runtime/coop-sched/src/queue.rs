//! Bounded Queue Implementation
//!
//! A fixed-capacity FIFO of fixed-size messages with two embedded
//! wait-lists. Messages are copied into the ring on send and copied out on
//! receive; the queue never keeps a reference to caller memory.
//!
//! ## Design
//!
//! ```text
//! BoundedQueue (capacity 2)
//!   ├─ ring:               [ 10 ][ 20 ]   head → 10, count = 2
//!   ├─ waiting_to_send:    [Writer3]
//!   └─ waiting_to_receive: []
//! ```
//!
//! - `send` on a full queue appends the caller to `waiting_to_send`
//! - `receive` on an empty queue appends the caller to `waiting_to_receive`
//! - a successful `send` pops the head of `waiting_to_receive`, and a
//!   successful `receive` pops the head of `waiting_to_send`; the popped
//!   task is handed back to the caller, which resumes it and retries its
//!   operation (see [`Scheduler`](crate::Scheduler))
//!
//! The queue does not retry on anyone's behalf.
//!
//! A queue serves the task table of the first task that uses it. Tasks of
//! any other table are refused with `TaskNotFound`, so a waiter is only
//! ever popped and resumed through the table that owns it.

use core::fmt;

use crate::tcb::{TableId, TaskId, TaskState, TaskTable};
use crate::wait_list::{ListRole, WaitList};
use crate::{Result, SchedError};

static_assertions::assert_impl_all!(BoundedQueue<u32>: Send, Sync);

/// Identifies a queue in blocked task states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(usize);

impl QueueId {
    pub(crate) fn next() -> Self {
        Self(crate::next_object_id())
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue#{}", self.0)
    }
}

/// Result of a send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SendOutcome {
    /// The message occupies a slot
    Queued {
        /// Receiver popped from `waiting_to_receive`, to be resumed
        woken: Option<TaskId>,
    },

    /// The queue was full; the sender now waits in `waiting_to_send`
    Blocked,
}

/// Result of a receive attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum ReceiveOutcome<T> {
    /// A message was copied out of the queue
    Dequeued {
        message: T,
        /// Sender popped from `waiting_to_send`, to be resumed
        woken: Option<TaskId>,
    },

    /// The queue was empty; the receiver now waits in `waiting_to_receive`
    Blocked,
}

/// Create a queue with room for `capacity` messages
///
/// # Errors
/// Returns `InvalidCapacity` if `capacity` is 0
pub fn create_queue<T: Copy>(capacity: usize) -> Result<BoundedQueue<T>> {
    BoundedQueue::new(capacity)
}

/// Fixed-capacity FIFO message queue with blocking wait-lists
pub struct BoundedQueue<T: Copy> {
    id: QueueId,

    /// Task table served, fixed by the first caller
    table: Option<TableId>,

    /// Ring storage; a slot is `Some` exactly when it holds a queued message
    buffer: Box<[Option<T>]>,

    /// Next slot to read
    head: usize,

    /// Next slot to write
    tail: usize,

    /// Number of queued messages (0 ≤ count ≤ capacity)
    ///
    /// The slots from `head` up to `tail` (wrapping) are the occupied ones,
    /// so `buffer[head]` is `Some` exactly when `count > 0`.
    count: usize,

    /// Tasks waiting for a free slot
    waiting_to_send: WaitList,

    /// Tasks waiting for a message
    waiting_to_receive: WaitList,
}

impl<T: Copy> BoundedQueue<T> {
    /// Create an empty queue
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `capacity` is 0
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SchedError::InvalidCapacity);
        }

        let id = QueueId::next();
        log::debug!("[queue] created {} (capacity {})", id, capacity);

        Ok(Self {
            id,
            table: None,
            buffer: vec![None; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            count: 0,
            waiting_to_send: WaitList::new(ListRole::Send(id)),
            waiting_to_receive: WaitList::new(ListRole::Receive(id)),
        })
    }

    #[inline]
    pub fn id(&self) -> QueueId {
        self.id
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of queued messages
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    /// Number of free slots
    #[inline]
    pub fn spaces_available(&self) -> usize {
        self.capacity() - self.count
    }

    #[inline]
    pub fn waiting_to_send_len(&self) -> usize {
        self.waiting_to_send.len()
    }

    #[inline]
    pub fn waiting_to_receive_len(&self) -> usize {
        self.waiting_to_receive.len()
    }

    /// Tasks waiting to send, head first
    pub fn senders(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.waiting_to_send.iter()
    }

    /// Tasks waiting to receive, head first
    pub fn receivers(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.waiting_to_receive.iter()
    }

    /// Copy of the oldest message, without removing it
    pub fn peek(&self) -> Option<T> {
        if self.count == 0 {
            None
        } else {
            self.buffer[self.head]
        }
    }

    /// Try to send a message on behalf of `task`
    ///
    /// On success the message is copied into the tail slot and the head of
    /// `waiting_to_receive` (if any) is popped and returned for resumption.
    /// On a full queue `task` is appended to `waiting_to_send` and the
    /// message is not stored; the caller must retry with the same message
    /// once the task is resumed.
    ///
    /// # Errors
    /// - `TaskNotFound` if `task` is unknown or deleted, or belongs to
    ///   another task table than the one this queue serves
    /// - `DoubleBlock` if `task` is already held by a list; nothing changes
    pub fn send(
        &mut self,
        tasks: &mut TaskTable,
        task: TaskId,
        message: T,
    ) -> Result<SendOutcome> {
        self.check_caller(tasks, task)?;

        if self.count == self.capacity() {
            self.waiting_to_send.append(tasks, task)?;
            log::debug!(
                "[queue] {} full, {} blocked on send ({} waiting)",
                self.id,
                task,
                self.waiting_to_send.len()
            );
            return Ok(SendOutcome::Blocked);
        }

        self.buffer[self.tail] = Some(message);
        self.tail = (self.tail + 1) % self.capacity();
        self.count += 1;
        sched_debug!(
            "[queue] {} sent by {} ({}/{})",
            self.id,
            task,
            self.count,
            self.capacity()
        );

        let woken = self.waiting_to_receive.pop_front(tasks);
        if let Some(receiver) = woken {
            log::debug!("[queue] {} data available, waking {}", self.id, receiver);
        }
        Ok(SendOutcome::Queued { woken })
    }

    /// Try to receive a message on behalf of `task`
    ///
    /// On success the head slot is copied out and the head of
    /// `waiting_to_send` (if any) is popped and returned for resumption.
    /// On an empty queue `task` is appended to `waiting_to_receive`.
    ///
    /// # Errors
    /// - `TaskNotFound` if `task` is unknown or deleted, or belongs to
    ///   another task table than the one this queue serves
    /// - `DoubleBlock` if `task` is already held by a list; nothing changes
    pub fn receive(
        &mut self,
        tasks: &mut TaskTable,
        task: TaskId,
    ) -> Result<ReceiveOutcome<T>> {
        self.check_caller(tasks, task)?;

        let Some(message) = self.buffer[self.head].take() else {
            self.waiting_to_receive.append(tasks, task)?;
            log::debug!(
                "[queue] {} empty, {} blocked on receive ({} waiting)",
                self.id,
                task,
                self.waiting_to_receive.len()
            );
            return Ok(ReceiveOutcome::Blocked);
        };
        self.head = (self.head + 1) % self.capacity();
        self.count -= 1;
        sched_debug!(
            "[queue] {} received by {} ({}/{})",
            self.id,
            task,
            self.count,
            self.capacity()
        );

        let woken = self.waiting_to_send.pop_front(tasks);
        if let Some(sender) = woken {
            log::debug!("[queue] {} space available, waking {}", self.id, sender);
        }
        Ok(ReceiveOutcome::Dequeued { message, woken })
    }

    /// Remove a waiting task from whichever wait-list holds it
    ///
    /// The task leaves its blocked state and becomes `Ready`; putting it on
    /// a ready queue is up to the caller. Never wakes the opposite list.
    /// Returns false if the task is not waiting on this queue.
    pub fn cancel(&mut self, tasks: &mut TaskTable, task: TaskId) -> bool {
        let removed = self.waiting_to_send.remove(tasks, task)
            || self.waiting_to_receive.remove(tasks, task);
        if !removed {
            return false;
        }

        if let Some(tcb) = tasks.get_mut(task) {
            tcb.set_state(TaskState::Ready);
        }
        log::debug!("[queue] {} cancelled wait of {}", self.id, task);
        true
    }

    /// A caller must be a live task of the served table, not held by any list
    fn check_caller(&mut self, tasks: &TaskTable, task: TaskId) -> Result<()> {
        let tcb = tasks.lookup(task)?;
        match self.table {
            Some(table) if table != tasks.id() => {
                log::warn!("[queue] {} serves {}, refusing {}", self.id, table, task);
                return Err(SchedError::TaskNotFound { task });
            }
            Some(_) => {}
            None => self.table = Some(tasks.id()),
        }

        if tcb.list().is_some() {
            log::warn!("[queue] {} re-entered {} while waiting", task, self.id);
            return Err(SchedError::DoubleBlock { task });
        }
        Ok(())
    }
}

impl<T: Copy> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("id", &self.id)
            .field("capacity", &self.capacity())
            .field("count", &self.count)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("waiting_to_send", &self.waiting_to_send.len())
            .field("waiting_to_receive", &self.waiting_to_receive.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcb::{TaskConfig, TaskState};

    fn dequeued<T: Copy>(outcome: ReceiveOutcome<T>) -> (T, Option<TaskId>) {
        match outcome {
            ReceiveOutcome::Dequeued { message, woken } => (message, woken),
            ReceiveOutcome::Blocked => panic!("receive blocked"),
        }
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            create_queue::<u32>(0),
            Err(SchedError::InvalidCapacity)
        ));
    }

    #[test]
    fn queue_creation() {
        let q: BoundedQueue<u32> = create_queue(4).unwrap();
        assert_eq!(q.capacity(), 4);
        assert_eq!(q.len(), 0);
        assert!(q.is_empty());
        assert!(!q.is_full());
        assert_eq!(q.spaces_available(), 4);
        assert_eq!(q.peek(), None);
    }

    #[test]
    fn queue_ids_are_unique() {
        let a: BoundedQueue<u8> = BoundedQueue::new(1).unwrap();
        let b: BoundedQueue<u8> = BoundedQueue::new(1).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn send_blocks_when_full() {
        let mut tasks = TaskTable::new();
        let w1 = tasks.create(TaskConfig::new("Writer1"));
        let w2 = tasks.create(TaskConfig::new("Writer2"));
        let w3 = tasks.create(TaskConfig::new("Writer3"));
        let mut q = BoundedQueue::new(2).unwrap();

        let queued = SendOutcome::Queued { woken: None };
        assert_eq!(q.send(&mut tasks, w1, 10).unwrap(), queued);
        assert_eq!(q.send(&mut tasks, w2, 20).unwrap(), queued);
        assert!(q.is_full());

        assert_eq!(q.send(&mut tasks, w3, 30).unwrap(), SendOutcome::Blocked);
        assert_eq!(q.len(), 2);
        assert_eq!(q.senders().collect::<Vec<_>>(), vec![w3]);
        assert_eq!(
            tasks.lookup(w3).unwrap().state(),
            TaskState::BlockedOnSend { queue: q.id() }
        );
    }

    #[test]
    fn receive_pops_blocked_sender() {
        let mut tasks = TaskTable::new();
        let w1 = tasks.create(TaskConfig::new("Writer1"));
        let w2 = tasks.create(TaskConfig::new("Writer2"));
        let w3 = tasks.create(TaskConfig::new("Writer3"));
        let reader = tasks.create(TaskConfig::new("Reader"));
        let mut q = BoundedQueue::new(2).unwrap();

        let _ = q.send(&mut tasks, w1, 10).unwrap();
        let _ = q.send(&mut tasks, w2, 20).unwrap();
        let _ = q.send(&mut tasks, w3, 30).unwrap();

        let (message, woken) = dequeued(q.receive(&mut tasks, reader).unwrap());
        assert_eq!(message, 10);
        assert_eq!(woken, Some(w3));
        assert_eq!(q.waiting_to_send_len(), 0);
        assert_eq!(q.len(), 1);

        // The queue does not retry for the woken writer
        assert_eq!(q.peek(), Some(20));
        assert!(tasks.lookup(w3).unwrap().list().is_none());
    }

    #[test]
    fn receive_blocks_when_empty() {
        let mut tasks = TaskTable::new();
        let reader = tasks.create(TaskConfig::new("Reader"));
        let writer = tasks.create(TaskConfig::new("Writer"));
        let mut q = BoundedQueue::new(1).unwrap();

        assert_eq!(q.receive(&mut tasks, reader).unwrap(), ReceiveOutcome::Blocked);
        assert_eq!(q.waiting_to_receive_len(), 1);

        assert_eq!(
            q.send(&mut tasks, writer, 7u8).unwrap(),
            SendOutcome::Queued { woken: Some(reader) }
        );
        assert_eq!(q.waiting_to_receive_len(), 0);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn ring_wraps_around() {
        let mut tasks = TaskTable::new();
        let t = tasks.create(TaskConfig::new("t"));
        let mut q = BoundedQueue::new(3).unwrap();

        for round in 0..4u32 {
            for i in 0..3 {
                let _ = q.send(&mut tasks, t, round * 10 + i).unwrap();
            }
            for i in 0..3 {
                let (message, _) = dequeued(q.receive(&mut tasks, t).unwrap());
                assert_eq!(message, round * 10 + i);
            }
            assert!(q.is_empty());
        }
    }

    #[test]
    fn single_slot_does_not_overwrite() {
        let mut tasks = TaskTable::new();
        let a = tasks.create(TaskConfig::new("a"));
        let b = tasks.create(TaskConfig::new("b"));
        let mut q = BoundedQueue::new(1).unwrap();

        let _ = q.send(&mut tasks, a, 100).unwrap();
        assert_eq!(q.send(&mut tasks, b, 200).unwrap(), SendOutcome::Blocked);
        assert_eq!(q.peek(), Some(100));
    }

    #[test]
    fn waiting_task_cannot_reenter() {
        let mut tasks = TaskTable::new();
        let reader = tasks.create(TaskConfig::new("Reader"));
        let mut q = BoundedQueue::new(1).unwrap();

        let _ = q.receive(&mut tasks, reader).unwrap();
        assert_eq!(
            q.send(&mut tasks, reader, 1u16),
            Err(SchedError::DoubleBlock { task: reader })
        );
        assert_eq!(
            q.receive(&mut tasks, reader),
            Err(SchedError::DoubleBlock { task: reader })
        );
        assert!(q.is_empty());
        assert_eq!(q.waiting_to_receive_len(), 1);
        assert_eq!(q.waiting_to_send_len(), 0);
    }

    #[test]
    fn cancel_does_not_wake_opposite_list() {
        let mut tasks = TaskTable::new();
        let r1 = tasks.create(TaskConfig::new("r1"));
        let r2 = tasks.create(TaskConfig::new("r2"));
        let mut q = BoundedQueue::<u32>::new(1).unwrap();

        let _ = q.receive(&mut tasks, r1).unwrap();
        let _ = q.receive(&mut tasks, r2).unwrap();

        assert!(q.cancel(&mut tasks, r1));
        assert_eq!(q.receivers().collect::<Vec<_>>(), vec![r2]);
        assert_eq!(q.waiting_to_send_len(), 0);
        assert!(!q.cancel(&mut tasks, r1));
    }

    #[test]
    fn cancel_makes_task_ready() {
        let mut tasks = TaskTable::new();
        let reader = tasks.create(TaskConfig::new("Reader"));
        let writer = tasks.create(TaskConfig::new("Writer"));
        let mut q = BoundedQueue::<u32>::new(1).unwrap();

        assert_eq!(q.receive(&mut tasks, reader).unwrap(), ReceiveOutcome::Blocked);
        assert!(q.cancel(&mut tasks, reader));

        let tcb = tasks.lookup(reader).unwrap();
        assert_eq!(tcb.state(), TaskState::Ready);
        assert!(tcb.list().is_none());
        assert_eq!(tcb.blocked_on(), None);

        // Free to use the queue again, and a send no longer finds it waiting
        assert_eq!(q.send(&mut tasks, writer, 4).unwrap(), SendOutcome::Queued { woken: None });
        let (message, _) = dequeued(q.receive(&mut tasks, reader).unwrap());
        assert_eq!(message, 4);
        tasks.delete(reader).unwrap();
    }

    #[test]
    fn cancel_blocked_sender_makes_task_ready() {
        let mut tasks = TaskTable::new();
        let a = tasks.create(TaskConfig::new("a"));
        let b = tasks.create(TaskConfig::new("b"));
        let mut q = BoundedQueue::new(1).unwrap();

        let _ = q.send(&mut tasks, a, 1u8).unwrap();
        assert_eq!(q.send(&mut tasks, b, 2).unwrap(), SendOutcome::Blocked);
        assert!(q.cancel(&mut tasks, b));
        assert_eq!(tasks.lookup(b).unwrap().state(), TaskState::Ready);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn queue_serves_one_table() {
        let mut first = TaskTable::new();
        let mut second = TaskTable::new();
        let reader = first.create(TaskConfig::new("Reader"));
        let writer = second.create(TaskConfig::new("Writer"));
        let mut q = BoundedQueue::<u32>::new(2).unwrap();

        let _ = q.receive(&mut first, reader).unwrap();
        assert_eq!(
            q.send(&mut second, writer, 7),
            Err(SchedError::TaskNotFound { task: writer })
        );
        assert!(q.is_empty());
        assert_eq!(q.receivers().collect::<Vec<_>>(), vec![reader]);
        assert!(!q.cancel(&mut second, reader));
        assert_eq!(
            first.lookup(reader).unwrap().state(),
            TaskState::BlockedOnReceive { queue: q.id() }
        );

        // Handles are checked against the table they are used with
        assert_eq!(
            q.send(&mut first, writer, 7),
            Err(SchedError::TaskNotFound { task: writer })
        );
    }
}
