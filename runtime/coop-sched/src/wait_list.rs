//! Wait-list - FIFO list of task handles
//!
//! Wait-lists hold [`TaskId`] handles in arrival order. The same type backs
//! the ready queue and both blocked lists of a queue; its [`ListRole`]
//! decides which state `append` puts the task in.
//!
//! A list never owns a TCB. It only records position, and mirrors its
//! membership in the TCB so that a task can be held by at most one list:
//!
//! ```text
//! waiting_to_send: [task#3] → [task#5] → [task#6]
//!                   ↑ head (popped first)      ↑ tail (appended last)
//! ```

use std::collections::VecDeque;

use crate::queue::QueueId;
use crate::tcb::{TableId, TaskId, TaskState, TaskTable};
use crate::{Result, SchedError};

/// What a list is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListRole {
    /// Runnable tasks
    Ready,

    /// Tasks waiting for space in a queue
    Send(QueueId),

    /// Tasks waiting for data in a queue
    Receive(QueueId),
}

impl ListRole {
    /// State a task enters when appended to a list with this role
    fn entry_state(self) -> TaskState {
        match self {
            ListRole::Ready => TaskState::Ready,
            ListRole::Send(queue) => TaskState::BlockedOnSend { queue },
            ListRole::Receive(queue) => TaskState::BlockedOnReceive { queue },
        }
    }
}

/// FIFO list of tasks
///
/// `append` and `pop_front` are O(1); `remove` is O(n) and only used for
/// out-of-band removal (cancellation, deletion).
///
/// A list serves the task table of its first `append` and refuses any other.
#[derive(Debug, Clone)]
pub struct WaitList {
    role: ListRole,
    table: Option<TableId>,
    tasks: VecDeque<TaskId>,
}

impl WaitList {
    /// Create an empty list
    pub fn new(role: ListRole) -> Self {
        Self {
            role,
            table: None,
            tasks: VecDeque::new(),
        }
    }

    #[inline]
    pub fn role(&self) -> ListRole {
        self.role
    }

    /// Add a task to the tail of the list
    ///
    /// Moves the task into the role's state (`Ready`, `BlockedOnSend` or
    /// `BlockedOnReceive`).
    ///
    /// # Errors
    /// - `TaskNotFound` if the handle is unknown or deleted, or `tasks` is
    ///   not the table this list serves
    /// - `DoubleBlock` if any list already holds the task; nothing changes
    pub fn append(&mut self, tasks: &mut TaskTable, id: TaskId) -> Result<()> {
        let table = tasks.id();
        if self.serves_other(table) {
            log::warn!("[sched] {:?} list refuses {} from {}", self.role, id, table);
            return Err(SchedError::TaskNotFound { task: id });
        }

        let tcb = tasks.lookup_mut(id)?;
        if let Some(held) = tcb.list() {
            log::warn!(
                "[sched] {} already in {:?}, refusing append to {:?}",
                id,
                held,
                self.role
            );
            return Err(SchedError::DoubleBlock { task: id });
        }

        tcb.set_list(Some(self.role));
        tcb.set_state(self.role.entry_state());
        self.table = Some(table);
        self.tasks.push_back(id);
        Ok(())
    }

    /// Remove and return the task at the head of the list
    ///
    /// The task's state is left untouched: the caller decides what the
    /// popped task does next.
    ///
    /// Returns `None` when `tasks` is not the table this list serves.
    pub fn pop_front(&mut self, tasks: &mut TaskTable) -> Option<TaskId> {
        if self.serves_other(tasks.id()) {
            return None;
        }
        let id = self.tasks.pop_front()?;
        if let Some(tcb) = tasks.get_mut(id) {
            tcb.set_list(None);
        }
        Some(id)
    }

    /// Remove a specific task from anywhere in the list
    ///
    /// Returns true if the task was found and removed. The task's state is
    /// left untouched.
    pub fn remove(&mut self, tasks: &mut TaskTable, id: TaskId) -> bool {
        if self.serves_other(tasks.id()) {
            return false;
        }
        let Some(pos) = self.tasks.iter().position(|&t| t == id) else {
            return false;
        };
        self.tasks.remove(pos);
        if let Some(tcb) = tasks.get_mut(id) {
            tcb.set_list(None);
        }
        true
    }

    /// Peek at the head without removing it
    #[inline]
    pub fn front(&self) -> Option<TaskId> {
        self.tasks.front().copied()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains(&id)
    }

    /// Tasks in FIFO order, head first
    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.iter().copied()
    }

    fn serves_other(&self, table: TableId) -> bool {
        self.table.is_some_and(|t| t != table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcb::TaskConfig;

    fn three_tasks() -> (TaskTable, TaskId, TaskId, TaskId) {
        let mut tasks = TaskTable::new();
        let t1 = tasks.create(TaskConfig::new("t1"));
        let t2 = tasks.create(TaskConfig::new("t2"));
        let t3 = tasks.create(TaskConfig::new("t3"));
        (tasks, t1, t2, t3)
    }

    #[test]
    fn append_sets_role_state() {
        let (mut tasks, t1, t2, _) = three_tasks();
        let queue = QueueId::next();

        let mut senders = WaitList::new(ListRole::Send(queue));
        let mut receivers = WaitList::new(ListRole::Receive(queue));
        senders.append(&mut tasks, t1).unwrap();
        receivers.append(&mut tasks, t2).unwrap();

        let tcb1 = tasks.lookup(t1).unwrap();
        assert_eq!(tcb1.state(), TaskState::BlockedOnSend { queue });
        assert_eq!(tcb1.list(), Some(ListRole::Send(queue)));
        assert_eq!(
            tasks.lookup(t2).unwrap().state(),
            TaskState::BlockedOnReceive { queue }
        );
    }

    #[test]
    fn fifo_order() {
        let (mut tasks, t1, t2, t3) = three_tasks();
        let mut list = WaitList::new(ListRole::Ready);

        list.append(&mut tasks, t1).unwrap();
        list.append(&mut tasks, t2).unwrap();
        list.append(&mut tasks, t3).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.front(), Some(t1));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![t1, t2, t3]);

        assert_eq!(list.pop_front(&mut tasks), Some(t1));
        assert_eq!(list.pop_front(&mut tasks), Some(t2));
        assert_eq!(list.pop_front(&mut tasks), Some(t3));
        assert_eq!(list.pop_front(&mut tasks), None);
        assert!(list.is_empty());
    }

    #[test]
    fn pop_front_keeps_state() {
        let (mut tasks, t1, _, _) = three_tasks();
        let queue = QueueId::next();
        let mut list = WaitList::new(ListRole::Receive(queue));

        list.append(&mut tasks, t1).unwrap();
        assert_eq!(list.pop_front(&mut tasks), Some(t1));

        let tcb = tasks.lookup(t1).unwrap();
        assert!(tcb.list().is_none());
        assert_eq!(tcb.state(), TaskState::BlockedOnReceive { queue });
    }

    #[test]
    fn double_block_rejected() {
        let (mut tasks, t1, t2, _) = three_tasks();
        let queue = QueueId::next();
        let mut senders = WaitList::new(ListRole::Send(queue));
        let mut receivers = WaitList::new(ListRole::Receive(queue));

        senders.append(&mut tasks, t1).unwrap();
        receivers.append(&mut tasks, t2).unwrap();

        // Same list and another list both refuse
        assert_eq!(
            senders.append(&mut tasks, t1),
            Err(SchedError::DoubleBlock { task: t1 })
        );
        assert_eq!(
            receivers.append(&mut tasks, t1),
            Err(SchedError::DoubleBlock { task: t1 })
        );

        assert_eq!(senders.iter().collect::<Vec<_>>(), vec![t1]);
        assert_eq!(receivers.iter().collect::<Vec<_>>(), vec![t2]);
        assert_eq!(
            tasks.lookup(t1).unwrap().state(),
            TaskState::BlockedOnSend { queue }
        );
    }

    #[test]
    fn remove_middle() {
        let (mut tasks, t1, t2, t3) = three_tasks();
        let mut list = WaitList::new(ListRole::Ready);
        list.append(&mut tasks, t1).unwrap();
        list.append(&mut tasks, t2).unwrap();
        list.append(&mut tasks, t3).unwrap();

        assert!(list.remove(&mut tasks, t2));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![t1, t3]);
        assert!(tasks.lookup(t2).unwrap().list().is_none());

        // Not present: no-op
        assert!(!list.remove(&mut tasks, t2));
        assert_eq!(list.len(), 2);

        assert!(list.remove(&mut tasks, t1));
        assert_eq!(list.front(), Some(t3));
    }

    #[test]
    fn remove_from_wrong_list_keeps_membership() {
        let (mut tasks, t1, _, _) = three_tasks();
        let mut a = WaitList::new(ListRole::Ready);
        let mut b = WaitList::new(ListRole::Ready);
        a.append(&mut tasks, t1).unwrap();

        assert!(!b.remove(&mut tasks, t1));
        assert_eq!(tasks.lookup(t1).unwrap().list(), Some(ListRole::Ready));
        assert!(a.contains(t1));
    }

    #[test]
    fn append_deleted_task() {
        let (mut tasks, t1, _, _) = three_tasks();
        tasks.delete(t1).unwrap();
        let mut list = WaitList::new(ListRole::Ready);
        assert_eq!(
            list.append(&mut tasks, t1),
            Err(SchedError::TaskNotFound { task: t1 })
        );
        assert!(list.is_empty());
    }

    #[test]
    fn list_serves_one_table() {
        let (mut tasks, t1, _, _) = three_tasks();
        let mut other = TaskTable::new();
        let stranger = other.create(TaskConfig::new("stranger"));
        let queue = QueueId::next();
        let mut list = WaitList::new(ListRole::Receive(queue));

        list.append(&mut tasks, t1).unwrap();
        assert_eq!(
            list.append(&mut other, stranger),
            Err(SchedError::TaskNotFound { task: stranger })
        );
        assert!(other.lookup(stranger).unwrap().list().is_none());

        // Popping through the wrong table leaves the waiter in place
        assert_eq!(list.pop_front(&mut other), None);
        assert!(!list.remove(&mut other, t1));
        assert_eq!(list.front(), Some(t1));
        assert_eq!(
            tasks.lookup(t1).unwrap().list(),
            Some(ListRole::Receive(queue))
        );

        assert_eq!(list.pop_front(&mut tasks), Some(t1));
    }
}
