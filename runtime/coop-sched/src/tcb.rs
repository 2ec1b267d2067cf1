//! Task Control Block (TCB) Implementation
//!
//! A TCB is the scheduler's record of one task: identity, debug name,
//! priority and scheduling state. TCBs live in a [`TaskTable`] arena and are
//! referred to everywhere else by [`TaskId`] handle, so wait-lists never own
//! or borrow a TCB directly.
//!
//! ## Task Lifecycle
//!
//! ```text
//! spawn → Ready → Running → BlockedOnSend/BlockedOnReceive → Ready → ...
//!                    ↓                                          ↑
//!                    └──────────────── yield ───────────────────┘
//!                                     delete → Deleted
//! ```
//!
//! State setters are crate-private: only wait-lists, queues and the
//! scheduler move a task between states, which keeps `state` and list
//! membership from diverging.

use core::fmt;

use crate::queue::QueueId;
use crate::wait_list::ListRole;
use crate::{Result, SchedError};

/// Task priority (0 = lowest, 255 = highest)
pub type Priority = u8;

/// Default priority for new tasks
pub const DEFAULT_PRIORITY: Priority = 100;

/// Maximum priority
pub const MAX_PRIORITY: Priority = Priority::MAX;

static_assertions::const_assert!(DEFAULT_PRIORITY < MAX_PRIORITY);
static_assertions::assert_impl_all!(Tcb: Send, Sync);
static_assertions::assert_impl_all!(TaskTable: Send, Sync);

/// Identifies one [`TaskTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(usize);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

/// Handle to a TCB in a [`TaskTable`]
///
/// Handles are never reused, so a handle to a deleted task stays invalid.
/// A handle also names its table: presenting it to any other table fails
/// the lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    table: TableId,
    index: usize,
}

impl TaskId {
    /// Get the raw index within the owning table
    #[inline]
    pub fn as_usize(self) -> usize {
        self.index
    }

    /// Table that created this handle
    #[inline]
    pub fn table(self) -> TableId {
        self.table
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.index)
    }
}

/// Task state - lifecycle states of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible to run, waiting in the ready queue
    Ready,

    /// Currently executing
    Running,

    /// Waiting for space in a full queue
    BlockedOnSend {
        /// Queue the task is waiting on
        queue: QueueId,
    },

    /// Waiting for data in an empty queue
    BlockedOnReceive {
        /// Queue the task is waiting on
        queue: QueueId,
    },

    /// Removed from scheduling; the handle is dead
    Deleted,
}

/// TCB configuration parameters
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Task name (for debugging)
    pub name: &'static str,

    /// Task priority (0-255)
    pub priority: Priority,
}

impl TaskConfig {
    /// Configuration with the default priority
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            priority: DEFAULT_PRIORITY,
        }
    }

    /// Override the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Task Control Block
pub struct Tcb {
    id: TaskId,

    /// Debug label
    name: &'static str,

    priority: Priority,

    state: TaskState,

    /// The list currently holding this task, if any
    ///
    /// At most one list may hold a task at a time; wait-lists check this
    /// before appending.
    list: Option<ListRole>,
}

impl Tcb {
    fn new(id: TaskId, config: TaskConfig) -> Self {
        Self {
            id,
            name: config.name,
            priority: config.priority,
            state: TaskState::Ready,
            list: None,
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// The list currently holding this task
    #[inline]
    pub fn list(&self) -> Option<ListRole> {
        self.list
    }

    /// Check if the task is ready or running
    #[inline]
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, TaskState::Ready | TaskState::Running)
    }

    /// Check if the task is waiting on a queue
    #[inline]
    pub fn is_blocked(&self) -> bool {
        matches!(
            self.state,
            TaskState::BlockedOnSend { .. } | TaskState::BlockedOnReceive { .. }
        )
    }

    /// Queue the task is blocked on, if any
    pub fn blocked_on(&self) -> Option<QueueId> {
        match self.state {
            TaskState::BlockedOnSend { queue } | TaskState::BlockedOnReceive { queue } => {
                Some(queue)
            }
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn set_state(&mut self, state: TaskState) {
        self.state = state;
    }

    #[inline]
    pub(crate) fn set_list(&mut self, list: Option<ListRole>) {
        self.list = list;
    }
}

impl fmt::Debug for Tcb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tcb")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("state", &self.state)
            .field("list", &self.list)
            .finish()
    }
}

/// Arena owning every TCB
///
/// Created once by the environment before scheduling begins. Deleted tasks
/// keep their slot as a tombstone so stale handles fail lookups instead of
/// aliasing a newer task.
#[derive(Debug)]
pub struct TaskTable {
    id: TableId,
    tasks: Vec<Tcb>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self {
            id: TableId(crate::next_object_id()),
            tasks: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Create a TCB in the Ready state (not yet in any list)
    pub fn create(&mut self, config: TaskConfig) -> TaskId {
        let id = TaskId {
            table: self.id,
            index: self.tasks.len(),
        };
        log::debug!(
            "[sched] created {} '{}' (priority {})",
            id,
            config.name,
            config.priority
        );
        self.tasks.push(Tcb::new(id, config));
        id
    }

    /// Get a TCB, including deleted ones
    ///
    /// Handles from another table yield `None`.
    pub fn get(&self, id: TaskId) -> Option<&Tcb> {
        if id.table != self.id {
            return None;
        }
        self.tasks.get(id.index)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut Tcb> {
        if id.table != self.id {
            return None;
        }
        self.tasks.get_mut(id.index)
    }

    /// Get a live TCB
    ///
    /// # Errors
    /// Returns `TaskNotFound` for unknown, deleted or foreign handles
    pub fn lookup(&self, id: TaskId) -> Result<&Tcb> {
        match self.get(id) {
            Some(tcb) if tcb.state != TaskState::Deleted => Ok(tcb),
            _ => Err(SchedError::TaskNotFound { task: id }),
        }
    }

    pub(crate) fn lookup_mut(&mut self, id: TaskId) -> Result<&mut Tcb> {
        match self.get_mut(id) {
            Some(tcb) if tcb.state != TaskState::Deleted => Ok(tcb),
            _ => Err(SchedError::TaskNotFound { task: id }),
        }
    }

    /// Mark a task deleted
    ///
    /// # Errors
    /// Returns `TaskBusy` while any list still holds the task
    pub fn delete(&mut self, id: TaskId) -> Result<()> {
        let tcb = self.lookup_mut(id)?;
        if tcb.list.is_some() {
            return Err(SchedError::TaskBusy { task: id });
        }
        tcb.state = TaskState::Deleted;
        log::debug!("[sched] deleted {} '{}'", id, tcb.name);
        Ok(())
    }

    /// Number of TCBs ever created (including deleted)
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of tasks that have not been deleted
    pub fn live_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.state != TaskState::Deleted)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tcb> {
        self.tasks.iter()
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}
