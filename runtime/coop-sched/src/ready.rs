//! Ready Queue
//!
//! Per-priority FIFO lists of runnable tasks. The highest non-empty
//! priority is found through a 256-bit bitmap, so picking the next task is
//! O(1); tasks of equal priority run round-robin.

use crate::tcb::{Priority, TaskId, TaskTable};
use crate::wait_list::{ListRole, WaitList};
use crate::Result;

/// Number of priority levels
pub const NUM_PRIORITIES: usize = Priority::MAX as usize + 1;

/// Runnable tasks, ordered by priority then arrival
pub struct ReadyQueue {
    /// One FIFO list per priority level, index = priority
    levels: Vec<WaitList>,

    /// Bit `p` is set when `levels[p]` is non-empty
    ///
    /// bitmap[0] covers priorities 0-63, bitmap[3] covers 192-255.
    bitmap: [u64; 4],
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            levels: (0..NUM_PRIORITIES)
                .map(|_| WaitList::new(ListRole::Ready))
                .collect(),
            bitmap: [0; 4],
        }
    }

    /// Append a task to the tail of its priority level, marking it Ready
    ///
    /// # Errors
    /// - `TaskNotFound` for unknown or deleted tasks
    /// - `DoubleBlock` if the task is already held by a list
    pub fn push(&mut self, tasks: &mut TaskTable, id: TaskId) -> Result<()> {
        let priority = tasks.lookup(id)?.priority();
        self.levels[priority as usize].append(tasks, id)?;
        self.set_bit(priority);
        Ok(())
    }

    /// Remove the oldest task of the highest ready priority
    pub fn pop(&mut self, tasks: &mut TaskTable) -> Option<TaskId> {
        let priority = self.highest_priority()?;
        let level = &mut self.levels[priority as usize];
        let id = level.pop_front(tasks);
        if level.is_empty() {
            self.clear_bit(priority);
        }
        id
    }

    /// Remove a specific task
    ///
    /// Returns true if the task was found and removed.
    pub fn remove(&mut self, tasks: &mut TaskTable, id: TaskId) -> bool {
        let Some(priority) = tasks.get(id).map(|t| t.priority()) else {
            return false;
        };
        let level = &mut self.levels[priority as usize];
        let removed = level.remove(tasks, id);
        if level.is_empty() {
            self.clear_bit(priority);
        }
        removed
    }

    /// Highest priority with runnable tasks
    pub fn highest_priority(&self) -> Option<Priority> {
        for (chunk_idx, &chunk) in self.bitmap.iter().enumerate().rev() {
            if chunk != 0 {
                let bit = 63 - chunk.leading_zeros() as usize;
                return Some((chunk_idx * 64 + bit) as Priority);
            }
        }
        None
    }

    /// Total number of ready tasks
    pub fn len(&self) -> usize {
        self.levels.iter().map(WaitList::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap.iter().all(|&chunk| chunk == 0)
    }

    /// Ready tasks in the order they would be picked
    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.levels.iter().rev().flat_map(WaitList::iter)
    }

    fn set_bit(&mut self, priority: Priority) {
        let p = priority as usize;
        self.bitmap[p / 64] |= 1u64 << (p % 64);
    }

    fn clear_bit(&mut self, priority: Priority) {
        let p = priority as usize;
        self.bitmap[p / 64] &= !(1u64 << (p % 64));
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ReadyQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReadyQueue")
            .field("len", &self.len())
            .field("highest_priority", &self.highest_priority())
            .finish()
    }
}
