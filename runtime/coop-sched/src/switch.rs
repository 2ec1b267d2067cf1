//! Task switch component trait
//!
//! The scheduler never switches stacks itself. It tells the host when a task
//! must stop running ([`TaskSwitch::suspend`]) and when it may run again
//! ([`TaskSwitch::resume`]); how that happens (threads, stackful
//! coroutines, a simulation loop) is up to the implementation.

use crate::tcb::TaskId;

/// Suspend/resume primitive provided by the host environment
pub trait TaskSwitch {
    /// Stop running `task` until it is resumed
    ///
    /// Called after the task has been put on a wait-list.
    fn suspend(&mut self, task: TaskId);

    /// Make `task` eligible to run again
    ///
    /// Called only after the task has been taken off the list it waited in,
    /// never twice for the same wait.
    fn resume(&mut self, task: TaskId);
}

impl<S: TaskSwitch + ?Sized> TaskSwitch for &mut S {
    fn suspend(&mut self, task: TaskId) {
        (**self).suspend(task)
    }

    fn resume(&mut self, task: TaskId) {
        (**self).resume(task)
    }
}

/// Switch that does nothing (pure bookkeeping hosts)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSwitch;

impl TaskSwitch for NullSwitch {
    fn suspend(&mut self, _task: TaskId) {}

    fn resume(&mut self, _task: TaskId) {}
}

/// A recorded switch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchEvent {
    Suspend(TaskId),
    Resume(TaskId),
}

/// Switch that records every request, in order
#[derive(Debug, Clone, Default)]
pub struct SwitchLog {
    events: Vec<SwitchEvent>,
}

impl SwitchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SwitchEvent] {
        &self.events
    }

    /// Number of times `task` was resumed
    pub fn resume_count(&self, task: TaskId) -> usize {
        self.events
            .iter()
            .filter(|&&e| e == SwitchEvent::Resume(task))
            .count()
    }

    /// Number of times `task` was suspended
    pub fn suspend_count(&self, task: TaskId) -> usize {
        self.events
            .iter()
            .filter(|&&e| e == SwitchEvent::Suspend(task))
            .count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl TaskSwitch for SwitchLog {
    fn suspend(&mut self, task: TaskId) {
        log::trace!("[switch] suspend {}", task);
        self.events.push(SwitchEvent::Suspend(task));
    }

    fn resume(&mut self, task: TaskId) {
        log::trace!("[switch] resume {}", task);
        self.events.push(SwitchEvent::Resume(task));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcb::{TaskConfig, TaskTable};

    #[test]
    fn log_records_in_order() {
        let mut tasks = TaskTable::new();
        let a = tasks.create(TaskConfig::new("a"));
        let b = tasks.create(TaskConfig::new("b"));

        let mut log = SwitchLog::new();
        log.suspend(a);
        log.resume(b);
        log.resume(a);

        assert_eq!(
            log.events(),
            &[
                SwitchEvent::Suspend(a),
                SwitchEvent::Resume(b),
                SwitchEvent::Resume(a)
            ]
        );
        assert_eq!(log.resume_count(a), 1);
        assert_eq!(log.suspend_count(b), 0);

        log.clear();
        assert!(log.events().is_empty());
    }

    #[test]
    fn borrowed_switch_forwards() {
        let mut tasks = TaskTable::new();
        let a = tasks.create(TaskConfig::new("a"));

        fn park<S: TaskSwitch>(mut switch: S, task: TaskId) {
            switch.suspend(task);
        }

        let mut log = SwitchLog::new();
        park(&mut log, a);
        assert_eq!(log.suspend_count(a), 1);
    }
}
