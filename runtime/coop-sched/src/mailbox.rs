//! Mailbox - single-slot, overwrite-on-write message holder
//!
//! Unlike a capacity-1 [`BoundedQueue`](crate::BoundedQueue), a mailbox
//! never blocks: a write replaces whatever value is held. Useful for
//! "latest reading" data where history does not matter.

/// Single-value mailbox with overwrite semantics
#[derive(Debug, Clone, Copy)]
pub struct Mailbox<T: Copy> {
    slot: Option<T>,

    /// Writes that replaced an unread value
    overwrites: usize,
}

impl<T: Copy> Mailbox<T> {
    pub const fn new() -> Self {
        Self {
            slot: None,
            overwrites: 0,
        }
    }

    /// Store `value`, returning the unread value it replaced
    pub fn write(&mut self, value: T) -> Option<T> {
        let old = self.slot.replace(value);
        if old.is_some() {
            self.overwrites += 1;
            log::trace!("[mailbox] overwrote unread value");
        }
        old
    }

    /// Copy of the held value, leaving it in place
    pub fn peek(&self) -> Option<T> {
        self.slot
    }

    /// Take the held value, leaving the mailbox empty
    pub fn take(&mut self) -> Option<T> {
        self.slot.take()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.slot.is_some()
    }

    /// Number of writes that replaced an unread value
    #[inline]
    pub fn overwrites(&self) -> usize {
        self.overwrites
    }
}

impl<T: Copy> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
