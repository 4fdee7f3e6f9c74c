//! Continuation bookkeeping for one core future.
//!
//! The scheduler only decides *which* callback to fire; [`Continuation`] fires
//! it after releasing the lock, so no lock is ever held across the boundary.
//! A cancel waits out fires already in flight on other threads, so once it
//! returns no callback runs again.

use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::{ContinuationCallback, PollCode};

/// A continuation to resume, with the code to resume it with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Wakeup {
    callback: ContinuationCallback,
    data: u64,
    code: PollCode,
}

impl Wakeup {
    pub(crate) fn new(callback: ContinuationCallback, data: u64, code: PollCode) -> Self {
        Self {
            callback,
            data,
            code,
        }
    }

    pub(crate) fn fire(self) {
        (self.callback)(self.data, self.code as i8);
    }
}

#[derive(Debug, Default)]
pub(crate) enum Scheduler {
    /// Nothing stored, no pending wake.
    #[default]
    Empty,
    /// Woken while no continuation was stored; the next one fires immediately.
    Waked,
    /// Waiting for a wake.
    Set(ContinuationCallback, u64),
    /// Terminal. Stored continuations are dropped and never fired.
    Cancelled,
}

impl Scheduler {
    /// Store a continuation after a poll that did not complete.
    pub(crate) fn store(&mut self, callback: ContinuationCallback, data: u64) -> Option<Wakeup> {
        match std::mem::take(self) {
            Self::Empty => {
                *self = Self::Set(callback, data);
                None
            }
            Self::Waked => Some(Wakeup::new(callback, data, PollCode::Wake)),
            // A second poll before the first was resumed: resume the old
            // continuation so it re-polls, keep the new one.
            Self::Set(old_callback, old_data) => {
                *self = Self::Set(callback, data);
                Some(Wakeup::new(old_callback, old_data, PollCode::Wake))
            }
            Self::Cancelled => {
                *self = Self::Cancelled;
                None
            }
        }
    }

    /// The future made progress; take the continuation to resume, if any.
    pub(crate) fn wake(&mut self) -> Option<Wakeup> {
        match std::mem::take(self) {
            Self::Set(callback, data) => Some(Wakeup::new(callback, data, PollCode::Wake)),
            Self::Empty | Self::Waked => {
                *self = Self::Waked;
                None
            }
            Self::Cancelled => {
                *self = Self::Cancelled;
                None
            }
        }
    }

    /// Enter the terminal state. Returns `false` if already cancelled.
    pub(crate) fn cancel(&mut self) -> bool {
        !matches!(std::mem::replace(self, Self::Cancelled), Self::Cancelled)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Default)]
struct Slot {
    scheduler: Scheduler,
    /// Threads currently running a callback taken from `scheduler`.
    firing: Vec<ThreadId>,
}

/// The scheduler of one future, plus the fires in flight.
#[derive(Debug, Default)]
pub(crate) struct Continuation {
    slot: Mutex<Slot>,
    idle: Condvar,
}

impl Continuation {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store a continuation after a poll that did not complete.
    pub(crate) fn store(&self, callback: ContinuationCallback, data: u64) {
        let mut slot = self.slot.lock();
        if let Some(wakeup) = slot.scheduler.store(callback, data) {
            self.fire(slot, wakeup);
        }
    }

    /// The future made progress.
    pub(crate) fn wake(&self) {
        let mut slot = self.slot.lock();
        if let Some(wakeup) = slot.scheduler.wake() {
            self.fire(slot, wakeup);
        }
    }

    /// Resume `callback` with READY unless cancelled. Returns whether it fired.
    pub(crate) fn ready(&self, callback: ContinuationCallback, data: u64) -> bool {
        let slot = self.slot.lock();
        if slot.scheduler.is_cancelled() {
            return false;
        }
        self.fire(slot, Wakeup::new(callback, data, PollCode::Ready));
        true
    }

    /// Enter the terminal state and wait for fires running on other threads.
    ///
    /// A fire on the calling thread is not waited for: a callback may cancel
    /// its own future. Returns `false` if already cancelled.
    pub(crate) fn cancel(&self) -> bool {
        let me = thread::current().id();
        let mut slot = self.slot.lock();
        let first = slot.scheduler.cancel();
        while slot.firing.iter().any(|id| *id != me) {
            self.idle.wait(&mut slot);
        }
        first
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.slot.lock().scheduler.is_cancelled()
    }

    fn fire(&self, mut slot: MutexGuard<'_, Slot>, wakeup: Wakeup) {
        let me = thread::current().id();
        slot.firing.push(me);
        drop(slot);

        wakeup.fire();

        let mut slot = self.slot.lock();
        if let Some(index) = slot.firing.iter().position(|id| *id == me) {
            slot.firing.swap_remove(index);
        }
        drop(slot);
        self.idle.notify_all();
    }
}
