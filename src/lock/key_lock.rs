//! Fair reader-writer lock for a single key
//!
//! Ticket based: every request takes a ticket and is granted strictly in
//! ticket order. Consecutive shared requests are granted together.

use parking_lot::{Condvar, Mutex};

use super::LockMode;

/// Returned when the key was poisoned by a panicking writer
#[derive(Debug)]
pub(super) struct Poisoned;

#[derive(Debug, Default)]
struct LockState {
    /// Next ticket to hand out
    next_ticket: u64,
    /// Ticket allowed to be granted next
    serving: u64,
    /// Number of shared holders
    readers: usize,
    /// Whether an exclusive holder exists
    writer: bool,
    poisoned: bool,
}

impl LockState {
    fn compatible(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => !self.writer,
            LockMode::Exclusive => !self.writer && self.readers == 0,
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct KeyLock {
    state: Mutex<LockState>,
    cond: Condvar,
}

impl KeyLock {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is granted in `mode`
    pub(super) fn lock(&self, mode: LockMode) -> Result<(), Poisoned> {
        let mut state = self.state.lock();
        if state.poisoned {
            return Err(Poisoned);
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;

        // Our turn comes first; then wait for compatibility. A poisoned lock
        // still consumes the ticket so later waiters are not stranded.
        while state.serving != ticket || (!state.poisoned && !state.compatible(mode)) {
            self.cond.wait(&mut state);
        }
        state.serving += 1;

        if state.poisoned {
            self.cond.notify_all();
            return Err(Poisoned);
        }

        match mode {
            LockMode::Shared => state.readers += 1,
            LockMode::Exclusive => state.writer = true,
        }

        // The next ticket may be a shared request that can run alongside us
        self.cond.notify_all();
        Ok(())
    }

    pub(super) fn unlock(&self, mode: LockMode, poison: bool) {
        let mut state = self.state.lock();
        match mode {
            LockMode::Shared => {
                debug_assert!(state.readers > 0, "shared unlock without holder");
                state.readers = state.readers.saturating_sub(1);
            }
            LockMode::Exclusive => {
                debug_assert!(state.writer, "exclusive unlock without holder");
                state.writer = false;
            }
        }
        if poison {
            state.poisoned = true;
        }
        self.cond.notify_all();
    }

    pub(super) fn is_poisoned(&self) -> bool {
        self.state.lock().poisoned
    }
}
