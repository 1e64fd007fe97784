//! One delayable work item per active hold-tap.
//!
//! A kernel work queue would schedule a `k_work_delayable` per hold-tap and
//! call back into the decision function when it fires. This crate has no
//! kernel work queue to borrow, so it models the same contract
//! cooperatively: [`Engine::tick`](crate::engine::Engine::tick) is the
//! caller's "let the work queue run" moment, and [`TimerService`] just
//! tracks deadlines by stable slot index, avoiding self-referential
//! pointers into the active-hold-tap array.

use crate::position::Timestamp;
use crate::MAX_HELD;

/// What happened when [`TimerService::cancel`] was asked to stop a slot's
/// timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The timer had not yet fired; it is now inert.
    Cancelled,
    /// The timer already fired (or was never scheduled); nothing to do.
    AlreadyFired,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    deadline: Option<Timestamp>,
    cancelled: bool,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            deadline: None,
            cancelled: false,
        }
    }
}

/// Tracks one deadline per active-hold-tap slot index.
#[derive(Debug)]
pub struct TimerService {
    slots: [Slot; MAX_HELD],
}

impl Default for TimerService {
    fn default() -> Self {
        Self {
            slots: [Slot::default(); MAX_HELD],
        }
    }
}

impl TimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `slot` to fire at `max(0, timestamp + tapping_term_ms - now)`
    /// from `now`, i.e. at `timestamp + tapping_term_ms`, clamped so a
    /// hold-tap registered "late" (e.g. in a replayed/simulated stream)
    /// fires immediately rather than in the past.
    pub fn schedule(&mut self, slot: usize, timestamp: Timestamp, tapping_term_ms: i64, now: Timestamp) {
        let deadline = (timestamp + tapping_term_ms).max(now);
        self.slots[slot] = Slot {
            deadline: Some(deadline),
            cancelled: false,
        };
    }

    /// Cancels `slot`'s timer. Idempotent: cancelling twice, or cancelling a
    /// slot with no outstanding timer, both report `AlreadyFired`.
    pub fn cancel(&mut self, slot: usize) -> CancelOutcome {
        let s = &mut self.slots[slot];
        if s.deadline.take().is_some() && !s.cancelled {
            CancelOutcome::Cancelled
        } else {
            CancelOutcome::AlreadyFired
        }
    }

    /// True if `slot`'s deadline is at or before `now` and it hasn't been
    /// cancelled.
    pub fn is_due(&self, slot: usize, now: Timestamp) -> bool {
        match self.slots[slot].deadline {
            Some(d) => now >= d && !self.slots[slot].cancelled,
            None => false,
        }
    }

    /// Clears `slot`'s timer state so it can be reused by a new hold-tap.
    pub fn clear(&mut self, slot: usize) {
        self.slots[slot] = Slot::default();
    }
}
