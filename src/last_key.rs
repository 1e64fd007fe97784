//! Tracks the most recently emitted (non-modifier) key, and the most
//! recently *tapped* hold-tap position, for quick-tap detection and flavor
//! selection.

use crate::position::{Position, Timestamp};

/// `{keycode, timestamp, valid}` for the last non-modifier keycode emitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastKeyTracker {
    usage_page: u16,
    keycode: u32,
    timestamp: Timestamp,
    valid: bool,
}

/// A snapshot of the last-key tracker, returned by [`LastKeyTracker::get`].
#[derive(Debug, Clone, Copy)]
pub struct LastKeyInfo {
    pub usage_page: u16,
    pub keycode: u32,
    pub timestamp: Timestamp,
    pub valid: bool,
}

impl LastKeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the tracker on a non-modifier keycode press. Guarded by a
    /// monotonic check so that clock-skewed split halves can't rewind the
    /// record with a stale event.
    pub fn record(&mut self, usage_page: u16, keycode: u32, timestamp: Timestamp) {
        if self.valid && timestamp < self.timestamp {
            return;
        }
        self.usage_page = usage_page;
        self.keycode = keycode;
        self.timestamp = timestamp;
        self.valid = true;
    }

    pub fn get(&self) -> LastKeyInfo {
        LastKeyInfo {
            usage_page: self.usage_page,
            keycode: self.keycode,
            timestamp: self.timestamp,
            valid: self.valid,
        }
    }
}

/// Which key was tapped most recently, for quick-tap detection. `position`
/// holds [`NOT_A_HOLD_TAP`] when the last tap wasn't a hold-tap's own tap.
#[derive(Debug, Clone, Copy)]
pub struct LastTapped {
    pub position: i64,
    pub timestamp: Timestamp,
}

/// Sentinel meaning "the last key wasn't a hold-tap".
pub const NOT_A_HOLD_TAP: i64 = i64::MIN / 2;

impl Default for LastTapped {
    fn default() -> Self {
        // Large negative so that `timestamp + anything` can't overflow, but
        // any real event timestamp still compares as "more recent".
        Self {
            position: NOT_A_HOLD_TAP,
            timestamp: i64::MIN / 2,
        }
    }
}

impl LastTapped {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a tap of any key (hold-tap or not) at `timestamp`: an
    /// ordinary tap resets the remembered position to "not a hold-tap".
    /// Guarded monotonically so an equal or later hold-tap record already
    /// in place can't be clobbered by a same-instant plain tap.
    pub fn store_plain_tap(&mut self, timestamp: Timestamp) {
        if timestamp > self.timestamp {
            self.position = NOT_A_HOLD_TAP;
            self.timestamp = timestamp;
        }
    }

    /// Records that hold-tap `position` resolved to TAP at `timestamp`.
    pub fn store_hold_tap(&mut self, position: Position, timestamp: Timestamp) {
        self.position = position as i64;
        self.timestamp = timestamp;
    }
}
