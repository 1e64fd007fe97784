//! The hold-tap state machine: one [`ActiveHoldTap`] per currently-held
//! dual-purpose key, and the flavor transition table that resolves it from
//! `Undecided` into `Tap`, `HoldTimer`, or `HoldInterrupt`.

use crate::binding::{invoke_binding_set, ActionSink, BindingEvent, Invoked};
use crate::config::{Flavor, HoldTapConfig};
use crate::last_key::{LastKeyInfo, LastTapped};
use crate::position::{Position, Source, Timestamp};

/// Resolution state of a hold-tap. Only `Undecided` can transition; the
/// other three are terminal with respect to the decision (though
/// [`ActiveHoldTap::decide_retro_tap`] can still re-terminate a `HoldTimer`
/// into `Tap`, and a sibling's decision can upgrade `HoldTimer` into
/// `HoldInterrupt` via [`ActiveHoldTap::upgrade_to_hold_interrupt`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Undecided,
    Tap,
    HoldInterrupt,
    HoldTimer,
}

/// The moment at which the state machine is asked to (possibly) decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionMoment {
    KeyDown,
    KeyUp,
    OtherKeyDown,
    OtherKeyUp,
    Timer,
    QuickTap,
}

/// Per-active-key state record. Holds a reference to its (externally owned,
/// keymap-supplied) configuration for the key's lifetime as an active
/// hold-tap.
#[derive(Debug)]
pub struct ActiveHoldTap<'a> {
    pub position: Position,
    pub source: Source,
    pub timestamp: Timestamp,
    pub status: Status,
    pub selected_flavor: Flavor,
    pub position_of_first_other_key_pressed: Option<Position>,
    pub config: HoldTapConfig<'a>,
}

impl<'a> ActiveHoldTap<'a> {
    pub fn new(
        position: Position,
        timestamp: Timestamp,
        source: Source,
        config: HoldTapConfig<'a>,
        last_key: LastKeyInfo,
    ) -> Self {
        let selected_flavor = Self::select_flavor(&config, last_key, timestamp);
        Self {
            position,
            source,
            timestamp,
            status: Status::Undecided,
            selected_flavor,
            position_of_first_other_key_pressed: None,
            config,
        }
    }

    /// Flavor selection at keydown (§4.1 "Flavor selection at keydown").
    fn select_flavor(config: &HoldTapConfig<'a>, last_key: LastKeyInfo, now: Timestamp) -> Flavor {
        if config.prior_keycodes.is_empty() {
            return config.normal_flavor;
        }
        if !last_key.valid {
            return config.normal_flavor;
        }
        if now - last_key.timestamp > config.prior_timeout_ms {
            return config.normal_flavor;
        }
        if config.prior_keycodes.contains(&last_key.keycode) {
            config.after_flavor
        } else {
            config.normal_flavor
        }
    }

    /// Quick-tap detection (§4.1).
    pub fn is_quick_tap(&self, last_tapped: &LastTapped) -> bool {
        if last_tapped.timestamp + self.config.require_prior_idle_ms > self.timestamp {
            return true;
        }
        last_tapped.position == self.position as i64
            && last_tapped.timestamp + self.config.quick_tap_ms > self.timestamp
    }

    fn event(&self) -> BindingEvent {
        BindingEvent {
            position: self.position,
            timestamp: self.timestamp,
            source: self.source,
        }
    }

    /// Attempts to transition out of `Undecided` for `moment`, per the
    /// flavor transition table, then applies the positional override.
    /// Returns `true` if this call decided the hold-tap.
    pub fn transition(&mut self, moment: DecisionMoment) -> bool {
        if self.status != Status::Undecided {
            return false;
        }
        use DecisionMoment::*;
        use Flavor::*;
        use Status::*;
        self.status = match (self.selected_flavor, moment) {
            (HoldPreferred, KeyUp) => Tap,
            (HoldPreferred, OtherKeyDown) => HoldInterrupt,
            (HoldPreferred, Timer) => HoldTimer,
            (HoldPreferred, QuickTap) => Tap,

            (Balanced, KeyUp) => Tap,
            (Balanced, OtherKeyUp) => HoldInterrupt,
            (Balanced, Timer) => HoldTimer,
            (Balanced, QuickTap) => Tap,

            (TapPreferred, KeyUp) => Tap,
            (TapPreferred, Timer) => HoldTimer,
            (TapPreferred, QuickTap) => Tap,

            _ => Undecided,
        };
        if self.status == Undecided {
            return false;
        }
        self.apply_positional_override();
        true
    }

    /// Positional override (§4.1): force `Tap` if a trigger-position set is
    /// configured and the first other key pressed isn't one of them.
    fn apply_positional_override(&mut self) {
        if self.config.hold_trigger_key_positions.is_empty() {
            return;
        }
        let Some(first_other) = self.position_of_first_other_key_pressed else {
            return;
        };
        if self
            .config
            .hold_trigger_key_positions
            .contains(&first_other)
        {
            return;
        }
        self.status = Status::Tap;
    }

    /// Records the first other-key position per the
    /// `hold_trigger_on_release` rule in §4.2 step 3.
    pub fn note_other_key(&mut self, position: Position, pressed: bool) {
        if self.position_of_first_other_key_pressed.is_none()
            && (pressed != self.config.hold_trigger_on_release)
        {
            self.position_of_first_other_key_pressed = Some(position);
        }
    }

    fn press_hold_binding(&self, sink: &mut impl ActionSink) -> Invoked {
        invoke_binding_set(sink, self.config.hold_bindings, self.event(), true)
    }

    fn release_hold_binding(&self, sink: &mut impl ActionSink) -> Invoked {
        invoke_binding_set(sink, self.config.hold_bindings, self.event(), false)
    }

    fn press_tap_binding(&self, sink: &mut impl ActionSink, last_tapped: &mut LastTapped) -> Invoked {
        last_tapped.store_hold_tap(self.position, self.timestamp);
        invoke_binding_set(sink, self.config.tap_bindings, self.event(), true)
    }

    fn release_tap_binding(&self, sink: &mut impl ActionSink) -> Invoked {
        invoke_binding_set(sink, self.config.tap_bindings, self.event(), false)
    }

    /// Invokes whichever binding set the current status/config selects. A
    /// retro-tap-eligible `HoldTimer` is a deliberate no-op here: its hold
    /// was never pressed, and might still be retroactively turned into a
    /// tap. Returns [`Invoked::Abort`] if any invocation aborted its chain.
    pub fn press_binding(&self, sink: &mut impl ActionSink, last_tapped: &mut LastTapped) -> Invoked {
        if self.config.retro_tap && self.status == Status::HoldTimer {
            return Invoked::Ok;
        }
        if matches!(self.status, Status::HoldTimer | Status::HoldInterrupt) {
            if self.config.hold_while_undecided {
                return Invoked::Ok; // already pressed at keydown
            }
            self.press_hold_binding(sink)
        } else {
            let mut result = Invoked::Ok;
            if self.config.hold_while_undecided && !self.config.hold_while_undecided_linger {
                result = self.release_hold_binding(sink);
            }
            match self.press_tap_binding(sink, last_tapped) {
                Invoked::Abort => Invoked::Abort,
                Invoked::Ok => result,
            }
        }
    }

    /// Returns [`Invoked::Abort`] if any invocation aborted its chain.
    pub fn release_binding(&self, sink: &mut impl ActionSink) -> Invoked {
        if self.config.retro_tap && self.status == Status::HoldTimer {
            return Invoked::Ok;
        }
        if matches!(self.status, Status::HoldTimer | Status::HoldInterrupt) {
            self.release_hold_binding(sink)
        } else {
            self.release_tap_binding(sink)
        }
    }

    /// After `KeyUp`, if still `HoldTimer` (never interrupted), retroactively
    /// re-interpret as a tap (§4.1 "Retro-tap").
    pub fn decide_retro_tap(&mut self, sink: &mut impl ActionSink, last_tapped: &mut LastTapped) {
        if !self.config.retro_tap || self.status != Status::HoldTimer {
            return;
        }
        self.release_binding(sink); // no-op: retro_tap && HoldTimer
        self.status = Status::Tap;
        self.press_binding(sink, last_tapped);
    }

    /// A sibling hold-tap decided `Hold`: any `HoldTimer` retro-tap candidate
    /// is no longer eligible and must upgrade to `HoldInterrupt`, pressing
    /// its hold binding now (§4.2 step 1).
    pub fn upgrade_to_hold_interrupt(&mut self, sink: &mut impl ActionSink) {
        if self.config.retro_tap && self.status == Status::HoldTimer {
            self.status = Status::HoldInterrupt;
            if !self.config.hold_while_undecided {
                self.press_hold_binding(sink);
            }
        }
    }

    /// `hold_while_undecided`: press the hold immediately at keydown, before
    /// any decision.
    pub fn press_hold_while_undecided(&self, sink: &mut impl ActionSink) {
        if self.config.hold_while_undecided {
            self.press_hold_binding(sink);
        }
    }

    /// On the key's own release, if `hold_while_undecided_linger` is set,
    /// the hold stays pressed until now.
    pub fn release_lingering_hold(&self, sink: &mut impl ActionSink) {
        if self.config.hold_while_undecided && self.config.hold_while_undecided_linger {
            self.release_hold_binding(sink);
        }
    }
}
