//! The event dispatcher: owns every active hold-tap, the capture buffer, the
//! timer service, and the last-key trackers, and exposes the handful of
//! entry points a keymap driver calls into (§4.2).

use crate::binding::{ActionSink, BindingEvent, Invoked};
use crate::capture::{CaptureBuffer, CapturedEvent};
use crate::config::HoldTapConfig;
use crate::error::{CapacityKind, EngineError, InvariantKind};
use crate::keycode::is_modifier;
use crate::last_key::{LastKeyTracker, LastTapped};
use crate::macro_text::MacroTable;
use crate::magic::{self, EmittedKey, MagicTable};
use crate::position::{KeycodeEvent, Position, PositionEvent, Propagation, Source, Timestamp};
use crate::state::{ActiveHoldTap, DecisionMoment, Status};
use crate::timer::TimerService;
use crate::MAX_HELD;

/// Owns the full set of active hold-taps plus the ambient trackers they
/// share (capture buffer, timers, last-key memory). One instance per keymap,
/// created once at startup (§5 "Single-instance ownership").
pub struct Engine<'a> {
    slots: [Option<ActiveHoldTap<'a>>; MAX_HELD],
    undecided: Option<usize>,
    captures: CaptureBuffer,
    timers: TimerService,
    last_key: LastKeyTracker,
    last_tapped: LastTapped,
    last_emitted: EmittedKey,
    /// Modifiers held at the moment `last_emitted` was recorded, for the
    /// "repeat previous" path of the magic resolver (§4.4 step 4).
    last_emitted_modifiers: u8,
}

impl<'a> Default for Engine<'a> {
    fn default() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            undecided: None,
            captures: CaptureBuffer::new(),
            timers: TimerService::new(),
            last_key: LastKeyTracker::new(),
            last_tapped: LastTapped::new(),
            last_emitted: EmittedKey::Plain(0),
            last_emitted_modifiers: 0,
        }
    }
}

impl<'a> Engine<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_slot(&self, position: Position) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(ht) if ht.position == position))
    }

    /// A hold-tap key went down. Stores it as the new undecided hold-tap,
    /// runs the quick-tap check, and schedules its timer.
    pub fn press_hold_tap(
        &mut self,
        sink: &mut impl ActionSink,
        position: Position,
        timestamp: Timestamp,
        source: Source,
        config: HoldTapConfig<'a>,
    ) -> Result<(), EngineError> {
        if self.undecided.is_some() {
            log::error!("{} another hold-tap behavior is undecided", position);
            return Err(EngineError::InvariantViolation {
                what: InvariantKind::SecondUndecidedHoldTap,
                position,
            });
        }

        let idx = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(EngineError::CapacityExceeded {
                what: CapacityKind::ActiveHoldTaps,
                position,
            })?;

        let last_key = self.last_key.get();
        let ht = ActiveHoldTap::new(position, timestamp, source, config, last_key);
        log::debug!(
            "{} new undecided hold-tap flavor={:?}",
            position,
            ht.selected_flavor
        );
        self.slots[idx] = Some(ht);
        self.undecided = Some(idx);

        if self.slots[idx].as_ref().unwrap().is_quick_tap(&self.last_tapped) {
            self.decide(sink, idx, DecisionMoment::QuickTap);
        }

        if self.undecided == Some(idx) && config.hold_while_undecided {
            log::debug!("{} hold behavior pressed while undecided", position);
            self.slots[idx].as_ref().unwrap().press_hold_while_undecided(sink);
        }

        if self.undecided == Some(idx) {
            self.timers.schedule(idx, timestamp, config.tapping_term_ms, timestamp);
        }

        Ok(())
    }

    /// A hold-tap key went up. Forces a timer decision if the tapping term
    /// already elapsed, decides `KeyUp`, applies retro-tap, releases
    /// whichever binding is currently pressed, and frees the slot.
    pub fn release_hold_tap(
        &mut self,
        sink: &mut impl ActionSink,
        position: Position,
        timestamp: Timestamp,
    ) -> Result<(), EngineError> {
        let idx = self.find_slot(position).ok_or(EngineError::InvariantViolation {
            what: InvariantKind::MissingActiveHoldTapOnRelease,
            position,
        })?;

        self.timers.cancel(idx);

        let deadline = {
            let ht = self.slots[idx].as_ref().unwrap();
            ht.timestamp + ht.config.tapping_term_ms
        };
        if timestamp > deadline {
            self.decide(sink, idx, DecisionMoment::Timer);
        }
        self.decide(sink, idx, DecisionMoment::KeyUp);

        if let Some(ht) = self.slots[idx].as_mut() {
            ht.decide_retro_tap(sink, &mut self.last_tapped);
            if ht.release_binding(sink) == Invoked::Abort {
                log::error!("{}", EngineError::BindingFailure { position });
            }
            ht.release_lingering_hold(sink);
        }

        self.timers.clear(idx);
        self.slots[idx] = None;
        self.replay_captured(sink);
        Ok(())
    }

    /// The timer service's deadline check; call periodically (or at least
    /// whenever no other event is arriving) so a hold-tap resolves even if
    /// nothing else happens before its tapping term elapses.
    pub fn tick(&mut self, sink: &mut impl ActionSink, now: Timestamp) {
        for idx in 0..MAX_HELD {
            if self.slots[idx].is_some() && self.timers.is_due(idx, now) {
                self.decide(sink, idx, DecisionMoment::Timer);
            }
        }
    }

    /// Dispatches a raw key-position change (§4.2 steps 1-8). Returns
    /// whether the caller should let the event continue downstream
    /// (`Bubble`) or treat it as consumed (`Captured`).
    pub fn dispatch_position_event(
        &mut self,
        sink: &mut impl ActionSink,
        ev: PositionEvent,
    ) -> Result<Propagation, EngineError> {
        self.upgrade_retro_tap_siblings(sink, ev.position);

        let Some(idx) = self.undecided else {
            return Ok(Propagation::Bubble);
        };

        self.slots[idx].as_mut().unwrap().note_other_key(ev.position, ev.pressed);

        let own_position = self.slots[idx].as_ref().unwrap().position;
        if own_position == ev.position {
            return Ok(Propagation::Bubble);
        }

        let deadline = {
            let ht = self.slots[idx].as_ref().unwrap();
            ht.timestamp + ht.config.tapping_term_ms
        };
        if ev.timestamp > deadline {
            self.decide(sink, idx, DecisionMoment::Timer);
        }

        if self.undecided.is_none() {
            return Ok(Propagation::Bubble);
        }

        if !ev.pressed && !self.captures.has_captured_keydown(ev.position) {
            return Ok(Propagation::Bubble);
        }

        self.captures
            .push(CapturedEvent::PositionChange(ev))
            .map_err(|_| EngineError::CapacityExceeded {
                what: CapacityKind::CaptureBuffer,
                position: ev.position,
            })?;
        let moment = if ev.pressed {
            DecisionMoment::OtherKeyDown
        } else {
            DecisionMoment::OtherKeyUp
        };
        self.decide(sink, idx, moment);
        Ok(Propagation::Captured)
    }

    /// Dispatches a raw HID usage change. Only modifiers are ever captured;
    /// non-modifier presses update the last-key trackers used for
    /// quick-tap and flavor selection.
    pub fn dispatch_keycode_event(
        &mut self,
        _sink: &mut impl ActionSink,
        ev: KeycodeEvent,
    ) -> Result<Propagation, EngineError> {
        if ev.pressed && !is_modifier(ev.usage_page, ev.keycode) {
            self.last_key.record(ev.usage_page, ev.keycode, ev.timestamp);
            self.last_tapped.store_plain_tap(ev.timestamp);
        }

        let Some(idx) = self.undecided else {
            return Ok(Propagation::Bubble);
        };

        if !is_modifier(ev.usage_page, ev.keycode) {
            return Ok(Propagation::Bubble);
        }

        let bubble_while_undecided = {
            let ht = self.slots[idx].as_ref().unwrap();
            ht.config.hold_while_undecided && ht.status == Status::Undecided
        };
        if bubble_while_undecided {
            return Ok(Propagation::Bubble);
        }

        self.captures
            .push(CapturedEvent::KeycodeChange(ev))
            .map_err(|_| EngineError::CapacityExceeded {
                what: CapacityKind::CaptureBuffer,
                position: crate::position::POSITION_NONE,
            })?;
        Ok(Propagation::Captured)
    }

    /// Records the identity of a just-emitted key, and the modifiers held
    /// when it was emitted, for the alternate-repeat resolver, unless it's
    /// itself a repeat/alt-repeat key (§4.4).
    pub fn record_emitted_key(&mut self, key: EmittedKey, modifiers: u8) {
        if magic::is_repeat_eligible(magic::unwrap_tap_keycode(key)) {
            self.last_emitted = key;
            self.last_emitted_modifiers = modifiers;
        }
    }

    /// A non-mod-tap alternate-repeat key was pressed: resolve and invoke
    /// immediately. `current_modifiers` is whatever is held right now, used
    /// only for a mapped-alternate hit (§4.4 step 5); a "repeat previous"
    /// result instead replays `last_emitted`'s own remembered modifiers
    /// (§4.4 step 4). Returns `false` if the sink aborted mid-chain.
    pub fn press_magic_key(
        &mut self,
        sink: &mut impl ActionSink,
        table: &impl MagicTable,
        macros: &impl MacroTable,
        current_modifiers: u8,
        event: BindingEvent,
    ) -> bool {
        magic::invoke_alt_repeat(
            sink,
            table,
            macros,
            self.last_emitted,
            self.last_emitted_modifiers,
            current_modifiers,
            event,
        )
    }

    /// A mod-tap-flavored alternate-repeat key was released: resolve and
    /// invoke only if this release was a genuine tap, not a hold.
    pub fn release_mod_tap_magic_key(
        &mut self,
        sink: &mut impl ActionSink,
        table: &impl MagicTable,
        macros: &impl MacroTable,
        current_modifiers: u8,
        event: BindingEvent,
        tap_count: u32,
        interrupted: bool,
    ) -> bool {
        if magic::mod_tap_release_is_tap(tap_count, interrupted) {
            magic::invoke_alt_repeat(
                sink,
                table,
                macros,
                self.last_emitted,
                self.last_emitted_modifiers,
                current_modifiers,
                event,
            )
        } else {
            true
        }
    }

    fn decide(&mut self, sink: &mut impl ActionSink, idx: usize, moment: DecisionMoment) {
        let decided = match self.slots[idx].as_mut() {
            Some(ht) if ht.status == Status::Undecided => ht.transition(moment),
            _ => return,
        };
        if !decided {
            return;
        }
        self.undecided = None;
        let ht = self.slots[idx].as_ref().unwrap();
        log::debug!(
            "{} decided {:?} ({:?} decision moment {:?})",
            ht.position,
            ht.status,
            ht.selected_flavor,
            moment
        );
        let invoked = self.slots[idx]
            .as_ref()
            .unwrap()
            .press_binding(sink, &mut self.last_tapped);
        if invoked == Invoked::Abort {
            log::error!(
                "{}",
                EngineError::BindingFailure { position: ht.position }
            );
        }
        self.replay_captured(sink);
    }

    fn upgrade_retro_tap_siblings(&mut self, sink: &mut impl ActionSink, ignore_position: Position) {
        for idx in 0..MAX_HELD {
            let should_upgrade = matches!(
                &self.slots[idx],
                Some(ht) if ht.position != ignore_position
                    && ht.config.retro_tap
                    && ht.status == Status::HoldTimer
            );
            if should_upgrade {
                let position = self.slots[idx].as_ref().unwrap().position;
                log::debug!("upgrading hold-tap {} to hold-interrupt", position);
                self.slots[idx].as_mut().unwrap().upgrade_to_hold_interrupt(sink);
            }
        }
    }

    /// Drains captured events back through dispatch once nothing is
    /// undecided, stopping early if a fresh undecided hold-tap appears
    /// mid-drain.
    fn replay_captured(&mut self, sink: &mut impl ActionSink) {
        if self.undecided.is_some() {
            return;
        }
        while self.undecided.is_none() {
            let Some(ev) = self.captures.pop() else {
                break;
            };
            match ev {
                CapturedEvent::PositionChange(pe) => {
                    let _ = self.dispatch_position_event(sink, pe);
                }
                CapturedEvent::KeycodeChange(ke) => {
                    let _ = self.dispatch_keycode_event(sink, ke);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Binding, Invoked};
    use crate::config::Flavor;
    use crate::magic::{AlternateAction, SliceMagicTable};
    use crate::macro_text::SliceMacroTable;

    #[derive(Default)]
    struct Rec(Vec<(Position, u16, bool)>);
    impl ActionSink for Rec {
        fn invoke(&mut self, b: &Binding, e: BindingEvent, pressed: bool) -> Invoked {
            self.0.push((e.position, b.behavior, pressed));
            Invoked::Ok
        }
    }

    const TAP: [Binding; 1] = [Binding::new(1, 0, 0)];
    const HOLD: [Binding; 1] = [Binding::new(2, 0, 0)];

    struct Aborting;
    impl ActionSink for Aborting {
        fn invoke(&mut self, _b: &Binding, _e: BindingEvent, _pressed: bool) -> Invoked {
            Invoked::Abort
        }
    }

    #[test]
    fn aborted_binding_is_swallowed_not_propagated() {
        let mut engine = Engine::new();
        let mut sink = Aborting;
        let cfg = HoldTapConfig::plain(200, &TAP, &HOLD);
        // an aborting sink must not panic or poison the engine; the slot
        // still frees and the next hold-tap can be pressed normally.
        engine.press_hold_tap(&mut sink, 10, 0, 0, cfg).unwrap();
        engine.release_hold_tap(&mut sink, 10, 50).unwrap();
        engine.press_hold_tap(&mut sink, 10, 60, 0, cfg).unwrap();
        engine.release_hold_tap(&mut sink, 10, 70).unwrap();
    }

    #[test]
    fn pure_tap_resolves_on_release() {
        let mut engine = Engine::new();
        let mut sink = Rec::default();
        let cfg = HoldTapConfig::plain(200, &TAP, &HOLD);
        engine.press_hold_tap(&mut sink, 10, 0, 0, cfg).unwrap();
        engine.release_hold_tap(&mut sink, 10, 50).unwrap();
        assert_eq!(sink.0, vec![(10, 1, true), (10, 1, false)]);
    }

    #[test]
    fn pure_hold_resolves_on_timer_tick() {
        let mut engine = Engine::new();
        let mut sink = Rec::default();
        let cfg = HoldTapConfig::plain(200, &TAP, &HOLD);
        engine.press_hold_tap(&mut sink, 10, 0, 0, cfg).unwrap();
        engine.tick(&mut sink, 199);
        assert!(sink.0.is_empty());
        engine.tick(&mut sink, 200);
        assert_eq!(sink.0, vec![(10, 2, true)]);
        engine.release_hold_tap(&mut sink, 10, 300).unwrap();
        assert_eq!(sink.0, vec![(10, 2, true), (10, 2, false)]);
    }

    #[test]
    fn other_key_up_interrupts_into_hold() {
        let mut engine = Engine::new();
        let mut sink = Rec::default();
        let cfg = HoldTapConfig::plain(200, &TAP, &HOLD);
        engine.press_hold_tap(&mut sink, 10, 0, 0, cfg).unwrap();

        let down = PositionEvent {
            position: 20,
            pressed: true,
            timestamp: 10,
            source: 0,
        };
        assert_eq!(
            engine.dispatch_position_event(&mut sink, down).unwrap(),
            Propagation::Captured
        );

        let up = PositionEvent {
            position: 20,
            pressed: false,
            timestamp: 20,
            source: 0,
        };
        assert_eq!(
            engine.dispatch_position_event(&mut sink, up).unwrap(),
            Propagation::Captured
        );

        // the hold binding fires; the captured other-key events replay as
        // plain bubbled position events, which this crate never invokes
        // bindings for itself (that's the keymap's job downstream).
        assert_eq!(sink.0, vec![(10, 2, true)]);
    }

    #[test]
    fn positional_override_forces_tap_through_dispatch() {
        let mut engine = Engine::new();
        let mut sink = Rec::default();
        let positions = [99u32];
        let mut cfg = HoldTapConfig::plain(200, &TAP, &HOLD);
        cfg.hold_trigger_key_positions = &positions;
        engine.press_hold_tap(&mut sink, 10, 0, 0, cfg).unwrap();

        let down = PositionEvent {
            position: 20,
            pressed: true,
            timestamp: 10,
            source: 0,
        };
        engine.dispatch_position_event(&mut sink, down).unwrap();
        let up = PositionEvent {
            position: 20,
            pressed: false,
            timestamp: 20,
            source: 0,
        };
        engine.dispatch_position_event(&mut sink, up).unwrap();

        // positional override forces a tap; pos 20's own events just bubble.
        assert_eq!(sink.0, vec![(10, 1, true)]);
    }

    #[test]
    fn quick_tap_resolves_immediately() {
        let mut engine = Engine::new();
        let mut sink = Rec::default();
        let mut cfg = HoldTapConfig::plain(200, &TAP, &HOLD);
        cfg.quick_tap_ms = 150;
        engine.press_hold_tap(&mut sink, 10, 0, 0, cfg).unwrap();
        engine.release_hold_tap(&mut sink, 10, 20).unwrap();

        // second tap of the same position shortly after is a quick tap.
        engine.press_hold_tap(&mut sink, 10, 30, 0, cfg).unwrap();
        assert_eq!(sink.0.last(), Some(&(10, 1, true)));
    }

    #[test]
    fn after_flavor_selected_following_prior_keycode() {
        let mut engine = Engine::new();
        let mut sink = Rec::default();
        let prior = [0x2Cu32];
        let mut cfg = HoldTapConfig::plain(200, &TAP, &HOLD);
        cfg.normal_flavor = Flavor::Balanced;
        cfg.after_flavor = Flavor::HoldPreferred;
        cfg.prior_keycodes = &prior;
        cfg.prior_timeout_ms = 500;

        let space_press = KeycodeEvent {
            usage_page: 0x07,
            keycode: 0x2C,
            pressed: true,
            timestamp: 0,
            implicit_modifiers: 0,
            explicit_modifiers: 0,
        };
        engine.dispatch_keycode_event(&mut sink, space_press).unwrap();

        engine.press_hold_tap(&mut sink, 10, 10, 0, cfg).unwrap();

        let down = PositionEvent {
            position: 20,
            pressed: true,
            timestamp: 15,
            source: 0,
        };
        engine.dispatch_position_event(&mut sink, down).unwrap();
        // hold-preferred: other-key-down alone decides hold-interrupt.
        assert_eq!(sink.0, vec![(10, 2, true)]);
    }

    #[test]
    fn capacity_exceeded_when_slots_full() {
        let mut engine = Engine::new();
        let mut sink = Rec::default();
        let cfg = HoldTapConfig::plain(200, &TAP, &HOLD);
        // each prior hold-tap must resolve (via its timer) before the next
        // one can become undecided; resolved hold-taps still occupy a slot
        // until their own release arrives.
        for i in 0..MAX_HELD as u32 {
            engine.press_hold_tap(&mut sink, i, 0, 0, cfg).unwrap();
            engine.tick(&mut sink, 200);
        }
        let err = engine.press_hold_tap(&mut sink, 999, 0, 0, cfg).unwrap_err();
        assert_eq!(
            err,
            EngineError::CapacityExceeded {
                what: CapacityKind::ActiveHoldTaps,
                position: 999
            }
        );
    }

    #[test]
    fn magic_key_repeats_last_emitted_by_default() {
        let mut engine = Engine::new();
        let mut sink = Rec::default();
        engine.record_emitted_key(EmittedKey::Plain(0x2C), 0);
        let table = SliceMagicTable { entries: &[] };
        let macros = SliceMacroTable { entries: &[] };
        let event = BindingEvent {
            position: 30,
            timestamp: 0,
            source: 0,
        };
        engine.press_magic_key(&mut sink, &table, &macros, 0, event);
        assert_eq!(
            sink.0,
            vec![
                (30, magic::BEHAVIOR_TAP_KEYCODE, true),
                (30, magic::BEHAVIOR_TAP_KEYCODE, false)
            ]
        );
    }

    #[test]
    fn magic_key_uses_mapped_alternate() {
        let mut engine = Engine::new();
        let mut sink = Rec::default();
        engine.record_emitted_key(EmittedKey::Plain(0x2C), 0);
        let table = SliceMagicTable { entries: &[(0x2C, AlternateAction::Keycode(0x1B))] };
        let macros = SliceMacroTable { entries: &[] };
        let event = BindingEvent {
            position: 30,
            timestamp: 0,
            source: 0,
        };
        engine.press_magic_key(&mut sink, &table, &macros, 0, event);
        assert_eq!(sink.0[0].1, magic::BEHAVIOR_TAP_KEYCODE);
    }

    #[test]
    fn mod_tap_magic_release_hold_is_not_repeated() {
        let mut engine = Engine::new();
        let mut sink = Rec::default();
        engine.record_emitted_key(EmittedKey::Plain(0x2C), 0);
        let table = SliceMagicTable { entries: &[] };
        let macros = SliceMacroTable { entries: &[] };
        let event = BindingEvent {
            position: 30,
            timestamp: 0,
            source: 0,
        };
        engine.release_mod_tap_magic_key(&mut sink, &table, &macros, 0, event, 0, false);
        assert!(sink.0.is_empty());
    }
}
