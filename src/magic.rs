//! Alternate-repeat ("magic") action resolution: derives an action from the
//! most recently emitted key, with a central place for the mod-tap tap-field
//! truncation/un-truncation (§9 "Mod-tap tap-field truncation").

use crate::binding::{ActionSink, Binding, BindingEvent};
use crate::macro_text::{MacroId, MacroTable};

/// Sentinel keycode meaning "repeat the last emitted key verbatim".
pub const REPEAT_KEYCODE: u32 = 0x7E;

/// Sentinel keycode identifying the alternate-repeat ("magic") key itself.
/// Does not fit a mod-tap's 8-bit tap field; truncates to
/// [`TRUNCATED_TAP_FIELD`] there, and must be un-truncated by
/// [`unwrap_tap_keycode`] before use.
pub const ALT_REPEAT_KEYCODE: u32 = 0x7F;

/// What [`ALT_REPEAT_KEYCODE`] truncates to when packed into a mod-tap's
/// 8-bit tap field. This is the single place that widening happens; no call
/// site should special-case `0x7A` itself.
pub const TRUNCATED_TAP_FIELD: u8 = 0x7A;

/// A behavior id reserved by this crate for "tap this bare keycode with
/// this modifier byte". The caller's [`ActionSink`] recognizes it and emits
/// the HID report directly; everywhere else a `Binding`'s `behavior` is
/// opaque to the core, but the magic resolver has to originate new bindings
/// that weren't in the keymap, so one reserved id is unavoidable.
pub const BEHAVIOR_TAP_KEYCODE: u16 = u16::MAX;

/// The remembered identity of the last emitted key, in whatever form the
/// keymap encoded it: a plain keycode, a mod-tap's (possibly truncated) tap
/// field, or a layer-tap's tap field. [`unwrap_tap_keycode`] normalizes all
/// three to a bare keycode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmittedKey {
    Plain(u32),
    ModTap { tap_field: u8 },
    LayerTap { tap: u32 },
}

/// Restores a mod-tap's truncated tap field to its canonical keycode, and
/// otherwise just extracts the tap-side keycode. This is the one place the
/// truncation is reversed (§9).
pub fn unwrap_tap_keycode(key: EmittedKey) -> u32 {
    match key {
        EmittedKey::Plain(kc) => kc,
        EmittedKey::ModTap { tap_field } => {
            if tap_field == TRUNCATED_TAP_FIELD {
                ALT_REPEAT_KEYCODE
            } else {
                tap_field as u32
            }
        }
        EmittedKey::LayerTap { tap } => tap,
    }
}

/// Repeat and alt-repeat keys must never become the remembered "last key"
/// (§4.4 "Last-key memory rules").
pub fn is_repeat_eligible(unwrapped_tap_keycode: u32) -> bool {
    !matches!(unwrapped_tap_keycode, REPEAT_KEYCODE | ALT_REPEAT_KEYCODE)
}

/// For a mod-tap whose tap field is the alt-repeat sentinel, a release is
/// the tap half (and should run the magic logic) iff `tap_count > 0` and the
/// key wasn't interrupted; otherwise it's the hold half.
pub fn mod_tap_release_is_tap(tap_count: u32, interrupted: bool) -> bool {
    tap_count > 0 && !interrupted
}

/// The alternate action a `last_key` maps to, per the keymap-supplied
/// [`MagicTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternateAction {
    Keycode(u32),
    Macro(MacroId),
    /// "Repeat previous" sentinel: a table miss, or an explicit entry.
    RepeatPrevious,
}

/// `last_key -> alternate` mapping, supplied by the keymap.
pub trait MagicTable {
    /// Looks up the alternate action for `last_key`. A miss must return
    /// [`AlternateAction::RepeatPrevious`].
    fn resolve(&self, last_key: u32) -> AlternateAction;
}

/// A simple slice-backed [`MagicTable`].
pub struct SliceMagicTable<'a> {
    pub entries: &'a [(u32, AlternateAction)],
}

impl<'a> MagicTable for SliceMagicTable<'a> {
    fn resolve(&self, last_key: u32) -> AlternateAction {
        self.entries
            .iter()
            .find(|(kc, _)| *kc == last_key)
            .map(|(_, alt)| *alt)
            .unwrap_or(AlternateAction::RepeatPrevious)
    }
}

/// Invokes the alternate-repeat action for `last_key` against `sink`,
/// expanding macros through `macros` where applicable (§4.4, §4.6).
///
/// Takes two distinct modifier snapshots, matching the resolver's step 4 vs.
/// step 5: a "repeat previous" result replays `last_key` with
/// `remembered_modifiers` (whatever was held when `last_key` itself was
/// emitted), while a mapped alternate keycode is tapped with
/// `current_modifiers` (whatever is held right now). Collapsing these to one
/// value would make repeat-previous replay today's modifiers instead of the
/// ones that were actually in effect when the repeated key was typed.
/// Returns `false` if the sink aborted mid-chain.
pub fn invoke_alt_repeat(
    sink: &mut impl ActionSink,
    table: &impl MagicTable,
    macros: &impl MacroTable,
    last_key: EmittedKey,
    remembered_modifiers: u8,
    current_modifiers: u8,
    event: BindingEvent,
) -> bool {
    let last = unwrap_tap_keycode(last_key);
    match table.resolve(last) {
        AlternateAction::Macro(id) => crate::macro_text::expand(sink, macros, id, event),
        AlternateAction::RepeatPrevious => tap_keycode(sink, last, remembered_modifiers, event),
        AlternateAction::Keycode(kc) => tap_keycode(sink, kc, current_modifiers, event),
    }
}

fn tap_keycode(sink: &mut impl ActionSink, keycode: u32, modifiers: u8, event: BindingEvent) -> bool {
    let binding = Binding::new(BEHAVIOR_TAP_KEYCODE, keycode, modifiers as u32);
    if sink.invoke(&binding, event, true) == crate::binding::Invoked::Abort {
        return false;
    }
    sink.invoke(&binding, event, false) != crate::binding::Invoked::Abort
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macro_text::{MacroId, SliceMacroTable};

    #[derive(Default)]
    struct Rec(Vec<(u32, bool)>);
    impl ActionSink for Rec {
        fn invoke(&mut self, b: &Binding, _e: BindingEvent, pressed: bool) -> crate::binding::Invoked {
            self.0.push((b.param1, pressed));
            crate::binding::Invoked::Ok
        }
    }

    #[derive(Default)]
    struct ModRec(Vec<(u32, u32, bool)>);
    impl ActionSink for ModRec {
        fn invoke(&mut self, b: &Binding, _e: BindingEvent, pressed: bool) -> crate::binding::Invoked {
            self.0.push((b.param1, b.param2, pressed));
            crate::binding::Invoked::Ok
        }
    }

    fn ev() -> BindingEvent {
        BindingEvent {
            position: 1,
            timestamp: 0,
            source: 0,
        }
    }

    #[test]
    fn mod_tap_truncation_round_trips() {
        let key = EmittedKey::ModTap {
            tap_field: TRUNCATED_TAP_FIELD,
        };
        assert_eq!(unwrap_tap_keycode(key), ALT_REPEAT_KEYCODE);
    }

    #[test]
    fn repeat_and_alt_repeat_are_ineligible() {
        assert!(!is_repeat_eligible(REPEAT_KEYCODE));
        assert!(!is_repeat_eligible(ALT_REPEAT_KEYCODE));
        assert!(is_repeat_eligible(0x04));
    }

    #[test]
    fn miss_repeats_last_key() {
        let table = SliceMagicTable { entries: &[] };
        let macros = SliceMacroTable { entries: &[] };
        let mut sink = Rec::default();
        invoke_alt_repeat(&mut sink, &table, &macros, EmittedKey::Plain(0x2C), 0, 0, ev());
        assert_eq!(sink.0, vec![(0x2C, true), (0x2C, false)]);
    }

    #[test]
    fn hit_taps_alternate_keycode() {
        // space -> X
        let table = SliceMagicTable {
            entries: &[(0x2C, AlternateAction::Keycode(0x1B))],
        };
        let macros = SliceMacroTable { entries: &[] };
        let mut sink = Rec::default();
        invoke_alt_repeat(&mut sink, &table, &macros, EmittedKey::Plain(0x2C), 0, 0, ev());
        assert_eq!(sink.0, vec![(0x1B, true), (0x1B, false)]);
    }

    #[test]
    fn hit_macro_expands_text() {
        let table = SliceMagicTable {
            entries: &[(0x2C, AlternateAction::Macro(MacroId(0)))],
        };
        let macros = SliceMacroTable {
            entries: &[(MacroId(0), "the")],
        };
        let mut sink = Rec::default();
        invoke_alt_repeat(&mut sink, &table, &macros, EmittedKey::Plain(0x2C), 0, 0, ev());
        assert_eq!(sink.0.len(), 6); // 3 chars * (press, release)
    }

    #[test]
    fn miss_repeats_with_remembered_not_current_modifiers() {
        let table = SliceMagicTable { entries: &[] };
        let macros = SliceMacroTable { entries: &[] };
        let mut sink = ModRec::default();
        // last_key was shift-a; the magic key itself is now pressed under ctrl.
        invoke_alt_repeat(
            &mut sink,
            &table,
            &macros,
            EmittedKey::Plain(0x04),
            crate::macro_text::MOD_LSHIFT,
            0x01, // ctrl, current but irrelevant to a miss
            ev(),
        );
        assert_eq!(
            sink.0,
            vec![
                (0x04, crate::macro_text::MOD_LSHIFT as u32, true),
                (0x04, crate::macro_text::MOD_LSHIFT as u32, false)
            ]
        );
    }

    #[test]
    fn hit_taps_alternate_with_current_not_remembered_modifiers() {
        let table = SliceMagicTable {
            entries: &[(0x2C, AlternateAction::Keycode(0x1B))],
        };
        let macros = SliceMacroTable { entries: &[] };
        let mut sink = ModRec::default();
        invoke_alt_repeat(
            &mut sink,
            &table,
            &macros,
            EmittedKey::Plain(0x2C),
            crate::macro_text::MOD_LSHIFT,
            0x01,
            ev(),
        );
        assert_eq!(sink.0, vec![(0x1B, 0x01, true), (0x1B, 0x01, false)]);
    }
}
