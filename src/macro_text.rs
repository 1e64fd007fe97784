//! ASCII macro expansion: "tap this short string out one keycode at a time".
//!
//! Grounded in the magic key's macro case, which resolves to a stored
//! sequence of taps rather than a single keycode. This crate only expands
//! printable ASCII; anything else falls back to `RepeatPrevious` in the
//! caller (see [`crate::magic::AlternateAction`]).

use crate::binding::{ActionSink, Binding, BindingEvent};
use crate::magic::BEHAVIOR_TAP_KEYCODE;

/// Left-shift HID modifier bit, set on a binding's `param2` when a macro
/// character needs shift (uppercase letters, most punctuation).
pub const MOD_LSHIFT: u8 = 0x02;

/// Identifies one entry in a [`MacroTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroId(pub u32);

/// Keymap-supplied `id -> text` table.
pub trait MacroTable {
    /// Looks up the text for `id`, if it exists.
    fn text(&self, id: MacroId) -> Option<&str>;
}

/// A simple slice-backed [`MacroTable`].
pub struct SliceMacroTable<'a> {
    pub entries: &'a [(MacroId, &'a str)],
}

impl<'a> MacroTable for SliceMacroTable<'a> {
    fn text(&self, id: MacroId) -> Option<&str> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, text)| *text)
    }
}

/// Expands `id` against `table`, tapping each resolvable character through
/// `sink`. Unresolvable characters (outside printable ASCII) are skipped
/// rather than aborting the whole macro. Returns `false` if the sink
/// aborted mid-expansion.
pub fn expand(sink: &mut impl ActionSink, table: &impl MacroTable, id: MacroId, event: BindingEvent) -> bool {
    let Some(text) = table.text(id) else {
        return true;
    };
    for ch in text.chars() {
        if let Some((keycode, modifiers)) = ascii_to_keycode(ch) {
            let binding = Binding::new(BEHAVIOR_TAP_KEYCODE, keycode, modifiers as u32);
            if sink.invoke(&binding, event, true) == crate::binding::Invoked::Abort {
                return false;
            }
            if sink.invoke(&binding, event, false) == crate::binding::Invoked::Abort {
                return false;
            }
        }
    }
    true
}

/// Maps a printable ASCII character to `(keycode, modifiers)` on a standard
/// US HID keyboard usage page. Returns `None` for anything outside printable
/// ASCII.
fn ascii_to_keycode(ch: char) -> Option<(u32, u8)> {
    match ch {
        'a'..='z' => Some((0x04 + (ch as u32 - 'a' as u32), 0)),
        'A'..='Z' => Some((0x04 + (ch.to_ascii_lowercase() as u32 - 'a' as u32), MOD_LSHIFT)),
        '1'..='9' => Some((0x1E + (ch as u32 - '1' as u32), 0)),
        '0' => Some((0x27, 0)),
        ' ' => Some((0x2C, 0)),
        '\n' => Some((0x28, 0)),
        '\t' => Some((0x2B, 0)),
        '-' => Some((0x2D, 0)),
        '_' => Some((0x2D, MOD_LSHIFT)),
        '=' => Some((0x2E, 0)),
        '+' => Some((0x2E, MOD_LSHIFT)),
        '.' => Some((0x37, 0)),
        ',' => Some((0x36, 0)),
        '/' => Some((0x38, 0)),
        '?' => Some((0x38, MOD_LSHIFT)),
        '\'' => Some((0x34, 0)),
        '"' => Some((0x34, MOD_LSHIFT)),
        ';' => Some((0x33, 0)),
        ':' => Some((0x33, MOD_LSHIFT)),
        '!' => Some((0x1E, MOD_LSHIFT)),
        _ => None,
    }
}
