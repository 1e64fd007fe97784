//! Hold-tap configuration, supplied per-key by the (out of scope) keymap.

use crate::binding::Binding;
use crate::position::Position;

/// The arbitration policy used at decision moments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Balanced,
    TapPreferred,
    HoldPreferred,
}

/// Immutable per-key hold-tap configuration.
///
/// Borrowed slices (`tap_bindings`, `prior_keycodes`, ...) are expected to
/// point at `'static` keymap data, the same way the keymap itself is treated
/// as read-only external input throughout this crate.
#[derive(Debug, Clone, Copy)]
pub struct HoldTapConfig<'a> {
    pub tapping_term_ms: i64,
    pub quick_tap_ms: i64,
    pub require_prior_idle_ms: i64,

    pub normal_flavor: Flavor,
    pub after_flavor: Flavor,

    pub hold_while_undecided: bool,
    pub hold_while_undecided_linger: bool,
    pub retro_tap: bool,
    pub hold_trigger_on_release: bool,

    /// If non-empty, hold is only permitted when the first other key
    /// pressed is one of these positions (the "chordal hold" rule).
    pub hold_trigger_key_positions: &'a [Position],

    pub tap_bindings: &'a [Binding],
    pub hold_bindings: &'a [Binding],

    /// If the last tapped keycode is one of these and recent (within
    /// `prior_timeout_ms`), `after_flavor` is selected instead of
    /// `normal_flavor` at keydown.
    pub prior_keycodes: &'a [u32],
    pub prior_timeout_ms: i64,
}

impl<'a> HoldTapConfig<'a> {
    /// A `Balanced` hold-tap with no contextual behavior: the common case.
    pub const fn plain(tapping_term_ms: i64, tap: &'a [Binding], hold: &'a [Binding]) -> Self {
        Self {
            tapping_term_ms,
            quick_tap_ms: 0,
            require_prior_idle_ms: 0,
            normal_flavor: Flavor::Balanced,
            after_flavor: Flavor::Balanced,
            hold_while_undecided: false,
            hold_while_undecided_linger: false,
            retro_tap: false,
            hold_trigger_on_release: false,
            hold_trigger_key_positions: &[],
            tap_bindings: tap,
            hold_bindings: hold,
            prior_keycodes: &[],
            prior_timeout_ms: 0,
        }
    }
}
