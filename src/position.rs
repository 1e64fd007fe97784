//! Position and timestamp primitives, and the two ingress event shapes.

/// A physical key location, globally unique across split halves.
pub type Position = u32;

/// Sentinel meaning "this slot holds no active hold-tap". Kept at 9999
/// rather than `Position::MAX` so logs read the same way across platforms.
pub const POSITION_NONE: Position = 9999;

/// Monotonic milliseconds since boot. Signed so that sentinel values (e.g.
/// "no prior tap") can be expressed as a large negative number without
/// wrapping when a duration is added to them.
pub type Timestamp = i64;

/// Which split half (or other physical source) raised an event.
pub type Source = u8;

/// A position-state-changed event: a physical key went down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionEvent {
    pub position: Position,
    pub pressed: bool,
    pub timestamp: Timestamp,
    pub source: Source,
}

impl PositionEvent {
    pub fn is_press(&self) -> bool {
        self.pressed
    }

    pub fn is_release(&self) -> bool {
        !self.pressed
    }
}

/// A keycode-state-changed event: a HID usage went down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeycodeEvent {
    pub usage_page: u16,
    pub keycode: u32,
    pub pressed: bool,
    pub timestamp: Timestamp,
    pub implicit_modifiers: u8,
    pub explicit_modifiers: u8,
}

/// Listener return convention: whether the core took ownership of the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Let the event continue downstream unmodified.
    Bubble,
    /// The core captured the event; nothing downstream should see it.
    Captured,
}

impl Propagation {
    pub fn is_captured(self) -> bool {
        matches!(self, Propagation::Captured)
    }
}
