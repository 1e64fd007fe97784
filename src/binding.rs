//! The action sink: the boundary between this crate and the firmware's HID
//! sender / modifier tracker. The core never constructs a `Binding`'s
//! meaning; it only presses and releases whatever it's given.

use crate::position::{Position, Source, Timestamp};

/// A reference to an external behavior plus up to two integer parameters
/// (e.g. keycode, layer index). Opaque to the core except that invoking it
/// presses or releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub behavior: u16,
    pub param1: u32,
    pub param2: u32,
}

impl Binding {
    pub const fn new(behavior: u16, param1: u32, param2: u32) -> Self {
        Self {
            behavior,
            param1,
            param2,
        }
    }
}

/// The `(position, timestamp, source)` triple carried by every invocation of
/// a hold-tap's bindings; always the hold-tap's own keydown identity, never
/// the current wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingEvent {
    pub position: Position,
    pub timestamp: Timestamp,
    pub source: Source,
}

/// Whether an [`ActionSink::invoke`] call should abort the rest of its
/// binding chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invoked {
    Ok,
    Abort,
}

/// Accepts press/release of a resolved binding and emits HID (or whatever
/// the caller's firmware does with it). Implemented by the caller; this
/// crate never emits HID reports itself.
pub trait ActionSink {
    fn invoke(&mut self, binding: &Binding, event: BindingEvent, pressed: bool) -> Invoked;
}

/// Invokes every binding in `bindings` in array order; the first
/// [`Invoked::Abort`] aborts the remaining invocations in the chain.
pub(crate) fn invoke_binding_set(
    sink: &mut impl ActionSink,
    bindings: &[Binding],
    event: BindingEvent,
    pressed: bool,
) -> Invoked {
    for binding in bindings {
        if let Invoked::Abort = sink.invoke(binding, event, pressed) {
            return Invoked::Abort;
        }
    }
    Invoked::Ok
}
