//! Contextual hold-tap decision engine.
//!
//! Given a stream of timestamped position-press/position-release events and
//! keycode-state-change events, plus per-key [`config::HoldTapConfig`] supplied
//! by an external (and here, out of scope) keymap, this crate decides whether
//! each dual-purpose key press resolves to its *tap* action or its *hold*
//! action, and replays any events it had to buffer while the decision was
//! pending. It also resolves the alternate-repeat ("magic") action derived
//! from the most recently emitted key.
//!
//! No matrix scanning, transport, persistence, rendering, or USB lives here:
//! those are the caller's problem. The caller owns an [`engine::Engine`],
//! feeds it events, and implements [`binding::ActionSink`] to receive
//! press/release invocations of concrete bindings.

pub mod binding;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod keycode;
pub mod last_key;
pub mod macro_text;
pub mod magic;
pub mod position;
pub mod state;
pub mod timer;

pub use binding::{ActionSink, Binding, BindingEvent, Invoked};
pub use config::{Flavor, HoldTapConfig};
pub use engine::Engine;
pub use error::EngineError;
pub use position::{KeycodeEvent, Position, PositionEvent, Propagation, Source, Timestamp};

/// Maximum number of simultaneously-active hold-taps.
pub const MAX_HELD: usize = 10;

/// Depth of the event capture buffer.
pub const MAX_CAPTURED_EVENTS: usize = 40;
