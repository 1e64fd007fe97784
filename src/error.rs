//! Error kinds the engine can raise.
//!
//! None of these are retried, and none are surfaced through the HID path:
//! every fallible entry point logs at `error` level and falls back to a
//! stuck-but-consistent state — a binding dropped is safer than one emitted
//! with wrong timing.

use crate::position::Position;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// Too many simultaneous hold-taps, or the capture buffer is full.
    #[error("contextual hold-tap capacity exceeded: {what} (position {position})")]
    CapacityExceeded {
        what: CapacityKind,
        position: Position,
    },

    /// A second undecided hold-tap was requested while one already exists,
    /// or an active hold-tap record was missing when its release arrived.
    #[error("contextual hold-tap invariant violated: {what} (position {position})")]
    InvariantViolation {
        what: InvariantKind,
        position: Position,
    },

    /// An action-sink invocation aborted the rest of its binding chain.
    #[error("contextual hold-tap binding failed at position {position}")]
    BindingFailure { position: Position },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    ActiveHoldTaps,
    CaptureBuffer,
}

impl core::fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CapacityKind::ActiveHoldTaps => write!(f, "active hold-tap slots"),
            CapacityKind::CaptureBuffer => write!(f, "captured event slots"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantKind {
    SecondUndecidedHoldTap,
    MissingActiveHoldTapOnRelease,
}

impl core::fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InvariantKind::SecondUndecidedHoldTap => {
                write!(f, "a second undecided hold-tap was requested")
            }
            InvariantKind::MissingActiveHoldTapOnRelease => {
                write!(f, "active hold-tap cleaned up too early")
            }
        }
    }
}
