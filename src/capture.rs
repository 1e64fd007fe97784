//! Bounded FIFO buffer holding events captured while a hold-tap is undecided.
//!
//! Stores copies, not references: the original event objects are bound to
//! their dispatch frame. Capacity is fixed at [`crate::MAX_CAPTURED_EVENTS`];
//! exceeding it is a hard [`EngineError::CapacityExceeded`], never a silent
//! drop, so this uses `arraydeque`'s default (`Saturating`) behavior rather
//! than `Wrapping` — a full push fails instead of evicting the oldest entry.

use arraydeque::ArrayDeque;

use crate::position::{KeycodeEvent, PositionEvent};
use crate::MAX_CAPTURED_EVENTS;

/// A captured copy of one of the two ingress event shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturedEvent {
    PositionChange(PositionEvent),
    KeycodeChange(KeycodeEvent),
}

type Deque = ArrayDeque<[CapturedEvent; MAX_CAPTURED_EVENTS]>;

#[derive(Debug, Default)]
pub struct CaptureBuffer {
    queue: Deque,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self {
            queue: Deque::new(),
        }
    }

    /// Enqueues `event`. Returns `Err(event)` if the buffer is full.
    pub fn push(&mut self, event: CapturedEvent) -> Result<(), CapturedEvent> {
        self.queue.push_back(event).map_err(|e| e.element)
    }

    /// Pops the oldest captured event, if any (FIFO drain order).
    pub fn pop(&mut self) -> Option<CapturedEvent> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if a captured press for `position` precedes everything currently
    /// queued (used to decide whether an unmatched release should bubble).
    pub fn has_captured_keydown(&self, position: crate::position::Position) -> bool {
        self.queue.iter().any(|ev| {
            matches!(ev, CapturedEvent::PositionChange(p) if p.position == position && p.pressed)
        })
    }
}
