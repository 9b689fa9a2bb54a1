//! Debounce / edge-detection state machine.
//!
//! One instance runs per input line, driven by level samples on a fixed
//! ~10 ms polling tick:
//!
//! ```text
//!            active                      (any)
//!   ┌──────┐ sample  ┌───────────────┐  sample ┌─────────┐
//!   │ Idle │────────▶│ PressDetected │────────▶│ Pressed │◀─┐ active
//!   └──────┘  Press! └───────────────┘         └─────────┘──┘ sample
//!      ▲                                            │ inactive sample
//!      │              ┌─────────────────┐           │ Release!
//!      └──────────────│ ReleaseDetected │◀──────────┘
//!        (any) sample └─────────────────┘
//! ```
//!
//! `PressDetected` is a single-sample acknowledgment state: it guards
//! against re-firing a press on the sample that detected it.  Contact
//! bounce shorter than the polling tick is invisible to the machine, so
//! each physical closure yields exactly one press and one release.
//!
//! The transition function is pure — `(state, sample) -> (state, edge)` —
//! so it is testable with no hardware or clock.  Timing concerns (hold
//! detection, interrupt gating) layer on top in [`gesture`].

pub mod gesture;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Per-line debounce states.  Transient: a full press/release cycle always
/// returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DebounceState {
    Idle = 0,
    PressDetected = 1,
    Pressed = 2,
    ReleaseDetected = 3,
}

/// Logical edge emitted by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Press,
    Release,
}

// ---------------------------------------------------------------------------
// Pure transition function
// ---------------------------------------------------------------------------

/// Advance the machine by one sampled level.
///
/// Returns the next state and the logical edge, if any, fired by this
/// sample.  `level_active` is true while the button is closed.
pub fn step(state: DebounceState, level_active: bool) -> (DebounceState, Option<EdgeKind>) {
    match (state, level_active) {
        (DebounceState::Idle, true) => (DebounceState::PressDetected, Some(EdgeKind::Press)),
        (DebounceState::Idle, false) => (DebounceState::Idle, None),
        // Acknowledgment hop: advances regardless of the sample so the
        // press cannot re-fire.
        (DebounceState::PressDetected, _) => (DebounceState::Pressed, None),
        (DebounceState::Pressed, true) => (DebounceState::Pressed, None),
        (DebounceState::Pressed, false) => {
            (DebounceState::ReleaseDetected, Some(EdgeKind::Release))
        }
        (DebounceState::ReleaseDetected, _) => (DebounceState::Idle, None),
    }
}

// ---------------------------------------------------------------------------
// Owned per-line wrapper
// ---------------------------------------------------------------------------

/// Owned debounce state for one input line.
///
/// Thin wrapper over [`step`] so tasks hold state as a value instead of a
/// global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    state: DebounceState,
}

impl Debouncer {
    pub const fn new() -> Self {
        Self {
            state: DebounceState::Idle,
        }
    }

    /// Feed one sampled level; returns the edge fired, if any.
    pub fn sample(&mut self, level_active: bool) -> Option<EdgeKind> {
        let (next, edge) = step(self.state, level_active);
        self.state = next;
        edge
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// True once the full press/release cycle has completed.
    /// The input task re-enables the line interrupt only here.
    pub fn is_idle(&self) -> bool {
        self.state == DebounceState::Idle
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}
