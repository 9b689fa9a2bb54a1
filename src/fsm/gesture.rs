//! Hold detection layered on the debounce machine.
//!
//! A [`GestureCycle`] owns one line's [`Debouncer`](super::Debouncer) plus
//! the hold bookkeeping for the factory-reset gesture.  The hold check
//! rides the same polling tick as the state machine step, not a separate
//! timer task, so press, release and long-hold are totally ordered per
//! line.
//!
//! | Gesture                   | Event emitted          |
//! |---------------------------|------------------------|
//! | Press edge                | `GestureEvent::Press`  |
//! | Release edge              | `GestureEvent::Release`|
//! | Held ≥ 3000 ms continuous | `GestureEvent::LongHold` (once per cycle) |

use super::{DebounceState, Debouncer, EdgeKind};

/// Continuous hold duration that arms the factory-reset action.
pub const FACTORY_RESET_HOLD_MS: u32 = 3000;

/// Logical gesture events handed to the action dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEvent {
    Press,
    Release,
    /// Fired exactly once per press cycle when the hold threshold is
    /// crossed while the line is still active.
    LongHold,
}

/// One input line's full gesture state: debouncer plus hold timer.
#[derive(Debug, Clone, Copy)]
pub struct GestureCycle {
    debounce: Debouncer,
    pressed_at_ms: u32,
    long_hold_fired: bool,
}

impl GestureCycle {
    pub const fn new() -> Self {
        Self {
            debounce: Debouncer::new(),
            pressed_at_ms: 0,
            long_hold_fired: false,
        }
    }

    /// Feed one sampled level at the given wrapping millisecond clock.
    ///
    /// At most one event is returned per poll; the long-hold check only
    /// runs on ticks where no edge fired, which cannot delay it by more
    /// than one polling interval.
    pub fn poll(&mut self, level_active: bool, now_ms: u32) -> Option<GestureEvent> {
        match self.debounce.sample(level_active) {
            Some(EdgeKind::Press) => {
                self.pressed_at_ms = now_ms;
                self.long_hold_fired = false;
                return Some(GestureEvent::Press);
            }
            Some(EdgeKind::Release) => return Some(GestureEvent::Release),
            None => {}
        }

        if self.debounce.state() == DebounceState::Pressed
            && !self.long_hold_fired
            && now_ms.wrapping_sub(self.pressed_at_ms) >= FACTORY_RESET_HOLD_MS
        {
            self.long_hold_fired = true;
            return Some(GestureEvent::LongHold);
        }

        None
    }

    /// True once the press/release cycle has fully completed.
    /// The input task re-enables the line's interrupt only here.
    pub fn is_idle(&self) -> bool {
        self.debounce.is_idle()
    }
}

impl Default for GestureCycle {
    fn default() -> Self {
        Self::new()
    }
}
