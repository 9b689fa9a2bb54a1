//! Shared mutable state cells.
//!
//! Mesh callbacks run in the stack's own task; the light, identify and
//! link tasks run on the executor.  Everything that crosses that boundary
//! lives here as an atomic cell with single-logical-writer discipline:
//!
//! - `target` colour — written by the light-change callback, the identify
//!   task (while a blink is active) and the restore step; read by the
//!   fade task.
//! - identify request — written by the identify callback, consumed
//!   (swap-out) by the identify task.
//!
//! Sensor-config updates cross the same boundary through the bounded
//! notice channel in `adapters::mesh` instead; they carry three floats at
//! once and a queue keeps the triple intact without bit-packing games.
//!
//! Cells are plain types so tests build their own; the static at the
//! bottom exists because registered callbacks are captureless `fn`
//! pointers and need a fixed address to reach.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::fade::{COLOUR_OFF, Color};

/// Sentinel for "no identify request pending".
const IDENTIFY_NONE: u32 = u32::MAX;

/// Target colour plus pending identify duration for one light endpoint.
pub struct LightCell {
    /// Packed `0x00RRGGBB`.
    target: AtomicU32,
    /// Pending identify duration in seconds, or [`IDENTIFY_NONE`].
    identify_request: AtomicU32,
}

impl LightCell {
    pub const fn new() -> Self {
        Self {
            target: AtomicU32::new(COLOUR_OFF.packed()),
            identify_request: AtomicU32::new(IDENTIFY_NONE),
        }
    }

    pub fn target(&self) -> Color {
        Color::from_packed(self.target.load(Ordering::Relaxed))
    }

    pub fn set_target(&self, colour: Color) {
        self.target.store(colour.packed(), Ordering::Relaxed);
    }

    /// Called from the mesh identify callback.  A zero duration is a real
    /// request (cancel), distinct from "nothing pending".
    pub fn request_identify(&self, seconds: u16) {
        self.identify_request
            .store(u32::from(seconds), Ordering::Relaxed);
    }

    /// Consume the pending identify request, if any.  At most one task
    /// polls this.
    pub fn take_identify_request(&self) -> Option<u16> {
        let raw = self.identify_request.swap(IDENTIFY_NONE, Ordering::Relaxed);
        (raw != IDENTIFY_NONE).then_some(raw as u16)
    }
}

impl Default for LightCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Light endpoint state, shared between mesh callbacks and the light tasks.
pub static LIGHT: LightCell = LightCell::new();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fade::{COLOUR_IDENTIFY, COLOUR_ON};

    #[test]
    fn target_roundtrips_through_cell() {
        let cell = LightCell::new();
        assert_eq!(cell.target(), COLOUR_OFF);
        cell.set_target(COLOUR_ON);
        assert_eq!(cell.target(), COLOUR_ON);
        cell.set_target(COLOUR_IDENTIFY);
        assert_eq!(cell.target(), COLOUR_IDENTIFY);
    }

    #[test]
    fn identify_request_consumed_once() {
        let cell = LightCell::new();
        assert_eq!(cell.take_identify_request(), None);
        cell.request_identify(30);
        assert_eq!(cell.take_identify_request(), Some(30));
        assert_eq!(cell.take_identify_request(), None);
    }

    #[test]
    fn zero_identify_request_is_still_a_request() {
        let cell = LightCell::new();
        cell.request_identify(0);
        assert_eq!(cell.take_identify_request(), Some(0));
        assert_eq!(cell.take_identify_request(), None);
    }

    #[test]
    fn newest_identify_request_wins() {
        let cell = LightCell::new();
        cell.request_identify(10);
        cell.request_identify(3);
        assert_eq!(cell.take_identify_request(), Some(3));
    }
}
