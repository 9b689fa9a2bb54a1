//! Colour convergence and identify blink engines.
//!
//! The light task calls [`FadeEngine::tick`] on a fixed step interval; each
//! tick moves the rendered colour one count per component toward the shared
//! target, then idles on a longer interval once converged.  Identify blinks
//! are layered on top by [`IdentifyEngine`], which overrides the shared
//! target with an alternating red/off pattern and restores the saved target
//! when the duration runs out — so the blink itself still renders through
//! the fade, giving the same soft ramp the light shows for normal changes.
//!
//! | Constant            | Value  | Meaning                             |
//! |---------------------|--------|-------------------------------------|
//! | `FADE_STEP_MS`      | ~2 ms  | per-step delay while converging     |
//! | `FADE_IDLE_MS`      | 100 ms | re-check interval once converged    |
//! | `IDENTIFY_PHASE_MS` | 500 ms | half of one on/off identify cycle   |

/// Full-range fade duration: 0→255 in roughly half a second.
pub const FADE_TRANSITION_MS: u32 = 500;

/// Per-step delay while a fade is in progress (255 steps per full range).
pub const FADE_STEP_MS: u64 = FADE_TRANSITION_MS.div_ceil(255) as u64;

/// Sleep between target re-checks once current == target.
pub const FADE_IDLE_MS: u64 = 100;

/// Identify half-cycle: 500 ms on, 500 ms off.  One full cycle per second,
/// matching the duration counter's unit.
pub const IDENTIFY_PHASE_MS: u64 = 500;

// ---------------------------------------------------------------------------
// Colour
// ---------------------------------------------------------------------------

/// Colour as {r, g, b}, each 0–255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Pack as `0x00RRGGBB` for storage in an atomic cell.
    pub const fn packed(self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    pub const fn from_packed(raw: u32) -> Self {
        Self {
            r: (raw >> 16) as u8,
            g: (raw >> 8) as u8,
            b: raw as u8,
        }
    }

    /// One convergence step: each component moves one count toward
    /// `target`, independently.
    pub fn step_toward(self, target: Self) -> Self {
        fn step(current: u8, target: u8) -> u8 {
            match current.cmp(&target) {
                core::cmp::Ordering::Less => current + 1,
                core::cmp::Ordering::Greater => current - 1,
                core::cmp::Ordering::Equal => current,
            }
        }
        Self {
            r: step(self.r, target.r),
            g: step(self.g, target.g),
            b: step(self.b, target.b),
        }
    }
}

// ── Well-known colour constants ───────────────────────────────

/// Light fully on (mesh "on" state fades to white).
pub const COLOUR_ON: Color = Color::new(255, 255, 255);
/// Light off.
pub const COLOUR_OFF: Color = Color::new(0, 0, 0);
/// Identify blink colour.
pub const COLOUR_IDENTIFY: Color = Color::new(255, 0, 0);

// ---------------------------------------------------------------------------
// Fade engine
// ---------------------------------------------------------------------------

/// Owns the rendered colour and steps it toward a target.
/// Stack-allocated, no heap.
#[derive(Debug)]
pub struct FadeEngine {
    current: Color,
}

impl FadeEngine {
    pub fn new(initial: Color) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> Color {
        self.current
    }

    /// One convergence tick toward `target`.
    ///
    /// Returns the new colour to render, or `None` when already converged
    /// — the caller writes nothing and sleeps the longer idle interval.
    pub fn tick(&mut self, target: Color) -> Option<Color> {
        if self.current == target {
            return None;
        }
        self.current = self.current.step_toward(target);
        Some(self.current)
    }
}

// ---------------------------------------------------------------------------
// Identify engine
// ---------------------------------------------------------------------------

/// What the identify task should do with the shared target this phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifyOutput {
    /// No identify in progress; target untouched.
    Idle,
    /// Override the shared target with this colour.
    Override(Color),
    /// Sequence complete: put the saved target back.
    Restore(Color),
}

/// Phase machine for the identify blink.
///
/// Ticked every [`IDENTIFY_PHASE_MS`].  While a duration is pending it is
/// the sole writer of the shared target: on-half writes the identify
/// colour, off-half writes black and completes one cycle (one second, one
/// decrement).  When the counter hits zero the next tick restores the
/// target saved at start.
#[derive(Debug)]
pub struct IdentifyEngine {
    saved_target: Color,
    remaining_s: u16,
    active: bool,
    on_half: bool,
}

impl IdentifyEngine {
    pub fn new() -> Self {
        Self {
            saved_target: COLOUR_OFF,
            remaining_s: 0,
            active: false,
            on_half: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Begin (or adjust) an identify sequence.
    ///
    /// Starting fresh saves `current_target` for restoration.  While a
    /// sequence is already running only the remaining duration changes —
    /// the saved target must not be clobbered with an override colour.
    /// `seconds == 0` on an active sequence cancels it at the next tick.
    pub fn start(&mut self, seconds: u16, current_target: Color) {
        if self.active {
            self.remaining_s = seconds;
            return;
        }
        if seconds == 0 {
            return;
        }
        self.saved_target = current_target;
        self.remaining_s = seconds;
        self.active = true;
        self.on_half = true;
    }

    /// Advance one half-cycle.
    pub fn tick(&mut self) -> IdentifyOutput {
        if !self.active {
            return IdentifyOutput::Idle;
        }
        if self.remaining_s == 0 {
            self.active = false;
            self.on_half = true;
            return IdentifyOutput::Restore(self.saved_target);
        }
        if self.on_half {
            self.on_half = false;
            IdentifyOutput::Override(COLOUR_IDENTIFY)
        } else {
            self.on_half = true;
            self.remaining_s -= 1;
            IdentifyOutput::Override(COLOUR_OFF)
        }
    }
}

impl Default for IdentifyEngine {
    fn default() -> Self {
        Self::new()
    }
}
