//! GPIO / peripheral pin assignments for the mesh-node reference board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.
//!
//! The reference board is an ESP32-C6 module: usable GPIOs are 0–30, with
//! GPIO12/13 taken by USB and GPIO16/17 by UART0.

// ---------------------------------------------------------------------------
// User button (active-low with internal pull-up)
// ---------------------------------------------------------------------------

/// Momentary push-button; the boot button on the reference board.
/// Pressing pulls the pin to ground.
pub const BUTTON_GPIO: u8 = 9;

// ---------------------------------------------------------------------------
// Status / light LED (discrete RGB, common anode, LEDC-dimmed)
// ---------------------------------------------------------------------------

pub const LED_R_GPIO: i32 = 3;
pub const LED_G_GPIO: i32 = 4;
pub const LED_B_GPIO: i32 = 5;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits).  8-bit gives 0 – 255 duty levels, matching
/// the colour component range one-to-one.
pub const PWM_RESOLUTION_BITS: u32 = 8;
/// LEDC frequency for the RGB LED (1 kHz — flicker-free, driver-compatible).
pub const LED_PWM_FREQ_HZ: u32 = 1_000;
