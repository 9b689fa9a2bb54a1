//! One-shot hardware peripheral initialization and edge-interrupt plumbing.
//!
//! Configures the input GPIOs and the LEDC timer/channels for the RGB LED
//! using raw ESP-IDF sys calls, then owns the per-line interrupt mask for
//! the lifetime of the firmware. Called once from `main()` before the
//! executor starts.
//!
//! Input lines are active-low: a closed switch pulls the pin to ground, so
//! "active" means GPIO level 0. The edge ISR samples the level at fire
//! time and pushes a [`RawEdgeEvent`] to the lock-free queue; everything
//! slower than that happens in the input task.
//!
//! On the host build the pins are simulated through atomics
//! (`sim_set_line_level` / `sim_inject_edge`), which respect the same
//! interrupt mask the hardware does, so the whole input pipeline runs
//! unmodified in tests.

use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

use crate::app::ports::LedPort;
use crate::config::{InputLine, NodeConfig, MAX_INPUT_LINES};
use crate::events::{RawEdgeEvent, EDGE_QUEUE};
use crate::fade::Color;
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    LedcInitFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::LedcInitFailed(rc) => write!(f, "LEDC timer/channel config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

// ── Per-line interrupt bookkeeping ────────────────────────────

// Index = position of the line in `NodeConfig::lines`. A gpio of -1 marks
// an unconfigured slot. The enabled flags are the interrupt mask shared
// between the ISR path and the input task.
static LINE_GPIOS: [AtomicI32; MAX_INPUT_LINES] =
    [const { AtomicI32::new(-1) }; MAX_INPUT_LINES];
static LINE_ENABLED: [AtomicBool; MAX_INPUT_LINES] =
    [const { AtomicBool::new(false) }; MAX_INPUT_LINES];

/// Simulated pin levels, true = active (pulled low).
#[cfg(not(target_os = "espidf"))]
static SIM_ACTIVE: [AtomicBool; MAX_INPUT_LINES] =
    [const { AtomicBool::new(false) }; MAX_INPUT_LINES];

fn register_lines(lines: &[InputLine]) {
    for (i, line) in lines.iter().enumerate() {
        LINE_GPIOS[i].store(i32::from(line.gpio), Ordering::Relaxed);
        LINE_ENABLED[i].store(false, Ordering::Relaxed);
    }
}

// ── One-shot init ─────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn init_peripherals(cfg: &NodeConfig) -> Result<(), HwInitError> {
    register_lines(&cfg.lines);
    // SAFETY: Called once from main() before the executor starts;
    // single-threaded at this point.
    unsafe {
        init_gpio_inputs(&cfg.lines)?;
        init_ledc()?;
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals(cfg: &NodeConfig) -> Result<(), HwInitError> {
    register_lines(&cfg.lines);
    log::info!("hw_init(sim): {} input line(s) simulated", cfg.lines.len());
    Ok(())
}

// ── GPIO inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs(lines: &[InputLine]) -> Result<(), HwInitError> {
    for line in lines {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << line.gpio,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }

    info!(
        "hw_init: {} input line(s) configured (pull-up, active-low)",
        lines.len()
    );
    Ok(())
}

/// Current level of a configured input line, true = active (low).
#[cfg(target_os = "espidf")]
pub fn line_level_active(line: u8) -> bool {
    let gpio = LINE_GPIOS[line as usize].load(Ordering::Relaxed);
    if gpio < 0 {
        return false;
    }
    // SAFETY: gpio_get_level is a read-only register access on an
    // already-configured input pin; safe from any context.
    (unsafe { gpio_get_level(gpio) }) == 0
}

#[cfg(not(target_os = "espidf"))]
pub fn line_level_active(line: u8) -> bool {
    let idx = line as usize;
    idx < MAX_INPUT_LINES && SIM_ACTIVE[idx].load(Ordering::Acquire)
}

// ── LEDC PWM ─────────────────────────────────────────────────

pub const LEDC_CH_LED_R: u32 = 0;
pub const LEDC_CH_LED_G: u32 = 1;
pub const LEDC_CH_LED_B: u32 = 2;

#[cfg(target_os = "espidf")]
unsafe fn init_ledc() -> Result<(), HwInitError> {
    // Timer 0 drives all three colour channels.
    let timer = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_0,
        duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
        freq_hz: pins::LED_PWM_FREQ_HZ,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    let ret = unsafe { ledc_timer_config(&timer) };
    if ret != ESP_OK {
        return Err(HwInitError::LedcInitFailed(ret));
    }

    let led_gpios = [pins::LED_R_GPIO, pins::LED_G_GPIO, pins::LED_B_GPIO];
    for (i, &gpio) in led_gpios.iter().enumerate() {
        let ret = unsafe {
            ledc_channel_config(&ledc_channel_config_t {
                speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
                channel: ledc_channel_t_LEDC_CHANNEL_0 + i as u32,
                timer_sel: ledc_timer_t_LEDC_TIMER_0,
                gpio_num: gpio,
                duty: 0,
                hpoint: 0,
                ..Default::default()
            })
        };
        if ret != ESP_OK {
            return Err(HwInitError::LedcInitFailed(ret));
        }
    }

    info!("hw_init: LEDC configured (R=CH0, G=CH1, B=CH2)");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn ledc_set(channel: u32, duty: u8) {
    // SAFETY: LEDC channels were configured in init_ledc(); duty register
    // writes are race-free since only the fade task calls this.
    unsafe {
        ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel, u32::from(duty));
        ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_set(_channel: u32, _duty: u8) {}

/// LEDC-backed RGB output implementing [`LedPort`].
pub struct EspLed;

impl EspLed {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EspLed {
    fn default() -> Self {
        Self::new()
    }
}

impl LedPort for EspLed {
    fn set_rgb(&mut self, colour: Color) {
        ledc_set(LEDC_CH_LED_R, colour.r);
        ledc_set(LEDC_CH_LED_G, colour.g);
        ledc_set(LEDC_CH_LED_B, colour.b);
    }
}

// ── GPIO ISR service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn input_gpio_isr(arg: *mut core::ffi::c_void) {
    let line = arg as usize;
    if line >= MAX_INPUT_LINES {
        return;
    }
    let gpio = LINE_GPIOS[line].load(Ordering::Relaxed);
    // SAFETY: gpio_get_level and esp_timer_get_time are register reads;
    // both are safe in ISR context.
    let level_active = (unsafe { gpio_get_level(gpio) }) == 0;
    // Full queue means the input task is wedged; the drop is counted and
    // reported by the supervision task.
    EDGE_QUEUE.try_send(RawEdgeEvent {
        line: line as u8,
        level_active,
        timestamp_ms: crate::adapters::time::now_ms(),
    });
}

/// Install the shared GPIO ISR service and hook every configured input
/// line to the edge handler. Call after `init_peripherals()` and before
/// the executor starts.
#[cfg(target_os = "espidf")]
pub fn init_isr_service(cfg: &NodeConfig) -> Result<(), HwInitError> {
    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed (acceptable). The handler registered
    // below only reads registers and pushes to the lock-free edge queue.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        for (i, line) in cfg.lines.iter().enumerate() {
            let gpio = i32::from(line.gpio);
            // Press edge only: the line is active-low and release is
            // observed by polling, with the interrupt masked mid-cycle.
            gpio_set_intr_type(gpio, gpio_int_type_t_GPIO_INTR_NEGEDGE);
            gpio_isr_handler_add(gpio, Some(input_gpio_isr), i as *mut core::ffi::c_void);
        }

        info!("hw_init: ISR service installed ({} line(s))", cfg.lines.len());
    }

    for i in 0..cfg.lines.len() {
        enable_line_interrupt(i as u8);
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service(cfg: &NodeConfig) -> Result<(), HwInitError> {
    for i in 0..cfg.lines.len() {
        enable_line_interrupt(i as u8);
    }
    log::info!(
        "hw_init(sim): edge injection armed for {} line(s)",
        cfg.lines.len()
    );
    Ok(())
}

/// Arm the edge interrupt for a line. Idempotent: re-arming an already
/// armed line does nothing, so no duplicate edges can be synthesized.
pub fn enable_line_interrupt(line: u8) {
    let idx = line as usize;
    if idx >= MAX_INPUT_LINES {
        return;
    }
    if LINE_ENABLED[idx].swap(true, Ordering::AcqRel) {
        return; // already armed
    }
    #[cfg(target_os = "espidf")]
    {
        let gpio = LINE_GPIOS[idx].load(Ordering::Relaxed);
        if gpio >= 0 {
            // SAFETY: pin was configured during init; register write only.
            unsafe {
                gpio_intr_enable(gpio);
            }
        }
    }
}

/// Mask the edge interrupt for a line for the rest of its debounce cycle.
pub fn disable_line_interrupt(line: u8) {
    let idx = line as usize;
    if idx >= MAX_INPUT_LINES {
        return;
    }
    LINE_ENABLED[idx].store(false, Ordering::Release);
    #[cfg(target_os = "espidf")]
    {
        let gpio = LINE_GPIOS[idx].load(Ordering::Relaxed);
        if gpio >= 0 {
            // SAFETY: pin was configured during init; register write only.
            unsafe {
                gpio_intr_disable(gpio);
            }
        }
    }
}

// ── Reset ─────────────────────────────────────────────────────

/// Reboot the node. Fatal-error path for unrecoverable init failures.
pub fn restart() -> ! {
    #[cfg(target_os = "espidf")]
    {
        unsafe { esp_restart() };
        unreachable!("esp_restart returned");
    }
    #[cfg(not(target_os = "espidf"))]
    {
        log::error!("restart(sim): exiting process");
        std::process::exit(1);
    }
}

// ── Host-side pin simulation ──────────────────────────────────

/// Drive a simulated line to a level, true = active (pulled low).
/// Level changes alone never queue anything; an edge must be injected.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_line_level(line: u8, active: bool) {
    let idx = line as usize;
    if idx < MAX_INPUT_LINES {
        SIM_ACTIVE[idx].store(active, Ordering::Release);
    }
}

/// Fire the edge interrupt for a simulated line at its current level.
/// Honours the per-line interrupt mask exactly like the hardware does:
/// injecting on a masked line delivers nothing.
#[cfg(not(target_os = "espidf"))]
pub fn sim_inject_edge(line: u8) {
    let idx = line as usize;
    if idx >= MAX_INPUT_LINES || !LINE_ENABLED[idx].load(Ordering::Acquire) {
        return;
    }
    EDGE_QUEUE.try_send(RawEdgeEvent {
        line,
        level_active: SIM_ACTIVE[idx].load(Ordering::Acquire),
        timestamp_ms: crate::adapters::time::now_ms(),
    });
}

// ---------------------------------------------------------------------------
// Tests (host)
// ---------------------------------------------------------------------------
