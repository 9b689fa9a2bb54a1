//! Monotonic time adapter.
//!
//! - **`target_os = "espidf"`** — wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`** — derives everything from a single
//!   process-wide `std::time::Instant` epoch, so simulated tasks and
//!   injected edge timestamps share one timeline.

#[cfg(not(target_os = "espidf"))]
use std::sync::OnceLock;

#[cfg(not(target_os = "espidf"))]
static EPOCH: OnceLock<std::time::Instant> = OnceLock::new();

#[cfg(not(target_os = "espidf"))]
fn since_epoch() -> std::time::Duration {
    EPOCH.get_or_init(std::time::Instant::now).elapsed()
}

/// Milliseconds since boot, truncated to 32 bits (wraps after ~49.7 days).
///
/// This is the timestamp the GPIO edge path uses; consumers compare with
/// `wrapping_sub`, so the wrap is harmless. Safe to call from interrupt
/// context on the ESP32.
pub fn now_ms() -> u32 {
    #[cfg(target_os = "espidf")]
    {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() } / 1000) as u32
    }

    #[cfg(not(target_os = "espidf"))]
    {
        since_epoch().as_millis() as u32
    }
}

/// Monotonic clock for task-side bookkeeping (report intervals, uptime).
pub struct Esp32TimeAdapter;

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        #[cfg(not(target_os = "espidf"))]
        let _ = EPOCH.get_or_init(std::time::Instant::now);
        Self
    }

    /// Seconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_secs(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000_000
    }

    /// Seconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_secs(&self) -> u64 {
        since_epoch().as_secs()
    }

    /// Milliseconds since boot (monotonic, 64-bit so it never wraps in
    /// practice; report-interval arithmetic relies on that).
    #[cfg(target_os = "espidf")]
    pub fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_ms(&self) -> u64 {
        since_epoch().as_millis() as u64
    }
}
