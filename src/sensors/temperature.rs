//! On-die temperature sensor.
//!
//! The ESP32-C6 integrates a temperature sensor good for roughly ±1 °C
//! inside the -10 – 80 °C measurement range, which is plenty for ambient
//! telemetry. No external parts, no ADC calibration.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: the driver handle is installed and enabled once at
//! construction and polled via `temperature_sensor_get_celsius`.
//! On host/test: reads from a static atomic for injection.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Measurement range the driver is configured for. Narrower ranges give
/// better accuracy; this one covers any room the fleet gets deployed in.
#[cfg(target_os = "espidf")]
const RANGE_MIN_C: i32 = -10;
#[cfg(target_os = "espidf")]
const RANGE_MAX_C: i32 = 80;

/// Simulated reading, stored as `f32` bits. Defaults to 25.0 °C.
#[cfg(not(target_os = "espidf"))]
static SIM_CELSIUS: AtomicU32 = AtomicU32::new(0x41C8_0000);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_celsius(celsius: f32) {
    SIM_CELSIUS.store(celsius.to_bits(), Ordering::Relaxed);
}

/// Errors installing the on-die sensor driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorInitError(pub i32);

impl core::fmt::Display for SensorInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "temperature sensor init failed (rc={})", self.0)
    }
}

pub struct TemperatureSensor {
    #[cfg(target_os = "espidf")]
    handle: temperature_sensor_handle_t,
    last_c: f32,
}

impl TemperatureSensor {
    /// Install and enable the sensor driver.
    #[cfg(target_os = "espidf")]
    pub fn new() -> Result<Self, SensorInitError> {
        let config = temperature_sensor_config_t {
            range_min: RANGE_MIN_C,
            range_max: RANGE_MAX_C,
            clk_src: soc_periph_temperature_sensor_clk_src_t_TEMPERATURE_SENSOR_CLK_SRC_DEFAULT,
            ..Default::default()
        };
        let mut handle: temperature_sensor_handle_t = core::ptr::null_mut();
        // SAFETY: install/enable are one-shot driver calls made before the
        // executor starts; the handle is owned by this struct afterwards.
        unsafe {
            let ret = temperature_sensor_install(&config, &mut handle);
            if ret != ESP_OK {
                return Err(SensorInitError(ret));
            }
            let ret = temperature_sensor_enable(handle);
            if ret != ESP_OK {
                return Err(SensorInitError(ret));
            }
        }
        Ok(Self {
            handle,
            last_c: 25.0,
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Result<Self, SensorInitError> {
        Ok(Self { last_c: 25.0 })
    }

    /// Current die temperature in °C.
    ///
    /// A failed read is logged and the previous good value returned; one
    /// flaky conversion must not derail the telemetry loop.
    pub fn read(&mut self) -> f32 {
        #[cfg(target_os = "espidf")]
        {
            let mut celsius: f32 = 0.0;
            // SAFETY: handle was installed and enabled in new().
            let ret = unsafe { temperature_sensor_get_celsius(self.handle, &mut celsius) };
            if ret == ESP_OK {
                self.last_c = celsius;
            } else {
                log::warn!("temperature read failed (rc={}), keeping {}", ret, self.last_c);
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.last_c = f32::from_bits(SIM_CELSIUS.load(Ordering::Relaxed));
        }

        self.last_c
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;
    use crate::events::SIM_TEST_LOCK;

    #[test]
    fn sim_injection_round_trips() {
        let _guard = SIM_TEST_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut sensor = TemperatureSensor::new().unwrap();
        sim_set_celsius(21.5);
        assert!((sensor.read() - 21.5).abs() < f32::EPSILON);
        sim_set_celsius(-3.25);
        assert!((sensor.read() - -3.25).abs() < f32::EPSILON);
        sim_set_celsius(25.0);
    }
}
