//! Node configuration parameters
//!
//! All tunable parameters for a mesh endpoint.  Values persist in NVS
//! and load at boot with fall-back to role defaults; validation happens
//! in the config adapter before anything is saved or used.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::app::dispatch::InputFunction;

/// Most input lines a single node can carry.
pub const MAX_INPUT_LINES: usize = 8;

/// Which logical device this node presents on the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceRole {
    Light,
    Switch,
    TemperatureSensor,
    Thermostat,
}

impl DeviceRole {
    /// Endpoint numbering carried over from the deployed fleet; changing
    /// these re-pairs every bound device.
    pub const fn default_endpoint(self) -> u8 {
        match self {
            Self::Light => 10,
            Self::Switch => 5,
            Self::Thermostat => 6,
            Self::TemperatureSensor => 11,
        }
    }
}

/// One physical input line and its configured function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputLine {
    /// GPIO number (active-low with internal pull-up).
    pub gpio: u8,
    pub function: InputFunction,
}

/// Core node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- Identity ---
    /// Logical role this node registers on the mesh.
    pub role: DeviceRole,
    /// Mesh endpoint id (1–240).
    pub endpoint_id: u8,

    // --- Input lines ---
    /// Physical buttons and their logical functions.
    pub lines: Vec<InputLine, MAX_INPUT_LINES>,

    // --- Telemetry reporting ---
    /// Suppression floor between reports (seconds, 0 = disabled).
    pub report_min_interval_s: u16,
    /// Heartbeat ceiling between reports (seconds, 0 = disabled).
    pub report_max_interval_s: u16,
    /// Report on temperature moves of at least this much (°C).
    pub report_delta_c: f32,
    /// Temperature sampling period (milliseconds).
    pub sample_period_ms: u32,

    // --- Sensor envelope (advertised at endpoint registration) ---
    /// Minimum measurable temperature (°C).
    pub sensor_min_c: f32,
    /// Maximum measurable temperature (°C).
    pub sensor_max_c: f32,
    /// Advertised measurement tolerance (°C).
    pub sensor_tolerance_c: f32,

    // --- Mesh ---
    /// Keep the network open for joiners this long after boot (seconds).
    pub open_network_s: u16,
}

impl NodeConfig {
    /// Role-appropriate defaults: correct endpoint number and the boot
    /// button wired the way that role's fleet units are.
    pub fn for_role(role: DeviceRole) -> Self {
        let function = match role {
            DeviceRole::Switch => InputFunction::Toggle,
            _ => InputFunction::None,
        };
        let mut lines = Vec::new();
        // The boot button; always present on the reference hardware.
        let _ = lines.push(InputLine {
            gpio: crate::pins::BUTTON_GPIO,
            function,
        });
        Self {
            role,
            endpoint_id: role.default_endpoint(),
            lines,
            ..Self::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut lines = Vec::new();
        let _ = lines.push(InputLine {
            gpio: crate::pins::BUTTON_GPIO,
            function: InputFunction::None,
        });
        Self {
            // Identity
            role: DeviceRole::Light,
            endpoint_id: DeviceRole::Light.default_endpoint(),

            // Input lines
            lines,

            // Telemetry reporting
            report_min_interval_s: 1,
            report_max_interval_s: 0, // delta-only
            report_delta_c: 1.0,
            sample_period_ms: 1000, // 1 Hz

            // Sensor envelope
            sensor_min_c: 10.0,
            sensor_max_c: 50.0,
            sensor_tolerance_c: 1.0,

            // Mesh
            open_network_s: 180, // 3 min joining window after boot
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = NodeConfig::default();
        assert!(c.endpoint_id >= 1);
        assert!(!c.lines.is_empty());
        assert!(c.sample_period_ms > 0);
        assert!(c.sensor_min_c < c.sensor_max_c);
        assert!(c.sensor_tolerance_c > 0.0);
        // Both-zero intervals would disable reporting entirely.
        assert!(c.report_min_interval_s > 0 || c.report_max_interval_s > 0);
    }

    #[test]
    fn role_defaults_keep_fleet_endpoint_numbers() {
        assert_eq!(NodeConfig::for_role(DeviceRole::Light).endpoint_id, 10);
        assert_eq!(NodeConfig::for_role(DeviceRole::Switch).endpoint_id, 5);
        assert_eq!(NodeConfig::for_role(DeviceRole::Thermostat).endpoint_id, 6);
        assert_eq!(
            NodeConfig::for_role(DeviceRole::TemperatureSensor).endpoint_id,
            11
        );
    }

    #[test]
    fn switch_role_gets_a_toggle_line() {
        let c = NodeConfig::for_role(DeviceRole::Switch);
        assert_eq!(c.lines[0].function, InputFunction::Toggle);
        // Other roles keep the button for factory reset only.
        let l = NodeConfig::for_role(DeviceRole::Light);
        assert_eq!(l.lines[0].function, InputFunction::None);
    }

    #[test]
    fn serde_roundtrip() {
        let c = NodeConfig::for_role(DeviceRole::Thermostat);
        let json = serde_json::to_string(&c).unwrap();
        let c2: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.role, c2.role);
        assert_eq!(c.endpoint_id, c2.endpoint_id);
        assert_eq!(c.lines.len(), c2.lines.len());
        assert!((c.report_delta_c - c2.report_delta_c).abs() < 0.001);
    }

    #[test]
    fn postcard_roundtrip() {
        let c = NodeConfig::for_role(DeviceRole::Switch);
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: NodeConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c.role, c2.role);
        assert_eq!(c.lines[0].gpio, c2.lines[0].gpio);
        assert_eq!(c.lines[0].function, c2.lines[0].function);
        assert_eq!(c.open_network_s, c2.open_network_s);
    }

    #[test]
    fn line_table_respects_capacity() {
        let mut c = NodeConfig::default();
        c.lines.clear();
        for gpio in 0..MAX_INPUT_LINES as u8 {
            assert!(c
                .lines
                .push(InputLine {
                    gpio,
                    function: InputFunction::Toggle,
                })
                .is_ok());
        }
        assert!(c
            .lines
            .push(InputLine {
                gpio: 99,
                function: InputFunction::None,
            })
            .is_err());
    }
}
