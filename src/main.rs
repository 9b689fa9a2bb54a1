//! Mesh endpoint firmware entry point.
//!
//! One binary serves four device roles (light, switch, temperature
//! sensor, thermostat); the role comes out of persisted config and picks
//! the endpoint, callbacks and tasks that get wired up.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                    │
//! │                                                              │
//! │  EspMeshStack    EspLed      LogEventSink    NvsAdapter      │
//! │  (MeshPort)      (LedPort)   (EventSink)     (Config+NVS)    │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ──────────────────      │
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │                  Node (pure logic)                   │    │
//! │  │  debounce FSM · dispatch · report policy · fade      │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! │                                                              │
//! │  Task runtime (edge-executor) · crash log · watchdog         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

// ── Module declarations ───────────────────────────────────────
mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
mod drivers;
mod error;
mod esp_link_shims;
pub mod events;
pub mod fade;
pub mod fsm;
mod pins;
mod sensors;
mod state;
pub mod tasks;
pub mod telemetry;

// ── Imports ───────────────────────────────────────────────────
use anyhow::Result;
use core::fmt::Write as _;
use log::{info, warn};

use adapters::device_id;
use adapters::log_sink::LogEventSink;
#[cfg(target_os = "espidf")]
use adapters::mesh::EspMeshStack;
#[cfg(not(target_os = "espidf"))]
use adapters::mesh::SimMesh;
use adapters::mesh::{self, MeshNotice};
use adapters::nvs::NvsAdapter;
use adapters::time::Esp32TimeAdapter;
use app::events::AppEvent;
use app::ports::{ConfigPort, EndpointRole, EventSink, MeshMode, MeshPort};
use config::{DeviceRole, NodeConfig};
use diagnostics::CrashLog;
use drivers::hw_init::{self, EspLed};
use fade::{COLOUR_OFF, COLOUR_ON};
use sensors::temperature::TemperatureSensor;
use state::LIGHT;
use tasks::{Node, Telemetry};

// ── Mesh callbacks ────────────────────────────────────────────
//
// These run on the stack's own task.  Each body is one atomic store or
// one bounded-queue push; the executor tasks pick the values up from
// there on their next tick.

fn light_changed(on: bool) {
    LIGHT.set_target(if on { COLOUR_ON } else { COLOUR_OFF });
}

fn identify_requested(seconds: u16) {
    LIGHT.request_identify(seconds);
}

fn sensor_config_received(min_c: f32, max_c: f32, tolerance_c: f32) {
    mesh::notify(MeshNotice::SensorConfig {
        min_c,
        max_c,
        tolerance_c,
    });
}

// ── Identity strings ──────────────────────────────────────────

const MANUFACTURER: &str = "Espressif";

fn base_model(role: DeviceRole) -> &'static str {
    match role {
        DeviceRole::Light => "ZBLightBulb",
        DeviceRole::Switch => "ZigbeeSwitch",
        DeviceRole::TemperatureSensor => "ZigbeeTempSensor",
        DeviceRole::Thermostat => "Thermostat",
    }
}

fn endpoint_role(cfg: &NodeConfig) -> EndpointRole {
    match cfg.role {
        DeviceRole::Light => EndpointRole::Light,
        DeviceRole::Switch => EndpointRole::Switch,
        DeviceRole::TemperatureSensor => EndpointRole::TemperatureSensor {
            min_c: cfg.sensor_min_c,
            max_c: cfg.sensor_max_c,
            tolerance_c: cfg.sensor_tolerance_c,
        },
        DeviceRole::Thermostat => EndpointRole::Thermostat,
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Platform bootstrap ─────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  meshnode v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let mac = device_id::read_mac();
    let dev_id = device_id::device_id(&mac);
    info!("device id: {}", dev_id);

    // ── 2. Persistent config ──────────────────────────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running defaults without persistence", e);
            NvsAdapter::default()
        }
    };
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("config load failed ({}), using defaults", e);
            NodeConfig::default()
        }
    };
    if let Ok(json) = serde_json::to_string(&config) {
        info!("config: {}", json);
    }

    // ── 3. Crash forensics + panic hook ───────────────────────
    let mut crash_log = CrashLog::new();
    crash_log.init(&nvs);
    let previous = crash_log.entries(&nvs);
    if !previous.is_empty() {
        warn!("{} crash record(s) in flash:", previous.len());
        for entry in &previous {
            warn!("  +{}s: {}", entry.uptime_secs, entry.reason);
        }
    }
    diagnostics::install_panic_handler();

    // ── 4. Peripherals ────────────────────────────────────────
    if let Err(e) = hw_init::init_peripherals(&config) {
        log::error!("peripheral init failed: {}", e);
        hw_init::restart();
    }
    if let Err(e) = hw_init::init_isr_service(&config) {
        log::error!("input interrupt init failed: {}", e);
        hw_init::restart();
    }

    // ── 5. Mesh stack ─────────────────────────────────────────
    //
    // Order matters: device info, callbacks and endpoints must all be in
    // place before begin(); after that the stack owns its configuration.
    #[cfg(target_os = "espidf")]
    let mut mesh_stack = EspMeshStack::new(config.open_network_s);
    #[cfg(not(target_os = "espidf"))]
    let mut mesh_stack = SimMesh::new();

    let mut model: heapless::String<32> = heapless::String::new();
    let _ = write!(model, "{} {}", base_model(config.role), dev_id);
    mesh_stack.set_device_info(MANUFACTURER, model.as_str());

    match config.role {
        DeviceRole::Light => {
            mesh_stack.on_light_change(light_changed);
            mesh_stack.on_identify(identify_requested);
        }
        DeviceRole::Thermostat => mesh_stack.on_sensor_config(sensor_config_received),
        DeviceRole::Switch | DeviceRole::TemperatureSensor => {}
    }

    if let Err(e) = mesh_stack.add_endpoint(config.endpoint_id, endpoint_role(&config)) {
        log::error!("endpoint registration failed: {}", e);
        hw_init::restart();
    }

    // Battery sensors sleep between reports; everything else routes.
    let mode = match config.role {
        DeviceRole::TemperatureSensor => MeshMode::EndDevice,
        _ => MeshMode::Router,
    };
    if let Err(e) = mesh_stack.begin(mode) {
        log::error!("mesh stack failed to start: {}", e);
        hw_init::restart();
    }

    info!("mesh: joining network");
    let mut waited_ms: u32 = 0;
    while !mesh_stack.connected() {
        std::thread::sleep(core::time::Duration::from_millis(100));
        waited_ms = waited_ms.wrapping_add(100);
        if waited_ms % 5_000 == 0 {
            info!("mesh: still joining ({}s)", waited_ms / 1000);
        }
    }
    info!("mesh: joined as {:?}", mode);

    // ── 6. Role wiring ────────────────────────────────────────
    let clock = Esp32TimeAdapter::new();
    let telemetry = match config.role {
        DeviceRole::TemperatureSensor => match TemperatureSensor::new() {
            Ok(sensor) => match Telemetry::new(&config, sensor, clock.uptime_ms()) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!("reporting disabled: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("temperature sensor init failed ({}), reporting disabled", e);
                None
            }
        },
        _ => None,
    };

    let mut sink = LogEventSink::new();
    sink.emit(&AppEvent::Started(config.role));

    let node = Node::new(&config, mesh_stack, EspLed::new(), sink, telemetry);

    // ── 7. Task runtime ───────────────────────────────────────
    tasks::run(node);
    Ok(())
}
