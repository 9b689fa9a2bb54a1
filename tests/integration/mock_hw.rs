//! Mock hardware and shared harness for integration tests.
//!
//! Records every LED write and every structured event so tests can assert
//! on the full history without touching real PWM or a radio.  Also owns
//! the lock that serialises tests around the process-wide simulation
//! statics (edge queue, pin levels, shared light target, notice channel).

use meshnode::adapters::mesh::{self, SimMesh};
use meshnode::app::events::AppEvent;
use meshnode::app::ports::{EndpointRole, EventSink, LedPort, MeshMode, MeshPort};
use meshnode::config::{DeviceRole, MAX_INPUT_LINES, NodeConfig};
use meshnode::drivers::hw_init;
use meshnode::events::EDGE_QUEUE;
use meshnode::fade::{COLOUR_OFF, Color};
use meshnode::sensors::temperature::{TemperatureSensor, sim_set_celsius};
use meshnode::state::LIGHT;
use meshnode::tasks::{Node, Telemetry};

// ── Simulation lock ───────────────────────────────────────────

/// Serialises tests that drive the process-wide simulation statics.
/// Every test that injects edges, sets pin levels or reads the shared
/// light target must go through [`lock_sim`].
pub static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Take the simulation lock and put every shared static back to its
/// boot state, so tests cannot observe each other's leftovers.
pub fn lock_sim() -> std::sync::MutexGuard<'static, ()> {
    let guard = TEST_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    while EDGE_QUEUE.try_recv().is_some() {}
    let _ = EDGE_QUEUE.take_dropped();
    while mesh::take_notice().is_some() {}
    for line in 0..MAX_INPUT_LINES as u8 {
        hw_init::disable_line_interrupt(line);
        hw_init::sim_set_line_level(line, false);
    }
    LIGHT.set_target(COLOUR_OFF);
    let _ = LIGHT.take_identify_request();
    sim_set_celsius(25.0);
    guard
}

// ── LED mock ──────────────────────────────────────────────────

/// Records every colour the fade task renders.
#[derive(Default)]
pub struct MockLed {
    pub writes: Vec<Color>,
}

#[allow(dead_code)]
impl MockLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Color> {
        self.writes.last().copied()
    }
}

impl LedPort for MockLed {
    fn set_rgb(&mut self, colour: Color) {
        self.writes.push(colour);
    }
}

// ── Event sink mock ───────────────────────────────────────────

/// Captures the structured event stream instead of logging it.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Node builders ─────────────────────────────────────────────

/// A simulated mesh stack that has already joined a network, with one
/// endpoint registered.  Mirrors the startup order the binary uses:
/// device info and endpoints before `begin`, then poll until joined.
pub fn joined_mesh(endpoint: u8, role: EndpointRole) -> SimMesh {
    let mut stack = SimMesh::new();
    stack.set_device_info("Espressif", "test-node");
    stack.add_endpoint(endpoint, role).unwrap();
    stack.begin(MeshMode::Router).unwrap();
    for _ in 0..8 {
        if stack.connected() {
            break;
        }
    }
    assert!(stack.connected(), "sim mesh never joined");
    stack
}

/// A fully wired node for the given role: peripherals initialised, line
/// interrupts armed, mesh joined, telemetry attached on the sensor role.
/// Callers must already hold the lock from [`lock_sim`].
#[allow(dead_code)]
pub fn node_for(role: DeviceRole) -> Node<SimMesh, MockLed, RecordingSink> {
    let cfg = NodeConfig::for_role(role);
    hw_init::init_peripherals(&cfg).unwrap();
    hw_init::init_isr_service(&cfg).unwrap();

    let endpoint_role = match role {
        DeviceRole::Light => EndpointRole::Light,
        DeviceRole::Switch => EndpointRole::Switch,
        DeviceRole::TemperatureSensor => EndpointRole::TemperatureSensor {
            min_c: cfg.sensor_min_c,
            max_c: cfg.sensor_max_c,
            tolerance_c: cfg.sensor_tolerance_c,
        },
        DeviceRole::Thermostat => EndpointRole::Thermostat,
    };
    let stack = joined_mesh(cfg.endpoint_id, endpoint_role);

    let telemetry = if role == DeviceRole::TemperatureSensor {
        let sensor = TemperatureSensor::new().unwrap();
        Some(Telemetry::new(&cfg, sensor, 0).unwrap())
    } else {
        None
    };

    Node::new(&cfg, stack, MockLed::new(), RecordingSink::new(), telemetry)
}
