//! Wireless-mesh stack adapter.
//!
//! Implements [`MeshPort`] — the hexagonal boundary between the node
//! logic and the vendor mesh stack.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`EspMeshStack`] drives the vendor
//!   Zigbee SDK (see `esp_impl`). The stack main loop runs on its own
//!   pinned thread; attribute writes take the stack lock.
//! - **all other targets**: [`SimMesh`] simulates joining, binding and
//!   remote commands for host-side tests.
//!
//! ## Endpoint roles
//!
//! | Role              | Endpoint | Clusters (server unless noted)      |
//! |-------------------|----------|-------------------------------------|
//! | Light             | 10       | on/off, level, colour, identify     |
//! | Switch            | 5        | on/off (client)                     |
//! | TemperatureSensor | 11       | temperature measurement             |
//! | Thermostat        | 6        | thermostat; reads bound sensors     |
//!
//! ## Callback discipline
//!
//! Stack callbacks run on the mesh task, never in interrupt context, and
//! must stay short: registered handlers only store a target or push a
//! [`MeshNotice`]. The slow work (fades, reports, logging) happens in the
//! executor tasks.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

#[cfg(target_os = "espidf")]
pub mod esp_impl;
#[cfg(target_os = "espidf")]
pub use esp_impl::EspMeshStack;

#[cfg(not(target_os = "espidf"))]
use crate::app::ports::{EndpointRole, MeshAction, MeshError, MeshMode, MeshPort};

// ───────────────────────────────────────────────────────────────
// Notices: mesh task → executor tasks
// ───────────────────────────────────────────────────────────────

/// Out-of-band data received from the mesh, drained by the link task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeshNotice {
    /// A bound sensor answered a settings query (thermostat role).
    SensorConfig {
        min_c: f32,
        max_c: f32,
        tolerance_c: f32,
    },
}

/// Bounded queue between stack-callback context and the executor.
///
/// Callbacks are captureless fn pointers, so this lives in a static.
/// Callbacks run on the mesh task (not an ISR), which keeps the
/// critical-section shim's std mutex legal there.
pub static NOTICES: Channel<CriticalSectionRawMutex, MeshNotice, 8> = Channel::new();

/// Push a notice from callback context. Never blocks; a full queue
/// drops the notice with a warning.
pub fn notify(notice: MeshNotice) {
    if NOTICES.try_send(notice).is_err() {
        warn!("mesh: notice queue full, dropping {:?}", notice);
    }
}

/// Drain one pending notice, if any. Called from the link task.
pub fn take_notice() -> Option<MeshNotice> {
    NOTICES.try_receive().ok()
}

// ───────────────────────────────────────────────────────────────
// Simulation backend
// ───────────────────────────────────────────────────────────────

/// Polls of `connected()` before the simulated join completes.
#[cfg(not(target_os = "espidf"))]
const SIM_JOIN_POLLS: u8 = 3;

/// Further polls of `bound()` before a simulated peer binds.
#[cfg(not(target_os = "espidf"))]
const SIM_BIND_POLLS: u8 = 5;

/// Host-side mesh stack: records outbound traffic and lets tests inject
/// inbound commands through the registered handlers.
#[cfg(not(target_os = "espidf"))]
pub struct SimMesh {
    manufacturer: heapless::String<32>,
    model: heapless::String<32>,
    endpoints: heapless::Vec<(u8, EndpointRole), 4>,
    mode: Option<MeshMode>,
    started: bool,
    fail_next_begin: bool,
    join_countdown: core::cell::Cell<u8>,
    bind_countdown: core::cell::Cell<u8>,
    light_handler: Option<fn(bool)>,
    identify_handler: Option<fn(u16)>,
    sensor_config_handler: Option<fn(f32, f32, f32)>,
    remote_sensor_config: Option<(f32, f32, f32)>,
    reports: Vec<f32>,
    actions: Vec<MeshAction>,
    factory_resets: u32,
}

#[cfg(not(target_os = "espidf"))]
impl SimMesh {
    pub fn new() -> Self {
        Self {
            manufacturer: heapless::String::new(),
            model: heapless::String::new(),
            endpoints: heapless::Vec::new(),
            mode: None,
            started: false,
            fail_next_begin: false,
            join_countdown: core::cell::Cell::new(SIM_JOIN_POLLS),
            bind_countdown: core::cell::Cell::new(SIM_BIND_POLLS),
            light_handler: None,
            identify_handler: None,
            sensor_config_handler: None,
            remote_sensor_config: None,
            reports: Vec::new(),
            actions: Vec::new(),
            factory_resets: 0,
        }
    }

    // ── Test / host-run injection helpers ─────────────────────

    /// Make the next `begin()` fail, as a dead radio would.
    pub fn sim_fail_next_begin(&mut self) {
        self.fail_next_begin = true;
    }

    /// Deliver a remote on/off command, as the coordinator would.
    pub fn sim_receive_light_command(&self, on: bool) {
        if let Some(handler) = self.light_handler {
            handler(on);
        }
    }

    /// Deliver a remote identify request for `seconds`.
    pub fn sim_receive_identify(&self, seconds: u16) {
        if let Some(handler) = self.identify_handler {
            handler(seconds);
        }
    }

    /// Stage the reporting config a simulated bound sensor will answer
    /// settings queries with.
    pub fn sim_set_remote_sensor_config(&mut self, min_c: f32, max_c: f32, tolerance_c: f32) {
        self.remote_sensor_config = Some((min_c, max_c, tolerance_c));
    }

    pub fn reports(&self) -> &[f32] {
        &self.reports
    }

    pub fn actions(&self) -> &[MeshAction] {
        &self.actions
    }

    pub fn factory_resets(&self) -> u32 {
        self.factory_resets
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for SimMesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl MeshPort for SimMesh {
    fn set_device_info(&mut self, manufacturer: &str, model: &str) {
        self.manufacturer.clear();
        let _ = self.manufacturer.push_str(manufacturer);
        self.model.clear();
        let _ = self.model.push_str(model);
    }

    fn add_endpoint(&mut self, id: u8, role: EndpointRole) -> Result<(), MeshError> {
        if self.started || self.endpoints.iter().any(|(eid, _)| *eid == id) {
            return Err(MeshError::EndpointRejected);
        }
        self.endpoints
            .push((id, role))
            .map_err(|_| MeshError::EndpointRejected)
    }

    fn begin(&mut self, mode: MeshMode) -> Result<(), MeshError> {
        if self.fail_next_begin {
            self.fail_next_begin = false;
            return Err(MeshError::StackStartFailed);
        }
        if self.endpoints.is_empty() {
            return Err(MeshError::StackStartFailed);
        }
        self.mode = Some(mode);
        self.started = true;
        log::info!(
            "mesh(sim): started as {:?} with {} endpoint(s), '{}' / '{}'",
            mode,
            self.endpoints.len(),
            self.manufacturer,
            self.model,
        );
        Ok(())
    }

    fn connected(&self) -> bool {
        if !self.started {
            return false;
        }
        let left = self.join_countdown.get();
        if left > 0 {
            self.join_countdown.set(left - 1);
            return false;
        }
        true
    }

    fn bound(&self) -> bool {
        if !self.started || self.join_countdown.get() > 0 {
            return false;
        }
        let left = self.bind_countdown.get();
        if left > 0 {
            self.bind_countdown.set(left - 1);
            return false;
        }
        true
    }

    fn report_temperature(&mut self, celsius: f32) -> Result<(), MeshError> {
        if !self.started || self.join_countdown.get() > 0 {
            return Err(MeshError::NotConnected);
        }
        log::info!("mesh(sim): reporting {:.2}\u{00b0}C", celsius);
        self.reports.push(celsius);
        Ok(())
    }

    fn send_action(&mut self, action: MeshAction) -> Result<(), MeshError> {
        if !self.started || self.join_countdown.get() > 0 {
            return Err(MeshError::NotConnected);
        }
        log::info!("mesh(sim): sending {:?} to bound devices", action);
        self.actions.push(action);
        Ok(())
    }

    fn query_sensor_settings(&mut self) -> Result<(), MeshError> {
        if !self.started || self.join_countdown.get() > 0 {
            return Err(MeshError::NotConnected);
        }
        match (self.remote_sensor_config, self.sensor_config_handler) {
            (Some((min_c, max_c, tol)), Some(handler)) => {
                log::info!("mesh(sim): bound sensor answered settings query");
                handler(min_c, max_c, tol);
                Ok(())
            }
            (None, _) => Err(MeshError::QueryFailed),
            (_, None) => Ok(()),
        }
    }

    fn log_bound_devices(&self) {
        if self.bind_countdown.get() == 0 {
            log::info!("mesh(sim): 1 bound device (simulated sensor, endpoint 11)");
        } else {
            log::info!("mesh(sim): no bound devices");
        }
    }

    fn factory_reset(&mut self) {
        warn!("mesh(sim): factory reset requested, device would erase pairing and reboot");
        self.factory_resets += 1;
        self.started = false;
        self.join_countdown.set(SIM_JOIN_POLLS);
        self.bind_countdown.set(SIM_BIND_POLLS);
    }

    fn on_light_change(&mut self, handler: fn(bool)) {
        self.light_handler = Some(handler);
    }

    fn on_identify(&mut self, handler: fn(u16)) {
        self.identify_handler = Some(handler);
    }

    fn on_sensor_config(&mut self, handler: fn(f32, f32, f32)) {
        self.sensor_config_handler = Some(handler);
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{EndpointRole, MeshAction, MeshError, MeshMode, MeshPort};
    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn light_node() -> SimMesh {
        let mut mesh = SimMesh::new();
        mesh.set_device_info("Meshnode", "MN-TEST01");
        mesh.add_endpoint(10, EndpointRole::Light).unwrap();
        mesh
    }

    fn joined(mesh: &SimMesh) {
        while !mesh.connected() {}
    }

    #[test]
    fn join_completes_after_a_few_polls() {
        let mut mesh = light_node();
        assert!(!mesh.connected());
        mesh.begin(MeshMode::Router).unwrap();
        let mut polls = 0;
        while !mesh.connected() {
            polls += 1;
            assert!(polls < 20, "join never completed");
        }
        assert!(mesh.connected());
    }

    #[test]
    fn binding_follows_joining() {
        let mut mesh = light_node();
        mesh.begin(MeshMode::Router).unwrap();
        assert!(!mesh.bound());
        joined(&mesh);
        let mut polls = 0;
        while !mesh.bound() {
            polls += 1;
            assert!(polls < 20, "bind never completed");
        }
    }

    #[test]
    fn duplicate_endpoint_rejected() {
        let mut mesh = light_node();
        assert_eq!(
            mesh.add_endpoint(10, EndpointRole::Switch),
            Err(MeshError::EndpointRejected)
        );
    }

    #[test]
    fn begin_without_endpoints_fails() {
        let mut mesh = SimMesh::new();
        assert_eq!(
            mesh.begin(MeshMode::EndDevice),
            Err(MeshError::StackStartFailed)
        );
    }

    #[test]
    fn injected_begin_failure_surfaces() {
        let mut mesh = light_node();
        mesh.sim_fail_next_begin();
        assert_eq!(mesh.begin(MeshMode::Router), Err(MeshError::StackStartFailed));
        // A retry after the fault clears succeeds.
        assert!(mesh.begin(MeshMode::Router).is_ok());
    }

    #[test]
    fn traffic_requires_connection() {
        let mut mesh = light_node();
        mesh.begin(MeshMode::Router).unwrap();
        assert_eq!(mesh.report_temperature(21.0), Err(MeshError::NotConnected));
        joined(&mesh);
        mesh.report_temperature(21.0).unwrap();
        mesh.send_action(MeshAction::Toggle).unwrap();
        assert_eq!(mesh.reports(), &[21.0]);
        assert_eq!(mesh.actions(), &[MeshAction::Toggle]);
    }

    #[test]
    fn inbound_light_command_reaches_handler() {
        static LAST_ON: AtomicBool = AtomicBool::new(false);
        fn handler(on: bool) {
            LAST_ON.store(on, Ordering::Relaxed);
        }

        let mut mesh = light_node();
        mesh.on_light_change(handler);
        mesh.begin(MeshMode::Router).unwrap();
        mesh.sim_receive_light_command(true);
        assert!(LAST_ON.load(Ordering::Relaxed));
    }

    #[test]
    fn inbound_identify_reaches_handler() {
        static LAST_SECS: AtomicU32 = AtomicU32::new(0);
        fn handler(seconds: u16) {
            LAST_SECS.store(u32::from(seconds), Ordering::Relaxed);
        }

        let mut mesh = light_node();
        mesh.on_identify(handler);
        mesh.begin(MeshMode::Router).unwrap();
        mesh.sim_receive_identify(30);
        assert_eq!(LAST_SECS.load(Ordering::Relaxed), 30);
    }

    #[test]
    fn settings_query_round_trips_through_handler() {
        static LAST_MIN: AtomicU32 = AtomicU32::new(0);
        fn handler(min_c: f32, _max_c: f32, _tol: f32) {
            LAST_MIN.store(min_c.to_bits(), Ordering::Relaxed);
        }

        let mut mesh = SimMesh::new();
        mesh.add_endpoint(6, EndpointRole::Thermostat).unwrap();
        mesh.on_sensor_config(handler);
        mesh.sim_set_remote_sensor_config(10.0, 50.0, 1.0);
        mesh.begin(MeshMode::Router).unwrap();
        joined(&mesh);
        mesh.query_sensor_settings().unwrap();
        assert_eq!(f32::from_bits(LAST_MIN.load(Ordering::Relaxed)), 10.0);
    }

    #[test]
    fn settings_query_without_peer_fails() {
        let mut mesh = SimMesh::new();
        mesh.add_endpoint(6, EndpointRole::Thermostat).unwrap();
        mesh.begin(MeshMode::Router).unwrap();
        joined(&mesh);
        assert_eq!(mesh.query_sensor_settings(), Err(MeshError::QueryFailed));
    }

    #[test]
    fn factory_reset_drops_the_network() {
        let mut mesh = light_node();
        mesh.begin(MeshMode::Router).unwrap();
        joined(&mesh);
        mesh.factory_reset();
        assert_eq!(mesh.factory_resets(), 1);
        assert!(!mesh.connected());
    }

    #[test]
    fn notices_round_trip() {
        // The channel is a process-wide static shared with the task
        // tests; serialise on the simulation lock like they do.
        let _guard = crate::events::SIM_TEST_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while take_notice().is_some() {}

        notify(MeshNotice::SensorConfig {
            min_c: 10.0,
            max_c: 50.0,
            tolerance_c: 1.0,
        });
        match take_notice() {
            Some(MeshNotice::SensorConfig { min_c, .. }) => assert_eq!(min_c, 10.0),
            other => panic!("expected sensor config notice, got {:?}", other),
        }
        assert!(take_notice().is_none());
    }
}
