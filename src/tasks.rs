//! Periodic task runtime — the node's beating heart.
//!
//! Runs on one thread using `edge-executor` for cooperative scheduling
//! and `async-io-mini` for reactor-driven timers (no busy-spinning).
//! Five concurrent futures share the [`Node`] state:
//!
//! | Task      | Cadence                      | Drives                             |
//! |-----------|------------------------------|------------------------------------|
//! | input     | 10 ms                        | debounce cycles, gesture dispatch  |
//! | telemetry | sampling deadline            | report policy, attribute reports   |
//! | fade      | 2 ms active / 100 ms idle    | LED writes toward the target       |
//! | identify  | 500 ms                       | target override blink              |
//! | link      | 1 s                          | watchdog, drop counts, notices     |
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │  Executor thread                                             │
//!  │  ┌────────────────────────────────────────────────────────┐  │
//!  │  │  futures_lite::block_on (drives reactor + futures)     │  │
//!  │  │  ┌────────────────────────────────────────────────────┐│  │
//!  │  │  │  edge_executor::LocalExecutor                      ││  │
//!  │  │  │  ┌───────┐ ┌───────────┐ ┌──────┐ ┌──────────┐   ││  │
//!  │  │  │  │ input │ │ telemetry │ │ fade │ │ identify │…  ││  │
//!  │  │  │  └───────┘ └───────────┘ └──────┘ └──────────┘   ││  │
//!  │  │  └────────────────────────────────────────────────────┘│  │
//!  │  └────────────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every loop is a thin timer wrapper around a synchronous `Node` method
//! taking an explicit clock, so the whole runtime steps deterministically
//! under a virtual clock in tests — no executor required.
//!
//! Two clocks flow through here on purpose: the 32-bit wrapping edge
//! timeline (ISR timestamps, debounce arithmetic) and the 64-bit
//! monotonic uptime (report intervals). They never mix.

use core::cell::RefCell;
use core::time::Duration;
use std::rc::Rc;

use log::{info, warn};

use crate::adapters::mesh::{self, MeshNotice};
use crate::adapters::time::{now_ms, Esp32TimeAdapter};
use crate::app::dispatch::{self, DispatchAction, InputFunction};
use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, LedPort, MeshPort};
use crate::config::{DeviceRole, NodeConfig, MAX_INPUT_LINES};
use crate::diagnostics::RuntimeMetrics;
use crate::drivers::hw_init;
use crate::drivers::watchdog::Watchdog;
use crate::events::EDGE_QUEUE;
use crate::fade::{
    FadeEngine, IdentifyEngine, IdentifyOutput, COLOUR_OFF, FADE_IDLE_MS, FADE_STEP_MS,
    IDENTIFY_PHASE_MS,
};
use crate::fsm::gesture::GestureCycle;
use crate::sensors::temperature::TemperatureSensor;
use crate::state::LIGHT;
use crate::telemetry::{ReportPolicy, Reporter};

/// Polling tick for lines mid-debounce and for picking up fresh edges.
pub const INPUT_POLL_MS: u64 = 10;

/// Supervision cadence: watchdog feed, drop counters, link state.
pub const LINK_POLL_MS: u64 = 1000;

// ── Telemetry ────────────────────────────────────────────────

/// Sampling loop state for the sensor role: the on-die sensor, the
/// report policy and the next sampling deadline.
pub struct Telemetry {
    sensor: TemperatureSensor,
    reporter: Reporter,
    period_ms: u64,
    next_sample_at: u64,
}

impl Telemetry {
    pub fn new(
        cfg: &NodeConfig,
        sensor: TemperatureSensor,
        now_ms: u64,
    ) -> Result<Self, crate::app::ports::ConfigError> {
        let policy = ReportPolicy::new(
            cfg.report_min_interval_s,
            cfg.report_max_interval_s,
            cfg.report_delta_c,
        )?;
        Ok(Self {
            sensor,
            reporter: Reporter::new(policy, now_ms),
            period_ms: u64::from(cfg.sample_period_ms),
            next_sample_at: now_ms,
        })
    }

    /// One sampling pass if the deadline has arrived.
    ///
    /// The policy decides; the wire send is fire-and-forget.  Policy
    /// bookkeeping advances on acceptance, so a transient radio failure
    /// is logged without re-arming an immediate retry storm.
    fn poll<M: MeshPort, S: EventSink>(&mut self, now_ms: u64, mesh: &mut M, sink: &mut S) {
        if now_ms < self.next_sample_at {
            return;
        }
        self.next_sample_at += self.period_ms;
        if self.next_sample_at <= now_ms {
            // Fell behind by more than a period; resynchronise instead
            // of burst-sampling to catch up.
            self.next_sample_at = now_ms + self.period_ms;
        }

        let celsius = self.sensor.read();
        if self.reporter.evaluate(celsius, now_ms) {
            push_report(celsius, mesh, sink);
        }
    }

    /// Operator-forced report (button release on the sensor role).
    /// Bypasses the cadence rules but not the bookkeeping.
    fn report_now<M: MeshPort, S: EventSink>(&mut self, now_ms: u64, mesh: &mut M, sink: &mut S) {
        let celsius = self.sensor.read();
        self.reporter.mark_reported(celsius, now_ms);
        push_report(celsius, mesh, sink);
    }

    /// Milliseconds until the next sampling deadline.
    fn ms_until_due(&self, now_ms: u64) -> u64 {
        self.next_sample_at.saturating_sub(now_ms)
    }
}

fn push_report<M: MeshPort, S: EventSink>(celsius: f32, mesh: &mut M, sink: &mut S) {
    match mesh.report_temperature(celsius) {
        Ok(()) => sink.emit(&AppEvent::ReportSent { celsius }),
        Err(e) => warn!("telemetry: report failed: {}", e),
    }
}

// ── Node state ───────────────────────────────────────────────

struct LineState {
    function: InputFunction,
    cycle: GestureCycle,
    /// Interrupt masked, polling in progress.
    cycling: bool,
}

/// Everything the periodic tasks operate on, behind the port traits.
///
/// The async loops below own a `Rc<RefCell<Node>>` and call one method
/// per wakeup; tests construct a `Node` directly and step it with a
/// virtual clock.
pub struct Node<M: MeshPort, L: LedPort, S: EventSink> {
    role: DeviceRole,
    mesh: M,
    led: L,
    sink: S,
    lines: heapless::Vec<LineState, MAX_INPUT_LINES>,
    telemetry: Option<Telemetry>,
    fade: FadeEngine,
    identify: IdentifyEngine,
    last_connected: bool,
    last_bound: bool,
}

impl<M: MeshPort, L: LedPort, S: EventSink> Node<M, L, S> {
    /// `telemetry` is `Some` only for the sensor role; every other role
    /// samples nothing.
    pub fn new(cfg: &NodeConfig, mesh: M, led: L, sink: S, telemetry: Option<Telemetry>) -> Self {
        let mut lines = heapless::Vec::new();
        for line in &cfg.lines {
            let _ = lines.push(LineState {
                function: line.function,
                cycle: GestureCycle::new(),
                cycling: false,
            });
        }
        Self {
            role: cfg.role,
            mesh,
            led,
            sink,
            lines,
            telemetry,
            fade: FadeEngine::new(COLOUR_OFF),
            identify: IdentifyEngine::new(),
            last_connected: false,
            last_bound: false,
        }
    }

    pub fn mesh(&self) -> &M {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut M {
        &mut self.mesh
    }

    pub fn led(&self) -> &L {
        &self.led
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn has_telemetry(&self) -> bool {
        self.telemetry.is_some()
    }

    /// One input tick.
    ///
    /// `now_ms` is the wrapping edge-timeline clock shared with the ISR
    /// timestamps; `uptime_ms` is the monotonic clock forced reports are
    /// book-kept on.
    ///
    /// Fresh edges mask their line's interrupt and seed a debounce cycle
    /// from the ISR-captured level and timestamp; lines mid-cycle are
    /// polled at tick cadence; a cycle draining back to idle re-arms the
    /// interrupt. Edges queued for a line already mid-cycle are bounce
    /// and are discarded unread.
    pub fn poll_input(&mut self, now_ms: u32, uptime_ms: u64) {
        let mut fired: heapless::Vec<(u8, DispatchAction), MAX_INPUT_LINES> = heapless::Vec::new();
        let mut seeded = [false; MAX_INPUT_LINES];

        while let Some(raw) = EDGE_QUEUE.try_recv() {
            let idx = raw.line as usize;
            let Some(line) = self.lines.get_mut(idx) else {
                continue;
            };
            if line.cycling {
                continue;
            }
            hw_init::disable_line_interrupt(raw.line);
            line.cycling = true;
            seeded[idx] = true;
            if let Some(ev) = line.cycle.poll(raw.level_active, raw.timestamp_ms) {
                if let Some(action) = dispatch::map(line.function, ev, self.role) {
                    let _ = fired.push((raw.line, action));
                }
            }
            if line.cycle.is_idle() {
                // The level bounced away before the ISR sample; nothing
                // to debounce after all.
                line.cycling = false;
                hw_init::enable_line_interrupt(raw.line);
            }
        }

        for idx in 0..self.lines.len() {
            if seeded[idx] || !self.lines[idx].cycling {
                continue;
            }
            let level = hw_init::line_level_active(idx as u8);
            let line = &mut self.lines[idx];
            if let Some(ev) = line.cycle.poll(level, now_ms) {
                if let Some(action) = dispatch::map(line.function, ev, self.role) {
                    let _ = fired.push((idx as u8, action));
                }
            }
            if line.cycle.is_idle() {
                line.cycling = false;
                hw_init::enable_line_interrupt(idx as u8);
            }
        }

        for (line, action) in fired {
            self.execute(line, action, uptime_ms);
        }
    }

    fn execute(&mut self, line: u8, action: DispatchAction, uptime_ms: u64) {
        self.sink.emit(&AppEvent::ActionDispatched { line, action });
        match action {
            DispatchAction::Mesh(cmd) => {
                if let Err(e) = self.mesh.send_action(cmd) {
                    warn!("input: {:?} not sent: {}", cmd, e);
                }
            }
            DispatchAction::FactoryReset => {
                self.sink.emit(&AppEvent::FactoryResetArmed { line });
                // On hardware this de-provisions and reboots without
                // returning.
                self.mesh.factory_reset();
            }
            DispatchAction::ReportNow => {
                if let Some(telemetry) = self.telemetry.as_mut() {
                    telemetry.report_now(uptime_ms, &mut self.mesh, &mut self.sink);
                }
            }
            DispatchAction::QuerySensorSettings => {
                if let Err(e) = self.mesh.query_sensor_settings() {
                    warn!("input: settings query failed: {}", e);
                }
                self.mesh.log_bound_devices();
            }
        }
    }

    /// Sampling pass for the sensor role; no-op on every other role.
    pub fn poll_telemetry(&mut self, uptime_ms: u64) {
        if let Some(telemetry) = self.telemetry.as_mut() {
            telemetry.poll(uptime_ms, &mut self.mesh, &mut self.sink);
        }
    }

    /// How long the telemetry loop may sleep before the next deadline.
    fn telemetry_sleep_ms(&self, uptime_ms: u64) -> u64 {
        self.telemetry
            .as_ref()
            .map_or(LINK_POLL_MS, |t| t.ms_until_due(uptime_ms).max(1))
    }

    /// One fade step toward the shared target. Returns true when a write
    /// went out, so the caller picks the short step sleep over the idle
    /// one.
    pub fn tick_fade(&mut self) -> bool {
        match self.fade.tick(LIGHT.target()) {
            Some(colour) => {
                self.led.set_rgb(colour);
                true
            }
            None => false,
        }
    }

    /// One identify half-phase: pick up a pending request, then write
    /// the override or restore colour into the shared target.
    ///
    /// While a sequence runs the target is reasserted every phase, so a
    /// concurrent on/off command shows through for at most one
    /// half-phase before the blink takes it back.
    pub fn tick_identify(&mut self) {
        if let Some(seconds) = LIGHT.take_identify_request() {
            self.identify.start(seconds, LIGHT.target());
        }
        match self.identify.tick() {
            IdentifyOutput::Idle => {}
            IdentifyOutput::Override(colour) | IdentifyOutput::Restore(colour) => {
                LIGHT.set_target(colour);
            }
        }
    }

    /// Supervision pass: surface queue overflow, link-state changes and
    /// stack notices as events.
    pub fn poll_link(&mut self) {
        let dropped = EDGE_QUEUE.take_dropped();
        if dropped > 0 {
            self.sink.emit(&AppEvent::EdgesDropped { count: dropped });
        }

        let connected = self.mesh.connected();
        let bound = self.mesh.bound();
        if connected != self.last_connected || bound != self.last_bound {
            self.last_connected = connected;
            self.last_bound = bound;
            self.sink.emit(&AppEvent::MeshStateChanged { connected, bound });
        }

        while let Some(notice) = mesh::take_notice() {
            match notice {
                MeshNotice::SensorConfig {
                    min_c,
                    max_c,
                    tolerance_c,
                } => {
                    self.sink.emit(&AppEvent::SensorConfigReceived {
                        min_c,
                        max_c,
                        tolerance_c,
                    });
                }
            }
        }
    }
}

// ── Async loops ──────────────────────────────────────────────

type SharedNode<M, L, S> = Rc<RefCell<Node<M, L, S>>>;

async fn input_loop<M: MeshPort, L: LedPort, S: EventSink>(node: SharedNode<M, L, S>) {
    let clock = Esp32TimeAdapter::new();
    loop {
        node.borrow_mut().poll_input(now_ms(), clock.uptime_ms());
        async_io_mini::Timer::after(Duration::from_millis(INPUT_POLL_MS)).await;
    }
}

async fn telemetry_loop<M: MeshPort, L: LedPort, S: EventSink>(node: SharedNode<M, L, S>) {
    let clock = Esp32TimeAdapter::new();
    loop {
        let sleep_ms = {
            let mut n = node.borrow_mut();
            n.poll_telemetry(clock.uptime_ms());
            n.telemetry_sleep_ms(clock.uptime_ms())
        };
        async_io_mini::Timer::after(Duration::from_millis(sleep_ms)).await;
    }
}

async fn fade_loop<M: MeshPort, L: LedPort, S: EventSink>(node: SharedNode<M, L, S>) {
    loop {
        let wrote = node.borrow_mut().tick_fade();
        let sleep_ms = if wrote { FADE_STEP_MS } else { FADE_IDLE_MS };
        async_io_mini::Timer::after(Duration::from_millis(sleep_ms)).await;
    }
}

async fn identify_loop<M: MeshPort, L: LedPort, S: EventSink>(node: SharedNode<M, L, S>) {
    loop {
        node.borrow_mut().tick_identify();
        async_io_mini::Timer::after(Duration::from_millis(IDENTIFY_PHASE_MS)).await;
    }
}

async fn link_loop<M: MeshPort, L: LedPort, S: EventSink>(
    node: SharedNode<M, L, S>,
    watchdog: Watchdog,
) {
    let clock = Esp32TimeAdapter::new();
    let mut passes: u32 = 0;
    loop {
        watchdog.feed();
        node.borrow_mut().poll_link();
        passes = passes.wrapping_add(1);
        if passes % 60 == 0 {
            info!("health: {}", RuntimeMetrics::collect(clock.uptime_secs()));
        }
        async_io_mini::Timer::after(Duration::from_millis(LINK_POLL_MS)).await;
    }
}

/// Drive the task runtime forever.
///
/// Subscribes the executor thread to the task watchdog, spawns the
/// periodic loops and parks in the reactor. Only a panic (and the
/// watchdog behind it) gets out.
pub fn run<M, L, S>(node: Node<M, L, S>)
where
    M: MeshPort + 'static,
    L: LedPort + 'static,
    S: EventSink + 'static,
{
    let executor: edge_executor::LocalExecutor<'_, 8> = edge_executor::LocalExecutor::new();
    let node: SharedNode<M, L, S> = Rc::new(RefCell::new(node));
    let watchdog = Watchdog::new();

    let has_telemetry = node.borrow().has_telemetry();
    let line_count = node.borrow().lines.len();

    executor.spawn(input_loop(node.clone())).detach();
    if has_telemetry {
        executor.spawn(telemetry_loop(node.clone())).detach();
    }
    executor.spawn(fade_loop(node.clone())).detach();
    executor.spawn(identify_loop(node.clone())).detach();
    executor.spawn(link_loop(node.clone(), watchdog)).detach();

    info!(
        "task runtime started ({} input line(s), telemetry={})",
        line_count, has_telemetry
    );

    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;
    use crate::adapters::mesh::SimMesh;
    use crate::app::ports::{EndpointRole, MeshAction, MeshMode};
    use crate::drivers::hw_init::{sim_inject_edge, sim_set_line_level};
    use crate::events::{RawEdgeEvent, SIM_TEST_LOCK};
    use crate::fade::Color;
    use crate::sensors::temperature::sim_set_celsius;

    struct MockLed {
        writes: Vec<Color>,
    }

    impl MockLed {
        fn new() -> Self {
            Self { writes: Vec::new() }
        }
    }

    impl LedPort for MockLed {
        fn set_rgb(&mut self, colour: Color) {
            self.writes.push(colour);
        }
    }

    struct RecordingSink {
        events: Vec<AppEvent>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { events: Vec::new() }
        }

        fn count(&self, predicate: impl Fn(&AppEvent) -> bool) -> usize {
            self.events.iter().filter(|e| predicate(e)).count()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&mut self, event: &AppEvent) {
            self.events.push(event.clone());
        }
    }

    fn lock_and_reset() -> std::sync::MutexGuard<'static, ()> {
        let guard = SIM_TEST_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while EDGE_QUEUE.try_recv().is_some() {}
        EDGE_QUEUE.take_dropped();
        while mesh::take_notice().is_some() {}
        for line in 0..MAX_INPUT_LINES as u8 {
            hw_init::disable_line_interrupt(line);
            sim_set_line_level(line, false);
        }
        LIGHT.set_target(COLOUR_OFF);
        LIGHT.take_identify_request();
        sim_set_celsius(25.0);
        guard
    }

    fn joined_mesh(endpoint: u8, role: EndpointRole) -> SimMesh {
        let mut mesh = SimMesh::new();
        mesh.add_endpoint(endpoint, role).unwrap();
        mesh.begin(MeshMode::Router).unwrap();
        for _ in 0..8 {
            if mesh.connected() {
                break;
            }
        }
        assert!(mesh.connected());
        mesh
    }

    fn node_for(role: DeviceRole) -> Node<SimMesh, MockLed, RecordingSink> {
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
        let mesh = joined_mesh(cfg.endpoint_id, endpoint_role);

        let telemetry = if role == DeviceRole::TemperatureSensor {
            let sensor = TemperatureSensor::new().unwrap();
            Some(Telemetry::new(&cfg, sensor, 0).unwrap())
        } else {
            None
        };

        Node::new(&cfg, mesh, MockLed::new(), RecordingSink::new(), telemetry)
    }

    /// Press at `t_ms` through the direct queue path, with the simulated
    /// level already driven active.
    fn press(t_ms: u32) {
        sim_set_line_level(0, true);
        EDGE_QUEUE.try_send(RawEdgeEvent {
            line: 0,
            level_active: true,
            timestamp_ms: t_ms,
        });
    }

    #[test]
    fn press_dispatches_configured_function() {
        let _guard = lock_and_reset();
        let mut node = node_for(DeviceRole::Switch);

        press(0);
        node.poll_input(0, 0);

        assert_eq!(node.mesh().actions(), &[MeshAction::Toggle]);
        // Mid-cycle the line's interrupt is masked: injected edges vanish.
        sim_inject_edge(0);
        assert!(EDGE_QUEUE.try_recv().is_none());
    }

    #[test]
    fn bounce_burst_collapses_to_one_press_release() {
        let _guard = lock_and_reset();
        let mut node = node_for(DeviceRole::Switch);

        // Press with a bounce burst already queued behind the first edge.
        press(0);
        EDGE_QUEUE.try_send(RawEdgeEvent {
            line: 0,
            level_active: false,
            timestamp_ms: 1,
        });
        EDGE_QUEUE.try_send(RawEdgeEvent {
            line: 0,
            level_active: true,
            timestamp_ms: 2,
        });
        node.poll_input(0, 0);

        // Hold a few ticks, release, drain back to idle.
        node.poll_input(10, 10);
        node.poll_input(20, 20);
        sim_set_line_level(0, false);
        for t in [30, 40, 50, 60] {
            node.poll_input(t, u64::from(t));
        }

        assert_eq!(node.mesh().actions(), &[MeshAction::Toggle]);
        assert_eq!(
            node.sink()
                .count(|e| matches!(e, AppEvent::ActionDispatched { .. })),
            1
        );

        // Idle again: the interrupt is re-armed and edges flow.
        sim_set_line_level(0, true);
        sim_inject_edge(0);
        assert!(EDGE_QUEUE.try_recv().is_some());
    }

    #[test]
    fn hold_past_threshold_resets_exactly_once() {
        let _guard = lock_and_reset();
        let mut node = node_for(DeviceRole::Light);

        press(0);
        node.poll_input(0, 0);
        let mut t = 10;
        while t <= 10_000 {
            node.poll_input(t, u64::from(t));
            t += 10;
        }

        assert_eq!(node.mesh().factory_resets(), 1);
        assert_eq!(
            node.sink()
                .count(|e| matches!(e, AppEvent::FactoryResetArmed { .. })),
            1
        );
    }

    #[test]
    fn release_just_before_threshold_never_resets() {
        let _guard = lock_and_reset();
        let mut node = node_for(DeviceRole::Light);

        press(0);
        node.poll_input(0, 0);
        let mut t = 10;
        while t <= 2_990 {
            node.poll_input(t, u64::from(t));
            t += 10;
        }
        sim_set_line_level(0, false);
        for t in [2_999, 3_009, 3_019, 3_029] {
            node.poll_input(t, u64::from(t));
        }

        assert_eq!(node.mesh().factory_resets(), 0);
        assert!(node.sink().events.iter().all(|e| !matches!(
            e,
            AppEvent::FactoryResetArmed { .. }
        )));
    }

    #[test]
    fn sensor_release_forces_an_immediate_report() {
        let _guard = lock_and_reset();
        let mut node = node_for(DeviceRole::TemperatureSensor);
        sim_set_celsius(22.5);

        press(0);
        node.poll_input(0, 0);
        node.poll_input(10, 10);
        sim_set_line_level(0, false);
        for t in [20, 30, 40, 50] {
            node.poll_input(t, u64::from(t));
        }

        assert_eq!(node.mesh().reports(), &[22.5]);
        assert_eq!(
            node.sink().count(|e| matches!(e, AppEvent::ReportSent { .. })),
            1
        );
    }

    #[test]
    fn thermostat_release_queries_bound_sensor() {
        let _guard = lock_and_reset();
        let mut node = node_for(DeviceRole::Thermostat);
        node.mesh_mut().sim_set_remote_sensor_config(10.0, 50.0, 1.0);

        press(0);
        node.poll_input(0, 0);
        node.poll_input(10, 10);
        sim_set_line_level(0, false);
        for t in [20, 30, 40, 50] {
            node.poll_input(t, u64::from(t));
        }

        assert_eq!(
            node.sink().count(|e| matches!(
                e,
                AppEvent::ActionDispatched {
                    action: DispatchAction::QuerySensorSettings,
                    ..
                }
            )),
            1
        );
    }

    #[test]
    fn telemetry_follows_the_report_policy() {
        let _guard = lock_and_reset();
        let mut node = node_for(DeviceRole::TemperatureSensor);

        // First sample: no baseline, so the configured delta counts as
        // crossed once the suppression window from construction passes.
        sim_set_celsius(25.0);
        node.poll_telemetry(1_000);
        assert_eq!(node.mesh().reports(), &[25.0]);

        // Unchanged value: delta not crossed, no heartbeat configured.
        node.poll_telemetry(2_000);
        assert_eq!(node.mesh().reports().len(), 1);

        // Moved a degree and a half: reported.
        sim_set_celsius(26.5);
        node.poll_telemetry(3_000);
        assert_eq!(node.mesh().reports(), &[25.0, 26.5]);
    }

    #[test]
    fn fade_ramps_led_one_step_per_tick() {
        let _guard = lock_and_reset();
        let mut node = node_for(DeviceRole::Light);

        LIGHT.set_target(Color::new(3, 0, 0));
        assert!(node.tick_fade());
        assert!(node.tick_fade());
        assert!(node.tick_fade());
        assert!(!node.tick_fade());

        assert_eq!(
            node.led().writes,
            vec![
                Color::new(1, 0, 0),
                Color::new(2, 0, 0),
                Color::new(3, 0, 0)
            ]
        );
    }

    #[test]
    fn identify_blinks_then_restores_the_target() {
        let _guard = lock_and_reset();
        let mut node = node_for(DeviceRole::Light);

        let green = Color::new(0, 255, 0);
        LIGHT.set_target(green);
        LIGHT.request_identify(1);

        node.tick_identify();
        assert_eq!(LIGHT.target(), crate::fade::COLOUR_IDENTIFY);
        node.tick_identify();
        assert_eq!(LIGHT.target(), COLOUR_OFF);
        node.tick_identify();
        assert_eq!(LIGHT.target(), green);
    }

    #[test]
    fn link_surfaces_connectivity_and_drops() {
        let _guard = lock_and_reset();
        let mut node = node_for(DeviceRole::Light);

        // Already joined at construction: first pass reports it.
        node.poll_link();
        assert_eq!(
            node.sink().count(|e| matches!(
                e,
                AppEvent::MeshStateChanged {
                    connected: true,
                    bound: false
                }
            )),
            1
        );

        // The simulated peer binds after a few more polls.
        for _ in 0..6 {
            node.poll_link();
        }
        assert_eq!(
            node.sink().count(|e| matches!(
                e,
                AppEvent::MeshStateChanged {
                    connected: true,
                    bound: true
                }
            )),
            1
        );

        // Overflow the queue and check the drop counter surfaces.
        for i in 0..(crate::events::EDGE_QUEUE_CAP as u32 + 4) {
            EDGE_QUEUE.try_send(RawEdgeEvent {
                line: 0,
                level_active: true,
                timestamp_ms: i,
            });
        }
        node.poll_link();
        assert_eq!(
            node.sink()
                .count(|e| matches!(e, AppEvent::EdgesDropped { count: 5 })),
            1
        );
        while EDGE_QUEUE.try_recv().is_some() {}
    }

    #[test]
    fn sensor_config_notice_becomes_an_event() {
        let _guard = lock_and_reset();
        let mut node = node_for(DeviceRole::Thermostat);

        mesh::notify(MeshNotice::SensorConfig {
            min_c: 10.0,
            max_c: 50.0,
            tolerance_c: 1.0,
        });
        node.poll_link();

        assert_eq!(
            node.sink().count(|e| matches!(
                e,
                AppEvent::SensorConfigReceived { .. }
            )),
            1
        );
    }
}
