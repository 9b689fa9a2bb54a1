//! End-to-end node flows: injected edge interrupts through the debounce
//! machine and dispatcher, out to the simulated mesh stack.
//!
//! These mirror the wiring the binary does at boot, including the
//! stack-context callbacks the mesh registers per role.

use crate::mock_hw::{MockLed, RecordingSink, lock_sim, node_for};
use meshnode::adapters::mesh::{self, MeshNotice, SimMesh};
use meshnode::adapters::time;
use meshnode::app::events::AppEvent;
use meshnode::app::ports::{MeshAction, MeshPort};
use meshnode::config::DeviceRole;
use meshnode::drivers::hw_init;
use meshnode::events::{EDGE_QUEUE, RawEdgeEvent};
use meshnode::fade::{COLOUR_IDENTIFY, COLOUR_OFF, COLOUR_ON};
use meshnode::sensors::temperature::sim_set_celsius;
use meshnode::state::LIGHT;
use meshnode::tasks::Node;

type TestNode = Node<SimMesh, MockLed, RecordingSink>;

/// Queue a press edge directly, as if the ISR had already fired, and
/// leave the simulated line held active.
fn press_at(t_ms: u32) {
    hw_init::sim_set_line_level(0, true);
    assert!(EDGE_QUEUE.try_send(RawEdgeEvent {
        line: 0,
        level_active: true,
        timestamp_ms: t_ms,
    }));
}

/// Drop the line and poll enough ticks to fire the release and walk the
/// machine back to idle, wherever in the cycle it currently is.
fn release_at(node: &mut TestNode, t_ms: u32) {
    hw_init::sim_set_line_level(0, false);
    for tick in 0..3u32 {
        let t = t_ms.wrapping_add(tick * 10);
        node.poll_input(t, u64::from(t));
    }
}

// Stack-context callbacks, wired exactly like the binary wires them.

fn light_changed(on: bool) {
    LIGHT.set_target(if on { COLOUR_ON } else { COLOUR_OFF });
}

fn identify_requested(seconds: u16) {
    LIGHT.request_identify(seconds);
}

fn sensor_config_forwarded(min_c: f32, max_c: f32, tolerance_c: f32) {
    mesh::notify(MeshNotice::SensorConfig {
        min_c,
        max_c,
        tolerance_c,
    });
}

#[test]
fn injected_interrupt_travels_isr_to_mesh() {
    let _guard = lock_sim();
    let mut node = node_for(DeviceRole::Switch);

    // First closure through the real injection path, which honours the
    // per-line interrupt mask and stamps the live clock.  Polls ride the
    // same clock, so the hold arithmetic sees real elapsed time.
    hw_init::sim_set_line_level(0, true);
    hw_init::sim_inject_edge(0);
    node.poll_input(time::now_ms(), 10);
    assert_eq!(node.mesh().actions(), &[MeshAction::Toggle]);

    // Mid-cycle the interrupt is masked: bounce cannot queue anything.
    hw_init::sim_inject_edge(0);
    assert!(EDGE_QUEUE.is_empty());

    node.poll_input(time::now_ms(), 20);
    hw_init::sim_set_line_level(0, false);
    node.poll_input(time::now_ms(), 30);
    node.poll_input(time::now_ms(), 40);

    // Cycle complete, interrupt re-armed: a second closure lands too.
    hw_init::sim_set_line_level(0, true);
    hw_init::sim_inject_edge(0);
    node.poll_input(time::now_ms(), 1000);
    hw_init::sim_set_line_level(0, false);
    node.poll_input(time::now_ms(), 1010);
    node.poll_input(time::now_ms(), 1020);

    assert_eq!(
        node.mesh().actions(),
        &[MeshAction::Toggle, MeshAction::Toggle]
    );
    assert_eq!(
        node.sink()
            .count(|e| matches!(e, AppEvent::ActionDispatched { .. })),
        2
    );
}

#[test]
fn held_switch_toggles_first_then_resets() {
    let _guard = lock_sim();
    let mut node = node_for(DeviceRole::Switch);

    // The press action goes out immediately; the reset arms later, once
    // the same closure has been held for the full threshold.
    press_at(0);
    let mut t = 10u32;
    while t <= 3200 {
        node.poll_input(t, u64::from(t));
        t += 10;
    }
    release_at(&mut node, t);

    assert_eq!(node.mesh().actions(), &[MeshAction::Toggle]);
    assert_eq!(node.mesh().factory_resets(), 1);
    assert_eq!(
        node.sink()
            .count(|e| matches!(e, AppEvent::FactoryResetArmed { .. })),
        1
    );
}

#[test]
fn sensor_button_report_restarts_the_cadence() {
    let _guard = lock_sim();
    let mut node = node_for(DeviceRole::TemperatureSensor);
    sim_set_celsius(22.5);

    // Operator taps the button: the reading goes out right away, well
    // inside the suppression window.
    press_at(200);
    node.poll_input(210, 210);
    release_at(&mut node, 220);
    assert_eq!(node.mesh().reports(), &[22.5]);

    // The forced report restarted the window: the next sample is still
    // suppressed even though a delta-sized move happened.
    sim_set_celsius(21.0);
    node.poll_telemetry(1000);
    assert_eq!(node.mesh().reports(), &[22.5]);

    // Once the window reopens the pending delta reports.
    node.poll_telemetry(2000);
    assert_eq!(node.mesh().reports(), &[22.5, 21.0]);
    assert_eq!(
        node.sink().count(|e| matches!(e, AppEvent::ReportSent { .. })),
        2
    );
}

#[test]
fn thermostat_query_answers_through_the_notice_channel() {
    let _guard = lock_sim();
    let mut node = node_for(DeviceRole::Thermostat);
    node.mesh_mut().on_sensor_config(sensor_config_forwarded);
    node.mesh_mut().sim_set_remote_sensor_config(5.0, 35.0, 0.5);

    // Button tap → settings query → stack callback → notice channel.
    press_at(0);
    node.poll_input(10, 10);
    release_at(&mut node, 20);

    // The link task drains the notice into the event stream.
    node.poll_link();
    let received = node
        .sink()
        .events
        .iter()
        .find_map(|e| match e {
            AppEvent::SensorConfigReceived {
                min_c,
                max_c,
                tolerance_c,
            } => Some((*min_c, *max_c, *tolerance_c)),
            _ => None,
        })
        .expect("no sensor config event");
    assert_eq!(received, (5.0, 35.0, 0.5));
}

#[test]
fn light_follows_mesh_commands_through_the_fade() {
    let _guard = lock_sim();
    let mut node = node_for(DeviceRole::Light);
    node.mesh_mut().on_light_change(light_changed);
    node.mesh_mut().on_identify(identify_requested);

    // Remote "on": the fade walks the full range, one count per tick.
    node.mesh().sim_receive_light_command(true);
    let mut ticks = 0;
    while node.tick_fade() {
        ticks += 1;
        assert!(ticks <= 255, "fade overran");
    }
    assert_eq!(ticks, 255);
    assert_eq!(node.led().last(), Some(COLOUR_ON));

    // Identify blinks by overriding the target, then puts "on" back.
    node.mesh().sim_receive_identify(1);
    node.tick_identify();
    assert_eq!(LIGHT.target(), COLOUR_IDENTIFY);
    node.tick_identify();
    assert_eq!(LIGHT.target(), COLOUR_OFF);
    node.tick_identify();
    assert_eq!(LIGHT.target(), COLOUR_ON);

    // Remote "off" fades back down to black.
    node.mesh().sim_receive_light_command(false);
    ticks = 0;
    while node.tick_fade() {
        ticks += 1;
        assert!(ticks <= 255, "fade overran");
    }
    assert_eq!(node.led().last(), Some(COLOUR_OFF));
}
