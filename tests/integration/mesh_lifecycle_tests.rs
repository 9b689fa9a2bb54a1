//! Mesh stack lifecycle against the simulation backend: startup
//! ordering, join, bind and de-provisioning, the way the binary's boot
//! sequence drives them.  Each stack instance is independent, so these
//! run without the simulation lock.

use meshnode::adapters::mesh::SimMesh;
use meshnode::app::ports::{EndpointRole, MeshAction, MeshMode, MeshPort};
use meshnode::error::MeshError;

fn join(stack: &mut SimMesh) {
    for _ in 0..8 {
        if stack.connected() {
            break;
        }
    }
    assert!(stack.connected(), "sim mesh never joined");
}

#[test]
fn begin_demands_a_registered_endpoint() {
    let mut stack = SimMesh::new();
    assert!(matches!(
        stack.begin(MeshMode::Router),
        Err(MeshError::StackStartFailed)
    ));
    stack.add_endpoint(10, EndpointRole::Light).unwrap();
    assert!(stack.begin(MeshMode::Router).is_ok());
}

#[test]
fn stack_start_failure_is_one_shot() {
    let mut stack = SimMesh::new();
    stack.add_endpoint(10, EndpointRole::Light).unwrap();
    stack.sim_fail_next_begin();
    assert!(matches!(
        stack.begin(MeshMode::Router),
        Err(MeshError::StackStartFailed)
    ));
    // The caller's answer to a failed begin is a restart; the retry
    // after it comes up again succeeds.
    assert!(stack.begin(MeshMode::Router).is_ok());
}

#[test]
fn traffic_requires_a_joined_network() {
    let mut stack = SimMesh::new();
    stack
        .add_endpoint(
            11,
            EndpointRole::TemperatureSensor {
                min_c: 10.0,
                max_c: 50.0,
                tolerance_c: 1.0,
            },
        )
        .unwrap();
    assert!(matches!(
        stack.report_temperature(21.5),
        Err(MeshError::NotConnected)
    ));

    stack.begin(MeshMode::EndDevice).unwrap();
    // Commissioning still in flight: reports keep bouncing.
    assert!(matches!(
        stack.report_temperature(21.5),
        Err(MeshError::NotConnected)
    ));

    join(&mut stack);
    stack.report_temperature(21.5).unwrap();
    assert_eq!(stack.reports(), &[21.5]);
}

#[test]
fn binding_lags_the_join() {
    let mut stack = SimMesh::new();
    stack.add_endpoint(6, EndpointRole::Thermostat).unwrap();
    stack.begin(MeshMode::Router).unwrap();
    assert!(!stack.bound());
    join(&mut stack);

    // A freshly joined node has no bindings; a peer binds shortly after.
    let mut polls = 0;
    while !stack.bound() {
        polls += 1;
        assert!(polls <= 10, "peer never bound");
    }
    assert!(polls >= 1, "bound before the join settled");
    // Once bound, it stays bound.
    assert!(stack.bound());
}

#[test]
fn factory_reset_deprovisions_for_a_fresh_join() {
    let mut stack = SimMesh::new();
    stack.add_endpoint(5, EndpointRole::Switch).unwrap();
    stack.begin(MeshMode::Router).unwrap();
    join(&mut stack);

    stack.factory_reset();
    assert_eq!(stack.factory_resets(), 1);
    assert!(!stack.connected());
    assert!(matches!(
        stack.send_action(MeshAction::Toggle),
        Err(MeshError::NotConnected)
    ));

    // After the reboot the node runs a whole new join cycle.
    stack.begin(MeshMode::Router).unwrap();
    join(&mut stack);
}

#[test]
fn endpoint_registration_is_pre_start_only() {
    let mut stack = SimMesh::new();
    stack.add_endpoint(10, EndpointRole::Light).unwrap();
    assert!(matches!(
        stack.add_endpoint(10, EndpointRole::Switch),
        Err(MeshError::EndpointRejected)
    ));
    stack.begin(MeshMode::Router).unwrap();
    // The live stack owns its endpoint table.
    assert!(matches!(
        stack.add_endpoint(11, EndpointRole::Switch),
        Err(MeshError::EndpointRejected)
    ));
}
