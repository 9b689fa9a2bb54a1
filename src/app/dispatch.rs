//! Gesture-to-action dispatch.
//!
//! Pure mapping from (input line's configured function, gesture event,
//! device role) to the action the input task should carry out.  No I/O
//! and no state: what a press does is fixed at configuration time, and
//! the long-hold factory reset applies to every line on every role.

use serde::{Deserialize, Serialize};

use super::ports::MeshAction;
use crate::config::DeviceRole;
use crate::fsm::gesture::GestureEvent;

/// Logical function assigned to an input line at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputFunction {
    /// Line participates only in the factory-reset hold (a light's boot
    /// button, for example).
    None,
    On,
    Off,
    Toggle,
    LevelUp,
    LevelDown,
    LevelCycle,
    ColourCycle,
}

/// What the input task does with a dispatched gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchAction {
    /// Send a bound-cluster command from the switch endpoint.
    Mesh(MeshAction),
    /// De-provision and reboot.  Fires at most once per press cycle.
    FactoryReset,
    /// Sensor role: push the current temperature out immediately.
    ReportNow,
    /// Thermostat role: read back the bound sensor's reporting settings
    /// and log the bound devices.
    QuerySensorSettings,
}

/// Map one gesture on one line to its action.
///
/// Presses fire the line's configured function; releases fire the
/// role-specific follow-up; a long hold always arms the factory reset.
pub fn map(
    function: InputFunction,
    event: GestureEvent,
    role: DeviceRole,
) -> Option<DispatchAction> {
    match event {
        GestureEvent::LongHold => Some(DispatchAction::FactoryReset),
        GestureEvent::Press => mesh_action(function).map(DispatchAction::Mesh),
        GestureEvent::Release => match role {
            DeviceRole::TemperatureSensor => Some(DispatchAction::ReportNow),
            DeviceRole::Thermostat => Some(DispatchAction::QuerySensorSettings),
            DeviceRole::Light | DeviceRole::Switch => None,
        },
    }
}

fn mesh_action(function: InputFunction) -> Option<MeshAction> {
    match function {
        InputFunction::None => None,
        InputFunction::On => Some(MeshAction::On),
        InputFunction::Off => Some(MeshAction::Off),
        InputFunction::Toggle => Some(MeshAction::Toggle),
        InputFunction::LevelUp => Some(MeshAction::LevelUp),
        InputFunction::LevelDown => Some(MeshAction::LevelDown),
        InputFunction::LevelCycle => Some(MeshAction::LevelCycle),
        InputFunction::ColourCycle => Some(MeshAction::ColourCycle),
    }
}
