//! Outbound application events.
//!
//! The periodic tasks emit these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them — today they become structured log
//! lines; a diagnostics cluster could subscribe later.

use super::dispatch::DispatchAction;
use crate::config::DeviceRole;

/// Structured events emitted by the tasks.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The node finished startup (carries the configured role).
    Started(DeviceRole),

    /// A gesture on `line` was dispatched to an action.
    ActionDispatched { line: u8, action: DispatchAction },

    /// The factory-reset hold threshold was crossed.
    FactoryResetArmed { line: u8 },

    /// The reporting policy accepted a sample.
    ReportSent { celsius: f32 },

    /// Network readiness changed.
    MeshStateChanged { connected: bool, bound: bool },

    /// Raw edges were dropped on a saturated queue since the last check.
    EdgesDropped { count: u32 },

    /// The thermostat received its bound sensor's reporting settings.
    SensorConfigReceived {
        min_c: f32,
        max_c: f32,
        tolerance_c: f32,
    },
}
