//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! A future mesh-telemetry adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(role) => {
                info!("START | role={:?}", role);
            }
            AppEvent::ActionDispatched { line, action } => {
                info!("INPUT | line={} action={:?}", line, action);
            }
            AppEvent::FactoryResetArmed { line } => {
                warn!("RESET | line={} held past threshold, factory reset armed", line);
            }
            AppEvent::ReportSent { celsius } => {
                info!("TELEM | T={:.1}\u{00b0}C reported", celsius);
            }
            AppEvent::MeshStateChanged { connected, bound } => {
                info!("MESH  | connected={} bound={}", connected, bound);
            }
            AppEvent::EdgesDropped { count } => {
                warn!("QUEUE | {} edge events dropped, consumer falling behind", count);
            }
            AppEvent::SensorConfigReceived {
                min_c,
                max_c,
                tolerance_c,
            } => {
                info!(
                    "CONFIG | sensor envelope {:.1}..{:.1}\u{00b0}C tolerance={:.1}",
                    min_c, max_c, tolerance_c
                );
            }
        }
    }
}
