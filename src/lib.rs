//! Mesh endpoint firmware library.
//!
//! Exposes the node logic for host-side integration tests and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module, so the whole tree
//! builds and tests on the host against the simulation backends.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod fade;
pub mod fsm;
pub mod state;
pub mod tasks;
pub mod telemetry;

mod esp_link_shims;
mod pins;

// Hardware-facing modules; the actual device implementations are guarded
// by cfg attributes inside, host builds get the simulation halves.
pub mod adapters;
pub mod drivers;
pub mod sensors;
