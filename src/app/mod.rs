//! Application core — pure domain logic, zero I/O.
//!
//! Business rules for the mesh endpoint: gesture-to-action dispatch and
//! the structured events the tasks emit.  All interaction with the mesh
//! stack, LEDs and storage happens through **port traits** defined in
//! [`ports`], keeping this layer fully testable without real peripherals
//! or a radio.

pub mod dispatch;
pub mod events;
pub mod ports;
