//! Sensor subsystem.
//!
//! A mesh node carries exactly one measurement source: the chip's internal
//! temperature sensor, sampled by the telemetry task on nodes configured
//! for the sensor role.

pub mod temperature;
