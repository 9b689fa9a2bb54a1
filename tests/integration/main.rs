//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! through the public crate API, against the host simulation adapters.
//! ESP32 builds compile this binary out: the simulation hooks the tests
//! drive only exist on the host.

#![cfg(not(target_os = "espidf"))]

mod config_flow_tests;
mod mesh_lifecycle_tests;
mod mock_hw;
mod node_flow_tests;
