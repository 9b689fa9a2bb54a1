//! Hardware initialisation, peripheral helpers, and system plumbing.

pub mod hw_init;
pub mod task_spawn;
pub mod watchdog;
