//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ tasks (domain)
//! ```
//!
//! Driven adapters (mesh stack, LED driver, event sinks, storage)
//! implement these traits.  The periodic tasks consume them via generics,
//! so the domain core never touches the radio or hardware directly.
//!
//! ## Notes for implementors
//!
//! - **MeshPort** callbacks are invoked from the stack's own task.  The
//!   registered functions must be short and non-blocking: an atomic store
//!   into a state cell, nothing more.
//! - **ConfigPort** implementations MUST validate before persisting.
//! - All port errors are typed — callers must handle every variant explicitly.

use crate::config::NodeConfig;
use crate::fade::Color;

// Surfaced here so implementors import the trait and its error together.
pub use crate::error::MeshError;

// ───────────────────────────────────────────────────────────────
// Mesh port (driven adapter: domain ↔ mesh stack)
// ───────────────────────────────────────────────────────────────

/// Logical device role registered as a mesh endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EndpointRole {
    /// Dimmable light: receives on/off and identify.
    Light,
    /// Push-button switch: sends bound-cluster commands.
    Switch,
    /// Temperature sensor with its advertised measurement envelope.
    TemperatureSensor {
        min_c: f32,
        max_c: f32,
        tolerance_c: f32,
    },
    /// Thermostat: binds to a remote temperature sensor.
    Thermostat,
}

/// How the node participates in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshMode {
    /// Mains-powered, routes traffic (light, switch, thermostat).
    Router,
    /// Sleepy leaf node (battery sensor).
    EndDevice,
}

/// Bound-cluster command a switch endpoint can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshAction {
    On,
    Off,
    Toggle,
    LevelUp,
    LevelDown,
    LevelCycle,
    ColourCycle,
}

/// The narrow contract with the mesh collaborator.
///
/// Startup order matters: device info, endpoints and callbacks are set
/// before [`begin`](MeshPort::begin); after that the stack owns its
/// configuration and the core only reports, sends and polls.
pub trait MeshPort {
    /// Advertised manufacturer and model strings.
    fn set_device_info(&mut self, manufacturer: &str, model: &str);

    /// Register a logical device role before startup.  Consumed once per
    /// endpoint at init.
    fn add_endpoint(&mut self, id: u8, role: EndpointRole) -> Result<(), MeshError>;

    /// Start mesh participation.  Failure is fatal: the caller logs and
    /// restarts the device rather than running unjoined.
    fn begin(&mut self, mode: MeshMode) -> Result<(), MeshError>;

    /// Joined a network.  Polled; the core spin-waits on this before
    /// starting periodic tasks.
    fn connected(&self) -> bool;

    /// At least one remote endpoint is bound to ours.  Polled by the
    /// link task (never a blocking wait).
    fn bound(&self) -> bool;

    /// Write and report the measured temperature attribute.
    fn report_temperature(&mut self, celsius: f32) -> Result<(), MeshError>;

    /// Send a bound-cluster command from the switch endpoint.
    fn send_action(&mut self, action: MeshAction) -> Result<(), MeshError>;

    /// Ask the bound sensor for its reporting settings; the reply arrives
    /// through the sensor-config callback.
    fn query_sensor_settings(&mut self) -> Result<(), MeshError>;

    /// Log the devices currently bound to our endpoint.
    fn log_bound_devices(&self);

    /// De-provision from the network.  Irreversible; on the device this
    /// reboots and does not return.
    fn factory_reset(&mut self);

    /// Register the light on/off callback.  Runs in stack context; the
    /// body may only set the target colour.
    fn on_light_change(&mut self, callback: fn(bool));

    /// Register the identify callback (duration in seconds).  Runs in
    /// stack context; the body may only store the duration.
    fn on_identify(&mut self, callback: fn(u16));

    /// Register the thermostat's sensor-config callback
    /// `(min_c, max_c, tolerance_c)`.  Runs in stack context.
    fn on_sensor_config(&mut self, callback: fn(f32, f32, f32));
}

// ───────────────────────────────────────────────────────────────
// LED port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port for the RGB output.  The fade task is the only caller.
pub trait LedPort {
    fn set_rgb(&mut self, colour: Color);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The tasks emit structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log today;
/// a mesh diagnostics cluster would slot in here).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists node configuration.
///
/// Implementations MUST validate values before persisting.  Invalid
/// ranges are rejected with [`ConfigError::ValidationFailed`], not
/// silently clamped — a both-intervals-zero report policy must never
/// reach the sampling loop.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`NodeConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<NodeConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for config blobs and crash logs.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic — no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; in-memory simulation
///   achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
