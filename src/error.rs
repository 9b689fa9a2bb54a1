//! Unified error types for the meshnode firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! top-level startup path's error handling uniform.  All variants are `Copy`
//! so they can be cheaply passed between tasks without allocation.  Port
//! errors with richer payloads (`ConfigError`, `StorageError`) live next to
//! their traits in [`crate::app::ports`].

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The mesh stack failed to start or rejected a call.
    Mesh(MeshError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mesh(e) => write!(f, "mesh: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Mesh stack errors
// ---------------------------------------------------------------------------

/// Failures surfaced by the mesh collaborator behind
/// [`MeshPort`](crate::app::ports::MeshPort).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshError {
    /// The stack refused to start.  Fatal; the caller should restart the
    /// device rather than run an unjoined node.
    StackStartFailed,
    /// An endpoint could not be registered before startup.
    EndpointRejected,
    /// A call required a joined network and the node is not connected.
    NotConnected,
    /// Writing a cluster attribute (e.g. measured temperature) failed.
    AttributeWriteFailed,
    /// Sending a bound-cluster command failed.
    CommandSendFailed,
    /// A read/query of a bound device's settings failed.
    QueryFailed,
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackStartFailed => write!(f, "stack start failed"),
            Self::EndpointRejected => write!(f, "endpoint rejected"),
            Self::NotConnected => write!(f, "not connected"),
            Self::AttributeWriteFailed => write!(f, "attribute write failed"),
            Self::CommandSendFailed => write!(f, "command send failed"),
            Self::QueryFailed => write!(f, "query failed"),
        }
    }
}

impl From<MeshError> for Error {
    fn from(e: MeshError) -> Self {
        Self::Mesh(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
