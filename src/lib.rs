//! svcwarden keeps a small set of local services alive. It launches each
//! service, watches its process and optional TCP readiness port, restarts it
//! according to its restart policy with exponential backoff, and publishes a
//! health snapshot other tools can read.

/// Exponential restart backoff.
pub mod backoff;

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Error handling.
pub mod error;

/// Spawning and terminating service processes.
pub mod launch;

/// Captured service output.
pub mod logs;

/// Liveness and readiness probes.
pub mod probe;

/// Service definitions.
pub mod spec;

/// Health snapshots and rendering.
pub mod status;

/// Service lifecycle and reconciliation.
pub mod supervisor;

#[doc(hidden)]
pub mod test_utils;
