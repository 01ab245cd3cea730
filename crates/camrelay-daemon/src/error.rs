//! Supervisor error types.
//!
//! Every variant is fatal for the current process: the binary logs it and
//! exits with status 1, leaving restarts to the service manager.

use std::process::ExitStatus;

use crate::pipeline::Role;

/// Errors that end a supervisor run.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("RTMP endpoint {host}:{port} unreachable after {attempts} attempts")]
    EndpointUnreachable {
        host: String,
        port: u16,
        attempts: u32,
    },

    #[error("No supported capture backend found on PATH (looked for: {searched})")]
    NoCaptureBackend { searched: String },

    #[error("{role} process terminated unexpectedly ({})", describe_status(.status.as_ref()))]
    PipelineTerminatedUnexpectedly {
        role: Role,
        status: Option<ExitStatus>,
    },

    #[error("Failed to spawn {role} process: {reason}")]
    Spawn { role: Role, reason: String },

    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

fn describe_status(status: Option<&ExitStatus>) -> String {
    status.map_or_else(|| "status unknown".to_string(), ToString::to_string)
}
