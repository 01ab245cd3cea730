//! Running pipeline: spawn, wait, terminate.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, info, warn};

use super::{CommandSpec, PipelineSpec, Role};
use crate::error::SupervisorError;

/// The first child to exit and how it went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineExit {
    pub role: Role,
    /// `None` if the status could not be collected.
    pub status: Option<ExitStatus>,
}

struct SupervisedChild {
    role: Role,
    child: Child,
}

impl SupervisedChild {
    fn spawn(
        role: Role,
        spec: &CommandSpec,
        mut cmd: tokio::process::Command,
    ) -> Result<Self, SupervisorError> {
        debug!(role = %role, command = %spec, "Spawning child");
        let child = cmd.spawn().map_err(|e| SupervisorError::Spawn {
            role,
            reason: format!("{}: {e}", spec.program.display()),
        })?;
        info!(role = %role, pid = ?child.id(), "Child started");
        Ok(Self { role, child })
    }

    async fn wait(&mut self) -> PipelineExit {
        let status = match self.child.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(role = %self.role, error = %e, "Failed to collect exit status");
                None
            }
        };
        PipelineExit {
            role: self.role,
            status,
        }
    }

    /// Send SIGTERM if the child has not been reaped yet.
    fn request_terminate(&self) {
        let Some(pid) = self.child.id() else {
            return;
        };
        debug!(role = %self.role, pid, "Sending SIGTERM");
        #[cfg(unix)]
        {
            // SAFETY: pid comes from our own, not yet reaped Child handle, so
            // it cannot refer to a recycled process.
            #[allow(unsafe_code)]
            #[allow(clippy::cast_possible_wrap)]
            let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
            if ret != 0 {
                let err = std::io::Error::last_os_error();
                warn!(role = %self.role, pid, error = %err, "Failed to send SIGTERM");
            }
        }
    }

    /// Wait up to `grace` for the child to exit, then SIGKILL it.
    async fn reap(&mut self, grace: Duration) {
        let role = self.role;
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => info!(role = %role, %status, "Child exited"),
            Ok(Err(e)) => {
                warn!(role = %role, error = %e, "Error waiting for child, killing");
                self.child.kill().await.ok();
            }
            Err(_) => {
                warn!(role = %role, grace_ms = grace.as_millis(), "Child ignored SIGTERM, killing");
                self.child.kill().await.ok();
            }
        }
    }
}

/// The running capture and publish processes.
///
/// Both children are owned exclusively by the handle and are killed if it
/// is dropped without [`PipelineHandle::shutdown`].
pub struct PipelineHandle {
    capture: SupervisedChild,
    publish: SupervisedChild,
}

impl PipelineHandle {
    /// Spawn both children with capture stdout piped into publish stdin.
    ///
    /// Capture diagnostics are discarded; publish stderr is inherited so
    /// its error lines reach the service log.
    pub fn start(spec: &PipelineSpec) -> Result<Self, SupervisorError> {
        let mut capture_cmd = spec.capture.to_command();
        capture_cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let mut capture = SupervisedChild::spawn(Role::Capture, &spec.capture, capture_cmd)?;

        let handover = capture
            .child
            .stdout
            .take()
            .map(|out| -> std::io::Result<Stdio> { out.try_into() });
        let stream = match handover {
            Some(Ok(stdio)) => stdio,
            Some(Err(e)) => {
                capture.child.start_kill().ok();
                return Err(SupervisorError::Spawn {
                    role: Role::Publish,
                    reason: format!("failed to hand over capture stdout: {e}"),
                });
            }
            None => {
                capture.child.start_kill().ok();
                return Err(SupervisorError::Spawn {
                    role: Role::Capture,
                    reason: "capture stdout was not piped".into(),
                });
            }
        };

        let mut publish_cmd = spec.publish.to_command();
        publish_cmd
            .stdin(stream)
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        let publish = match SupervisedChild::spawn(Role::Publish, &spec.publish, publish_cmd) {
            Ok(publish) => publish,
            Err(e) => {
                capture.child.start_kill().ok();
                return Err(e);
            }
        };

        Ok(Self { capture, publish })
    }

    /// OS process id of a child, `None` once it has been reaped.
    pub fn pid(&self, role: Role) -> Option<u32> {
        match role {
            Role::Capture => self.capture.child.id(),
            Role::Publish => self.publish.child.id(),
        }
    }

    /// Wait until either child exits.
    ///
    /// Cancel-safe: dropping the future leaves both children running.
    pub async fn wait(&mut self) -> PipelineExit {
        let Self { capture, publish } = self;
        tokio::select! {
            exit = capture.wait() => exit,
            exit = publish.wait() => exit,
        }
    }

    /// Ask both children to terminate and reap them, force-killing any that
    /// outlive `grace`.
    pub async fn shutdown(&mut self, grace: Duration) {
        self.capture.request_terminate();
        self.publish.request_terminate();
        let Self { capture, publish } = self;
        tokio::join!(capture.reap(grace), publish.reap(grace));
    }
}
