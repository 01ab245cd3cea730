//! The relay supervisor.
//!
//! One capture-to-publish session per process lifetime:
//!
//! ```text
//! Init -> WaitingForEndpoint -> DetectingBackend -> Streaming -> Stopping
//! ```
//!
//! Every failure is returned as a [`SupervisorError`] and is meant to end
//! the process with status 1; only a shutdown request ends a run with
//! `Ok(())`. Nothing is restarted in-process.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use camrelay_core::StreamConfig;

use crate::backend::{SearchPath, ToolLocator, detect_capture_backend};
use crate::error::SupervisorError;
use crate::notify;
use crate::pipeline::{PipelineExit, PipelineHandle, PipelineSpec};
use crate::readiness::{EndpointProbe, RetryState, TcpProbe, WaitOutcome, wait_for_endpoint};
use crate::shutdown;

/// Lifecycle state, published to observers such as the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Init,
    WaitingForEndpoint,
    DetectingBackend,
    Streaming,
    Stopping,
}

impl SupervisorState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::WaitingForEndpoint => "waiting_for_endpoint",
            Self::DetectingBackend => "detecting_backend",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables that are not part of the stream itself.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Readiness wait budget and interval.
    pub retry: RetryState,
    /// Per-probe TCP connect timeout.
    pub probe_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL for each child.
    pub terminate_timeout: Duration,
    /// ffmpeg binary used as the publisher.
    pub publish_bin: PathBuf,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            retry: RetryState::default(),
            probe_timeout: Duration::from_secs(2),
            terminate_timeout: Duration::from_secs(5),
            publish_bin: PathBuf::from("ffmpeg"),
        }
    }
}

/// How the streaming phase ended.
enum StreamEnd {
    Exited(PipelineExit),
    ShutdownRequested,
}

/// Orchestrates one relay session.
pub struct Supervisor<P = TcpProbe, L = SearchPath> {
    config: StreamConfig,
    options: SupervisorOptions,
    probe: P,
    locator: L,
    state: watch::Sender<SupervisorState>,
}

impl Supervisor {
    /// Supervisor with a TCP probe and `PATH` lookup.
    pub fn new(config: StreamConfig, options: SupervisorOptions) -> Self {
        let probe = TcpProbe::new(options.probe_timeout);
        Self::with_parts(config, options, probe, SearchPath::from_env())
    }
}

impl<P: EndpointProbe, L: ToolLocator> Supervisor<P, L> {
    /// Supervisor with explicit probe and tool lookup strategies.
    pub fn with_parts(
        config: StreamConfig,
        options: SupervisorOptions,
        probe: P,
        locator: L,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Init);
        Self {
            config,
            options,
            probe,
            locator,
            state,
        }
    }

    pub const fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Observe state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    fn set_state(&self, next: SupervisorState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "Supervisor state changed");
            notify::status(next.as_str());
        }
    }

    /// Run the whole session until shutdown or the first fatal error.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), SupervisorError> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            url = %self.config.publish_url(),
            resolution = %self.config.resolution(),
            framerate = self.config.framerate,
            "Starting camrelay supervisor"
        );

        self.set_state(SupervisorState::WaitingForEndpoint);
        let mut retry = self.options.retry.clone();
        let outcome =
            wait_for_endpoint(&self.config, &mut retry, &self.probe, &mut shutdown).await?;
        if outcome == WaitOutcome::ShutdownRequested {
            self.set_state(SupervisorState::Stopping);
            return Ok(());
        }

        self.set_state(SupervisorState::DetectingBackend);
        let detected = detect_capture_backend(&self.locator)?;
        if *shutdown.borrow() {
            self.set_state(SupervisorState::Stopping);
            return Ok(());
        }

        let spec = PipelineSpec::for_backend(&self.config, &detected, &self.options.publish_bin);
        self.stream(&spec, &mut shutdown).await
    }

    /// Launch `spec` and supervise it in the foreground.
    ///
    /// Returns `Ok(())` after a shutdown request has stopped both children,
    /// or [`SupervisorError::PipelineTerminatedUnexpectedly`] once either
    /// child exits on its own (the survivor is terminated first).
    pub async fn stream(
        &self,
        spec: &PipelineSpec,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), SupervisorError> {
        let mut pipeline = PipelineHandle::start(spec)?;
        self.set_state(SupervisorState::Streaming);
        notify::ready();
        info!(url = %self.config.publish_url(), "Streaming");

        let end = tokio::select! {
            exit = pipeline.wait() => StreamEnd::Exited(exit),
            () = shutdown::requested(shutdown) => StreamEnd::ShutdownRequested,
        };

        let grace = self.options.terminate_timeout;
        match end {
            StreamEnd::ShutdownRequested => {
                self.set_state(SupervisorState::Stopping);
                notify::stopping();
                pipeline.shutdown(grace).await;
                info!("Pipeline stopped");
                Ok(())
            }
            StreamEnd::Exited(PipelineExit { role, status }) => {
                error!(role = %role, status = ?status, "Pipeline terminated unexpectedly");
                self.set_state(SupervisorState::Stopping);
                pipeline.shutdown(grace).await;
                Err(SupervisorError::PipelineTerminatedUnexpectedly { role, status })
            }
        }
    }
}
