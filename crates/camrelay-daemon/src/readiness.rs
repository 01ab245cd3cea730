//! Readiness wait for the RTMP ingest endpoint.
//!
//! Polls TCP reachability at a fixed interval with a bounded attempt budget.
//! Refused connections, timeouts and resolution failures all count as the
//! same "not present" outcome.

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info};

use camrelay_core::StreamConfig;

use crate::error::SupervisorError;
use crate::shutdown;

/// A progress line is logged on every Nth failed attempt.
pub const PROGRESS_EVERY: u32 = 5;

/// Retry bookkeeping for one readiness wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Failed probes so far.
    pub attempts: u32,
    /// Attempt budget; the wait fails once `attempts` reaches it.
    pub max: u32,
    /// Fixed delay between probes.
    pub interval: Duration,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new(120, Duration::from_secs(2))
    }
}

/// What the caller should do after a failed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedAttempt {
    /// 1-based number of this failure.
    pub number: u32,
    /// Whether a progress notification is due.
    pub report: bool,
    /// Whether the budget is spent.
    pub exhausted: bool,
}

impl RetryState {
    pub const fn new(max: u32, interval: Duration) -> Self {
        Self {
            attempts: 0,
            max,
            interval,
        }
    }

    /// Record one failed probe.
    pub const fn record_failure(&mut self) -> FailedAttempt {
        self.attempts = self.attempts.saturating_add(1);
        FailedAttempt {
            number: self.attempts,
            report: self.attempts % PROGRESS_EVERY == 0,
            exhausted: self.attempts >= self.max,
        }
    }
}

/// A reachability check against `host:port`.
pub trait EndpointProbe: Send + Sync {
    fn probe(&self, host: &str, port: u16) -> impl Future<Output = bool> + Send;
}

/// Plain TCP connect probe; the connection is dropped immediately.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl EndpointProbe for TcpProbe {
    async fn probe(&self, host: &str, port: u16) -> bool {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(host, port, error = %e, "Probe failed");
                false
            }
            Err(_) => {
                debug!(host, port, "Probe timed out");
                false
            }
        }
    }
}

/// How a readiness wait ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A probe succeeded.
    Ready,
    /// Shutdown was requested while waiting.
    ShutdownRequested,
}

/// Block until the ingest endpoint accepts TCP connections.
///
/// Returns [`WaitOutcome::Ready`] as soon as one probe succeeds, no matter
/// how many failed before, and fails with
/// [`SupervisorError::EndpointUnreachable`] once `retry.max` consecutive
/// probes have failed. The sleep between probes is cut short by `shutdown`.
pub async fn wait_for_endpoint<P: EndpointProbe>(
    config: &StreamConfig,
    retry: &mut RetryState,
    probe: &P,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<WaitOutcome, SupervisorError> {
    let host = config.ingest_host.as_str();
    let port = config.ingest_port;

    loop {
        if *shutdown.borrow() {
            return Ok(WaitOutcome::ShutdownRequested);
        }
        if probe.probe(host, port).await {
            info!(host, port, attempts = retry.attempts, "RTMP endpoint is reachable");
            return Ok(WaitOutcome::Ready);
        }

        let attempt = retry.record_failure();
        if attempt.report {
            info!(
                host,
                port,
                attempt = attempt.number,
                max = retry.max,
                "RTMP endpoint not present yet, still waiting"
            );
        }
        if attempt.exhausted {
            error!(host, port, attempts = attempt.number, "Giving up on RTMP endpoint");
            return Err(SupervisorError::EndpointUnreachable {
                host: host.to_string(),
                port,
                attempts: attempt.number,
            });
        }

        tokio::select! {
            () = tokio::time::sleep(retry.interval) => {}
            () = shutdown::requested(shutdown) => {
                info!("Shutdown requested while waiting for RTMP endpoint");
                return Ok(WaitOutcome::ShutdownRequested);
            }
        }
    }
}
