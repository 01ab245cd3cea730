//! Optional HTTP stats endpoint.
//!
//! `GET /live/stats` reports supervisor state, uptime, stream parameters and
//! the SoC temperature; `GET /healthz` answers `ok` while the process lives.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use camrelay_core::StreamConfig;

use crate::shutdown;
use crate::supervisor::SupervisorState;

/// Default thermal zone on Raspberry Pi OS.
pub const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Static description of the stream being relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub url: String,
    pub resolution: String,
    pub framerate: u32,
    pub bitrate: Option<u32>,
}

impl From<&StreamConfig> for StreamInfo {
    fn from(config: &StreamConfig) -> Self {
        Self {
            url: config.publish_url(),
            resolution: config.resolution(),
            framerate: config.framerate,
            bitrate: config.bitrate,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub cpu_temperature_celsius: Option<f64>,
}

/// Body of `GET /live/stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub status: SupervisorState,
    pub uptime_secs: u64,
    pub started_at_unix: u64,
    pub stream: StreamInfo,
    pub system: SystemInfo,
}

/// Shared handler state.
#[derive(Clone)]
pub struct StatsState {
    stream: Arc<StreamInfo>,
    supervisor: watch::Receiver<SupervisorState>,
    started: Instant,
    started_at_unix: u64,
    thermal_zone: Arc<PathBuf>,
}

impl StatsState {
    pub fn new(config: &StreamConfig, supervisor: watch::Receiver<SupervisorState>) -> Self {
        Self {
            stream: Arc::new(StreamInfo::from(config)),
            supervisor,
            started: Instant::now(),
            started_at_unix: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
            thermal_zone: Arc::new(PathBuf::from(DEFAULT_THERMAL_ZONE)),
        }
    }

    /// Read the temperature from a different sysfs file.
    #[must_use]
    pub fn with_thermal_zone(mut self, path: impl Into<PathBuf>) -> Self {
        self.thermal_zone = Arc::new(path.into());
        self
    }
}

pub fn build_router(state: StatsState) -> Router {
    Router::new()
        .route("/live/stats", get(stats))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn stats(State(state): State<StatsState>) -> Json<StatsResponse> {
    let status = *state.supervisor.borrow();
    Json(StatsResponse {
        status,
        uptime_secs: state.started.elapsed().as_secs(),
        started_at_unix: state.started_at_unix,
        stream: (*state.stream).clone(),
        system: SystemInfo {
            cpu_temperature_celsius: read_cpu_temperature(&state.thermal_zone).await,
        },
    })
}

async fn healthz() -> &'static str {
    "ok"
}

/// Parse a sysfs thermal zone (millidegrees Celsius).
pub async fn read_cpu_temperature(path: &std::path::Path) -> Option<f64> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    let millis: f64 = raw.trim().parse().ok()?;
    Some(millis / 1000.0)
}

/// Bind `addr` and serve the stats router until shutdown is requested.
///
/// Binding happens before this returns so a bad address fails startup.
pub async fn serve(
    addr: SocketAddr,
    state: StatsState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(addr = %local, "Stats endpoint listening on /live/stats");

    let app = build_router(state);
    Ok(tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown::requested(&mut shutdown).await })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "Stats endpoint stopped with error");
        }
    }))
}
