//! camrelay
//!
//! Waits for an RTMP ingest server, then relays the local camera to it
//! through a capture -> ffmpeg pipeline until SIGINT/SIGTERM. Any failure
//! exits with status 1 so the service manager can restart the unit.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use camrelay_core::config::Bitrate;
use camrelay_core::tracing_init::{default_filter, init_tracing};
use camrelay_core::{StreamSettings, resolve_config};
use camrelay_daemon::readiness::RetryState;
use camrelay_daemon::stats::{self, StatsState};
use camrelay_daemon::{Supervisor, SupervisorOptions, shutdown};

#[derive(Parser, Debug)]
#[command(name = "camrelay")]
#[command(version, about = "Relay a local camera to an RTMP ingest server")]
struct Args {
    /// Optional TOML file with stream settings (overridden by env and flags).
    #[arg(long, env = "CAMRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// RTMP ingest host (env: `CAMRELAY_INGEST_HOST`, default localhost).
    #[arg(long)]
    ingest_host: Option<String>,

    /// Capture width in pixels (env: `CAMRELAY_WIDTH`, default 1280).
    #[arg(long)]
    width: Option<u32>,

    /// Capture height in pixels (env: `CAMRELAY_HEIGHT`, default 720).
    #[arg(long)]
    height: Option<u32>,

    /// Capture framerate (env: `CAMRELAY_FRAMERATE`, default 30).
    #[arg(long)]
    framerate: Option<u32>,

    /// RTMP application/stream path (env: `CAMRELAY_STREAM_PATH`, default live/stream).
    #[arg(long)]
    stream_path: Option<String>,

    /// Encoder bitrate, e.g. 2M or 500k (env: `CAMRELAY_BITRATE`).
    #[arg(long)]
    bitrate: Option<Bitrate>,

    /// Keyframe interval in frames (env: `CAMRELAY_INTRA_PERIOD`, default 2 x framerate).
    #[arg(long)]
    intra_period: Option<u32>,

    /// ffmpeg binary used to publish the stream.
    #[arg(long, default_value = "ffmpeg", env = "CAMRELAY_PUBLISH_BIN")]
    publish_bin: PathBuf,

    /// Readiness probes before giving up on the ingest server.
    #[arg(long, default_value_t = 120, env = "CAMRELAY_MAX_ATTEMPTS")]
    max_attempts: u32,

    /// Seconds between readiness probes.
    #[arg(long, default_value_t = 2, env = "CAMRELAY_RETRY_INTERVAL")]
    retry_interval: u64,

    /// TCP connect timeout per readiness probe, in seconds.
    #[arg(long, default_value_t = 2, env = "CAMRELAY_PROBE_TIMEOUT")]
    probe_timeout: u64,

    /// Seconds to wait for graceful child shutdown before SIGKILL.
    #[arg(long, default_value_t = 5, env = "CAMRELAY_TERMINATE_TIMEOUT")]
    terminate_timeout: u64,

    /// Serve `/live/stats` on this address (disabled when unset).
    #[arg(long, env = "CAMRELAY_STATS_ADDR")]
    stats_addr: Option<SocketAddr>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "CAMRELAY_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON.
    #[arg(long, env = "CAMRELAY_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            ingest_host: self.ingest_host.clone(),
            width: self.width,
            height: self.height,
            framerate: self.framerate,
            stream_path: self.stream_path.clone(),
            bitrate: self.bitrate,
            intra_period: self.intra_period,
        }
    }

    fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            retry: RetryState::new(self.max_attempts, Duration::from_secs(self.retry_interval)),
            probe_timeout: Duration::from_secs(self.probe_timeout),
            terminate_timeout: Duration::from_secs(self.terminate_timeout),
            publish_bin: self.publish_bin.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&default_filter(&args.log_level), args.log_json);

    match run(args).await {
        Ok(()) => {
            info!("camrelay stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "camrelay exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = resolve_config(args.config.as_deref(), args.stream_settings())?;
    let supervisor = Supervisor::new(config, args.supervisor_options());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let signal_handle = shutdown::spawn_signal_listener(shutdown_tx)?;

    let stats_handle = match args.stats_addr {
        Some(addr) => {
            let state = StatsState::new(supervisor.config(), supervisor.subscribe_state());
            Some(stats::serve(addr, state, shutdown_rx.clone()).await?)
        }
        None => None,
    };

    let result = supervisor.run(shutdown_rx).await;

    // The stats endpoint lives exactly as long as the supervisor.
    signal_handle.abort();
    if let Some(handle) = stats_handle {
        handle.abort();
        let _ = handle.await;
    }

    result.map_err(Into::into)
}
