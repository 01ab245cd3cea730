//! Stream configuration resolution.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Optional TOML config file
//! 3. Environment variables (`CAMRELAY_*`)
//! 4. CLI arguments (highest priority)
//!
//! The result is an immutable [`StreamConfig`] that is validated once at
//! startup and never mutated afterwards.

use std::net::Ipv6Addr;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Well-known RTMP control port. The ingest port is not configurable.
pub const RTMP_PORT: u16 = 1935;

pub const DEFAULT_INGEST_HOST: &str = "localhost";
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_FRAMERATE: u32 = 30;
pub const DEFAULT_STREAM_PATH: &str = "live/stream";

pub const ENV_INGEST_HOST: &str = "CAMRELAY_INGEST_HOST";
pub const ENV_WIDTH: &str = "CAMRELAY_WIDTH";
pub const ENV_HEIGHT: &str = "CAMRELAY_HEIGHT";
pub const ENV_FRAMERATE: &str = "CAMRELAY_FRAMERATE";
pub const ENV_STREAM_PATH: &str = "CAMRELAY_STREAM_PATH";
pub const ENV_BITRATE: &str = "CAMRELAY_BITRATE";
pub const ENV_INTRA_PERIOD: &str = "CAMRELAY_INTRA_PERIOD";

/// Fully resolved stream configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// RTMP ingest server hostname or IP, IPv6 literals without brackets.
    pub ingest_host: String,
    /// RTMP ingest port. Always [`RTMP_PORT`] outside of tests.
    pub ingest_port: u16,
    /// Capture width in pixels.
    pub width: u32,
    /// Capture height in pixels.
    pub height: u32,
    /// Capture frames per second.
    pub framerate: u32,
    /// RTMP application/stream key path, without leading or trailing `/`.
    pub stream_path: String,
    /// Target encoder bitrate in bits per second (`None` = encoder default).
    pub bitrate: Option<u32>,
    /// Keyframe interval in frames (`None` = two seconds of video).
    pub intra_period: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ingest_host: DEFAULT_INGEST_HOST.to_string(),
            ingest_port: RTMP_PORT,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            framerate: DEFAULT_FRAMERATE,
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            bitrate: None,
            intra_period: None,
        }
    }
}

impl StreamConfig {
    /// Publish target, e.g. `rtmp://cam1:1935/live/cat`.
    ///
    /// IPv6 literals are bracketed: `rtmp://[fd00::5]:1935/live/cat`.
    pub fn publish_url(&self) -> String {
        format!("rtmp://{}/{}", self.authority(), self.stream_path)
    }

    /// `host:port` as written in a URL.
    pub fn authority(&self) -> String {
        if self.ingest_host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.ingest_host, self.ingest_port)
        } else {
            format!("{}:{}", self.ingest_host, self.ingest_port)
        }
    }

    /// Effective keyframe interval in frames.
    pub const fn effective_intra_period(&self) -> u32 {
        match self.intra_period {
            Some(frames) => frames,
            None => self.framerate.saturating_mul(2),
        }
    }

    /// `WIDTHxHEIGHT`, as shown in logs and the stats endpoint.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Encoder bitrate in bits per second.
///
/// Parses plain integers (`2500000`) and the `k`/`M` shorthands (`500k`,
/// `2M`). Zero is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawBitrate")]
pub struct Bitrate(u32);

impl Bitrate {
    pub const fn bits_per_second(self) -> u32 {
        self.0
    }
}

impl FromStr for Bitrate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (digits, multiplier) = match trimmed.chars().last() {
            Some('k' | 'K') => (&trimmed[..trimmed.len() - 1], 1_000_u64),
            Some('m' | 'M') => (&trimmed[..trimmed.len() - 1], 1_000_000_u64),
            _ => (trimmed, 1_u64),
        };
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid bitrate {s:?}: expected e.g. 2500000, 500k or 2M"))?;
        let bits = value
            .checked_mul(multiplier)
            .and_then(|b| u32::try_from(b).ok())
            .ok_or_else(|| format!("bitrate {s:?} is too large"))?;
        if bits == 0 {
            return Err(format!("bitrate {s:?} must be positive"));
        }
        Ok(Self(bits))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBitrate {
    Bits(u64),
    Text(String),
}

impl TryFrom<RawBitrate> for Bitrate {
    type Error = String;

    fn try_from(raw: RawBitrate) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawBitrate::Bits(bits) => bits.to_string().parse(),
            RawBitrate::Text(text) => text.parse(),
        }
    }
}

/// One layer of partially specified stream settings.
///
/// Every configuration source (file, environment, CLI) produces one of
/// these; layers are merged in priority order and then turned into a
/// [`StreamConfig`] by [`StreamSettings::into_config`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamSettings {
    pub ingest_host: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub framerate: Option<u32>,
    pub stream_path: Option<String>,
    pub bitrate: Option<Bitrate>,
    pub intra_period: Option<u32>,
}

impl StreamSettings {
    /// Overlay `other` on top of `self`; values present in `other` win.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            ingest_host: other.ingest_host.or(self.ingest_host),
            width: other.width.or(self.width),
            height: other.height.or(self.height),
            framerate: other.framerate.or(self.framerate),
            stream_path: other.stream_path.or(self.stream_path),
            bitrate: other.bitrate.or(self.bitrate),
            intra_period: other.intra_period.or(self.intra_period),
        }
    }

    /// Read settings from environment-style key/value lookup.
    ///
    /// Empty values count as unset, so `CAMRELAY_WIDTH=` falls back to the
    /// next lower layer.
    pub fn from_env_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Ok(Self {
            ingest_host: get(ENV_INGEST_HOST),
            width: get(ENV_WIDTH).map(|v| parse_number(ENV_WIDTH, &v)).transpose()?,
            height: get(ENV_HEIGHT).map(|v| parse_number(ENV_HEIGHT, &v)).transpose()?,
            framerate: get(ENV_FRAMERATE)
                .map(|v| parse_number(ENV_FRAMERATE, &v))
                .transpose()?,
            stream_path: get(ENV_STREAM_PATH),
            bitrate: get(ENV_BITRATE)
                .map(|v| {
                    v.parse::<Bitrate>()
                        .map_err(|e| Error::Config(format!("{ENV_BITRATE}: {e}")))
                })
                .transpose()?,
            intra_period: get(ENV_INTRA_PERIOD)
                .map(|v| parse_number(ENV_INTRA_PERIOD, &v))
                .transpose()?,
        })
    }

    /// Load a settings layer from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply defaults and validate.
    pub fn into_config(self) -> Result<StreamConfig> {
        let ingest_host = self
            .ingest_host
            .map(|h| unbracket_ipv6(h.trim()).to_string())
            .unwrap_or_else(|| DEFAULT_INGEST_HOST.to_string());
        if ingest_host.is_empty() {
            return Err(Error::Config("ingest host must not be empty".into()));
        }

        let stream_path = self
            .stream_path
            .map(|p| p.trim().trim_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_STREAM_PATH.to_string());
        if stream_path.is_empty() {
            return Err(Error::Config("stream path must not be empty".into()));
        }

        let config = StreamConfig {
            ingest_host,
            ingest_port: RTMP_PORT,
            width: ensure_positive("width", self.width.unwrap_or(DEFAULT_WIDTH))?,
            height: ensure_positive("height", self.height.unwrap_or(DEFAULT_HEIGHT))?,
            framerate: ensure_positive(
                "framerate",
                self.framerate.unwrap_or(DEFAULT_FRAMERATE),
            )?,
            stream_path,
            bitrate: self.bitrate.map(Bitrate::bits_per_second),
            intra_period: self
                .intra_period
                .map(|n| ensure_positive("intra period", n))
                .transpose()?,
        };
        Ok(config)
    }
}

/// Resolve the stream configuration from the process environment.
///
/// `file` is an optional TOML settings file, `cli` holds values given on
/// the command line.
pub fn resolve_config(file: Option<&Path>, cli: StreamSettings) -> Result<StreamConfig> {
    resolve_with(file, |key| std::env::var(key).ok(), cli)
}

/// Like [`resolve_config`] with an explicit environment lookup.
pub fn resolve_with<F>(file: Option<&Path>, env: F, cli: StreamSettings) -> Result<StreamConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let file_layer = match file {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading config file");
            StreamSettings::from_file(path)?
        }
        None => StreamSettings::default(),
    };
    let env_layer = StreamSettings::from_env_lookup(env)?;
    file_layer.merge(env_layer).merge(cli).into_config()
}

/// `[fd00::5]` -> `fd00::5`; anything else is returned unchanged.
fn unbracket_ipv6(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .filter(|inner| inner.parse::<Ipv6Addr>().is_ok())
        .unwrap_or(host)
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a positive integer, got {value:?}")))
}

fn ensure_positive(name: &str, value: u32) -> Result<u32> {
    if value == 0 {
        return Err(Error::Config(format!("{name} must be positive")));
    }
    Ok(value)
}
