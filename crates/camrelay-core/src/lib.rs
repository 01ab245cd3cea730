//! camrelay Core Library
//!
//! Shared functionality for the relay supervisor:
//! - Stream configuration resolution (defaults, TOML file, environment, CLI)
//! - Common error types
//! - Tracing subscriber setup

pub mod config;
pub mod error;
pub mod tracing_init;

pub use config::{RTMP_PORT, StreamConfig, StreamSettings, resolve_config};
pub use error::{Error, Result};
