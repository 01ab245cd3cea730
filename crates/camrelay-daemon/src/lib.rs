//! camrelay Daemon Library
//!
//! The relay supervisor and its building blocks:
//! - Readiness wait for the RTMP ingest endpoint
//! - Capture backend detection
//! - Capture -> publish pipeline launch and supervision
//! - Signal-driven shutdown
//! - Optional HTTP stats endpoint

pub mod backend;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod readiness;
pub mod shutdown;
pub mod stats;
pub mod supervisor;

pub use backend::{CaptureBackend, SearchPath, ToolLocator, detect_capture_backend};
pub use error::SupervisorError;
pub use pipeline::{PipelineHandle, PipelineSpec, Role};
pub use readiness::{EndpointProbe, RetryState, TcpProbe, WaitOutcome, wait_for_endpoint};
pub use supervisor::{Supervisor, SupervisorOptions, SupervisorState};
