//! Capture -> publish pipeline.
//!
//! Two child processes joined by an OS pipe: the capture tool's stdout is
//! handed directly to the publisher's stdin, no intermediate buffer in this
//! process.

mod handle;

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use camrelay_core::StreamConfig;

use crate::backend::DetectedBackend;

pub use handle::{PipelineExit, PipelineHandle};

/// Position of a child process in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Capture,
    Publish,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Program and arguments for one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            // Children must not talk to systemd on our behalf.
            .env_remove("NOTIFY_SOCKET")
            .kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Both commands of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    pub capture: CommandSpec,
    pub publish: CommandSpec,
}

impl PipelineSpec {
    /// Capture with the detected backend, stream-copy into FLV and push to
    /// the configured RTMP target with `publish_bin` (an ffmpeg binary).
    pub fn for_backend(
        config: &StreamConfig,
        detected: &DetectedBackend,
        publish_bin: &Path,
    ) -> Self {
        let capture = CommandSpec::new(
            detected.program.clone(),
            detected.backend.capture_args(config),
        );
        let framerate = config.framerate.to_string();
        let url = config.publish_url();
        let publish = CommandSpec::new(
            publish_bin,
            [
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "h264",
                "-framerate",
                framerate.as_str(),
                "-i",
                "-",
                "-c:v",
                "copy",
                "-f",
                "flv",
                url.as_str(),
            ],
        );
        Self { capture, publish }
    }
}
