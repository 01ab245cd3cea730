//! Capture backend detection.
//!
//! A capture backend is a host tool that reads the camera and writes an
//! encoded H.264 elementary stream to stdout. Detection walks
//! [`CaptureBackend::ALL`] in preference order and picks the first tool a
//! [`ToolLocator`] can find.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use camrelay_core::StreamConfig;

use crate::error::SupervisorError;

/// Known capture tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureBackend {
    /// `rpicam-vid` from the Raspberry Pi camera apps.
    Rpicam,
}

impl CaptureBackend {
    /// All backends, most preferred first.
    pub const ALL: &'static [Self] = &[Self::Rpicam];

    /// Executable looked up on the host.
    pub const fn program(self) -> &'static str {
        match self {
            Self::Rpicam => "rpicam-vid",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Rpicam => "rpicam",
        }
    }

    /// Arguments that make the tool stream H.264 to stdout indefinitely.
    pub fn capture_args(self, config: &StreamConfig) -> Vec<String> {
        match self {
            Self::Rpicam => {
                let mut args: Vec<String> = vec![
                    // Run until killed.
                    "-t".into(),
                    "0".into(),
                    "--width".into(),
                    config.width.to_string(),
                    "--height".into(),
                    config.height.to_string(),
                    "--framerate".into(),
                    config.framerate.to_string(),
                    "--codec".into(),
                    "h264".into(),
                    // Repeat SPS/PPS on every keyframe for late joiners.
                    "--inline".into(),
                    "--intra".into(),
                    config.effective_intra_period().to_string(),
                ];
                if let Some(bitrate) = config.bitrate {
                    args.push("--bitrate".into());
                    args.push(bitrate.to_string());
                }
                args.extend(
                    ["--flush", "--nopreview", "-o", "-"]
                        .into_iter()
                        .map(String::from),
                );
                args
            }
        }
    }
}

impl fmt::Display for CaptureBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A backend together with the executable that was found for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedBackend {
    pub backend: CaptureBackend,
    pub program: PathBuf,
}

/// Finds executables on the host.
pub trait ToolLocator {
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// `which`-style lookup over a list of directories.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            dirs: dirs.into_iter().collect(),
        }
    }

    /// Split a `PATH`-style value.
    pub fn from_path_var(value: &OsStr) -> Self {
        Self::new(std::env::split_paths(value))
    }

    /// Use the current process `PATH`.
    pub fn from_env() -> Self {
        std::env::var_os("PATH").map_or_else(Self::default, |p| Self::from_path_var(&p))
    }
}

impl ToolLocator for SearchPath {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.dirs
            .iter()
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file())
}

/// Pick the first available capture backend.
///
/// Missing tools are a host capability problem, not a transient one, so
/// the error is meant to be fatal.
pub fn detect_capture_backend<L: ToolLocator>(
    locator: &L,
) -> Result<DetectedBackend, SupervisorError> {
    for &backend in CaptureBackend::ALL {
        if let Some(program) = locator.locate(backend.program()) {
            info!(backend = %backend, program = %program.display(), "Capture backend detected");
            return Ok(DetectedBackend { backend, program });
        }
        debug!(backend = %backend, program = backend.program(), "Capture tool not found");
    }
    Err(SupervisorError::NoCaptureBackend {
        searched: CaptureBackend::ALL
            .iter()
            .map(|b| b.program())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn write_tool(dir: &Path, name: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn detects_rpicam_on_search_path() {
        let empty = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let tool = write_tool(bin.path(), "rpicam-vid", 0o755);

        let locator = SearchPath::new([empty.path().to_path_buf(), bin.path().to_path_buf()]);
        let detected = detect_capture_backend(&locator).unwrap();
        assert_eq!(detected.backend, CaptureBackend::Rpicam);
        assert_eq!(detected.program, tool);
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_ignored() {
        let bin = tempfile::tempdir().unwrap();
        write_tool(bin.path(), "rpicam-vid", 0o644);

        let locator = SearchPath::new([bin.path().to_path_buf()]);
        let err = detect_capture_backend(&locator).unwrap_err();
        assert!(matches!(err, SupervisorError::NoCaptureBackend { .. }));
    }

    #[test]
    fn missing_tool_is_fatal() {
        let empty = tempfile::tempdir().unwrap();
        let locator = SearchPath::new([empty.path().to_path_buf()]);
        let err = detect_capture_backend(&locator).unwrap_err();
        assert!(err.to_string().contains("rpicam-vid"));
    }

    #[test]
    fn path_var_is_split() {
        let joined = std::env::join_paths(["/usr/local/bin", "/usr/bin"]).unwrap();
        let locator = SearchPath::from_path_var(&joined);
        assert_eq!(
            locator.dirs,
            vec![PathBuf::from("/usr/local/bin"), PathBuf::from("/usr/bin")]
        );
    }

    #[test]
    fn rpicam_args_carry_resolution_and_framerate() {
        let config = StreamConfig {
            width: 640,
            height: 480,
            framerate: 15,
            ..Default::default()
        };
        let args = CaptureBackend::Rpicam.capture_args(&config);
        let joined = args.join(" ");
        assert!(joined.starts_with("-t 0 "));
        assert!(joined.contains("--width 640 --height 480 --framerate 15"));
        assert!(joined.contains("--codec h264 --inline --intra 30"));
        assert!(!joined.contains("--bitrate"));
        assert!(joined.ends_with("-o -"));
    }

    #[test]
    fn rpicam_args_include_bitrate_when_set() {
        let config = StreamConfig {
            bitrate: Some(2_000_000),
            ..Default::default()
        };
        let args = CaptureBackend::Rpicam.capture_args(&config);
        let pos = args.iter().position(|a| a == "--bitrate").unwrap();
        assert_eq!(args[pos + 1], "2000000");
    }
}
