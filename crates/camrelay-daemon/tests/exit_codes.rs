#![allow(clippy::unwrap_used, clippy::expect_used)] // Integration tests use unwrap for brevity

//! Process exit status of the `camrelay` binary.

use std::process::{Command, Output};

fn camrelay(args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_camrelay"));
    for (key, _) in std::env::vars() {
        if key.starts_with("CAMRELAY_") {
            cmd.env_remove(key);
        }
    }
    cmd.env("RUST_LOG", "off").args(args).output().unwrap()
}

#[test]
fn invalid_config_exits_with_one() {
    let out = camrelay(&["--width", "0"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn unknown_config_file_exits_with_one() {
    let out = camrelay(&["--config", "/nonexistent/camrelay.toml"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn failed_run_exits_with_one() {
    // Nothing reachable on 127.0.0.1:1935 fails the wait; a listener there
    // still leaves an empty PATH without a capture backend.
    let out = Command::new(env!("CARGO_BIN_EXE_camrelay"))
        .env_clear()
        .env("RUST_LOG", "off")
        .env("PATH", "")
        .args([
            "--ingest-host",
            "127.0.0.1",
            "--max-attempts",
            "1",
            "--retry-interval",
            "0",
            "--probe-timeout",
            "1",
        ])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
}

/// Stand-in tools on a private `PATH`, plus a listener on the ingest port.
#[cfg(unix)]
mod streaming {
    use std::net::TcpListener;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::process::{Child, Command, ExitStatus, Stdio};
    use std::time::{Duration, Instant};

    pub struct Rig {
        pub dir: tempfile::TempDir,
        pub host: String,
        _ingest: TcpListener,
    }

    impl Rig {
        pub fn new() -> Self {
            let dir = tempfile::TempDir::new().unwrap();
            // rpicam-vid and ffmpeg record their pid, then run until signalled.
            // `exec` keeps the pid of the recording shell.
            write_script(
                &dir.path().join("rpicam-vid"),
                &format!("echo $$ > {}\nexec sleep 30", dir.path().join("capture.pid").display()),
            );
            write_script(
                &dir.path().join("ffmpeg"),
                &format!(
                    "echo $$ > {}\nexec cat > /dev/null",
                    dir.path().join("publish.pid").display()
                ),
            );
            let (host, ingest) = bind_ingest();
            Self {
                dir,
                host,
                _ingest: ingest,
            }
        }

        pub fn spawn(&self) -> Child {
            let path = format!("{}:/usr/bin:/bin", self.dir.path().display());
            Command::new(env!("CARGO_BIN_EXE_camrelay"))
                .env_clear()
                .env("RUST_LOG", "off")
                .env("PATH", path)
                .args([
                    "--ingest-host",
                    &self.host,
                    "--retry-interval",
                    "1",
                    "--max-attempts",
                    "10",
                    "--terminate-timeout",
                    "2",
                ])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .unwrap()
        }

        pub fn wait_for_pid(&self, name: &str) -> i32 {
            let path = self.dir.path().join(name);
            let deadline = Instant::now() + Duration::from_secs(10);
            while Instant::now() < deadline {
                if let Some(pid) = std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                {
                    return pid;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            panic!("{} was never written", path.display());
        }
    }

    fn write_script(path: &Path, body: &str) {
        std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// The ingest port is fixed, so pick a free loopback address instead.
    fn bind_ingest() -> (String, TcpListener) {
        let subnet = std::process::id() % 250 + 1;
        let candidates = (2..=254_u8)
            .map(|last| format!("127.0.{subnet}.{last}"))
            .chain(std::iter::once("127.0.0.1".to_string()));
        for host in candidates {
            if let Ok(listener) = TcpListener::bind((host.as_str(), 1935)) {
                return (host, listener);
            }
        }
        panic!("no loopback address with a free port 1935");
    }

    pub fn send(pid: u32, signal: i32) {
        // SAFETY: pid belongs to a child spawned by this test and not yet reaped.
        #[allow(unsafe_code)]
        #[allow(clippy::cast_possible_wrap)]
        let ret = unsafe { libc::kill(pid as i32, signal) };
        assert_eq!(ret, 0, "kill failed: {}", std::io::Error::last_os_error());
    }

    pub fn is_alive(pid: i32) -> bool {
        // SAFETY: signal 0 only checks for existence.
        #[allow(unsafe_code)]
        let ret = unsafe { libc::kill(pid, 0) };
        ret == 0
    }

    pub fn wait_timeout(child: &mut Child, timeout: Duration) -> ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().unwrap() {
                return status;
            }
            if Instant::now() >= deadline {
                child.kill().ok();
                panic!("camrelay did not exit within {timeout:?}");
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    pub fn wait_gone(pid: i32) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while is_alive(pid) {
            assert!(Instant::now() < deadline, "pid {pid} still running");
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

#[cfg(unix)]
fn signal_while_streaming_exits_cleanly(signal: i32) {
    use std::time::Duration;

    let rig = streaming::Rig::new();
    let mut camrelay = rig.spawn();

    let capture = rig.wait_for_pid("capture.pid");
    let publish = rig.wait_for_pid("publish.pid");
    assert!(streaming::is_alive(capture));
    assert!(streaming::is_alive(publish));

    streaming::send(camrelay.id(), signal);
    let status = streaming::wait_timeout(&mut camrelay, Duration::from_secs(15));
    assert_eq!(status.code(), Some(0));

    streaming::wait_gone(capture);
    streaming::wait_gone(publish);
}

#[cfg(unix)]
#[test]
fn sigterm_while_streaming_exits_with_zero() {
    signal_while_streaming_exits_cleanly(libc::SIGTERM);
}

#[cfg(unix)]
#[test]
fn sigint_while_streaming_exits_with_zero() {
    signal_while_streaming_exits_cleanly(libc::SIGINT);
}
