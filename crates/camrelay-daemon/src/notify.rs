//! systemd service notifications.
//!
//! Outside of systemd (`NOTIFY_SOCKET` unset) every call is a no-op.

#[cfg(unix)]
use tracing::debug;

/// Tell the service manager the pipeline is up.
pub fn ready() {
    #[cfg(unix)]
    send(&[sd_notify::NotifyState::Ready], "READY=1");
}

/// Tell the service manager shutdown has begun.
pub fn stopping() {
    #[cfg(unix)]
    send(&[sd_notify::NotifyState::Stopping], "STOPPING=1");
}

/// Free-form status line shown by `systemctl status`.
pub fn status(message: &str) {
    #[cfg(unix)]
    send(&[sd_notify::NotifyState::Status(message)], "STATUS");
    #[cfg(not(unix))]
    let _ = message;
}

#[cfg(unix)]
fn send(states: &[sd_notify::NotifyState<'_>], label: &str) {
    // Keep NOTIFY_SOCKET set: several notifications are sent over the
    // process lifetime. Children have it removed at spawn instead.
    if let Err(e) = sd_notify::notify(false, states) {
        debug!(notification = label, error = %e, "sd_notify failed");
    }
}
