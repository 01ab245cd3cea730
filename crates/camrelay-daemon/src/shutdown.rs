//! Shutdown signalling.
//!
//! SIGINT/SIGTERM are turned into a `watch` flag flipping to `true`. The
//! supervisor never touches signal state directly; it only observes the
//! flag at its suspension points.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::SupervisorError;

/// Resolve once shutdown has been requested.
///
/// If every sender is gone no one can request shutdown any more, so this
/// never resolves.
pub async fn requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Install SIGINT/SIGTERM handlers that set `tx` to `true`.
///
/// On unix both handlers are registered before this returns, so a signal
/// arriving right after startup is not lost.
pub fn spawn_signal_listener(tx: watch::Sender<bool>) -> Result<JoinHandle<()>, SupervisorError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt()).map_err(SupervisorError::Signal)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(SupervisorError::Signal)?;
        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                () = tx.closed() => return,
            }
            let _ = tx.send(true);
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                () = tx.closed() => return,
            }
            let _ = tx.send(true);
        }))
    }
}
