//! External reload requests (SIGUSR2 on Unix).

use tokio::sync::watch;
use tracing::info;

/// Receiver side of the reload channel. The value is the number of reload
/// requests seen so far; wait on `changed()` to be woken for each new one.
pub type ReloadReceiver = watch::Receiver<u64>;

/// Create a reload channel fed by SIGUSR2.
///
/// Must be called from within a tokio runtime.
#[cfg(unix)]
pub fn setup_reload_signal() -> ReloadReceiver {
    let (reload_tx, reload_rx) = watch::channel(0u64);

    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigusr2 = match signal(SignalKind::user_defined2()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(target: "scripting", "Failed to register SIGUSR2 handler: {}", e);
                return;
            }
        };

        while sigusr2.recv().await.is_some() {
            info!(target: "scripting", "Received SIGUSR2 - reloading scripts");
            reload_tx.send_modify(|requests| *requests += 1);
            if reload_tx.is_closed() {
                info!(target: "scripting", "Reload receiver dropped, stopping SIGUSR2 handler");
                break;
            }
        }
    });

    reload_rx
}

/// Create a reload channel (non-Unix platforms have no SIGUSR2, it never fires)
#[cfg(not(unix))]
pub fn setup_reload_signal() -> ReloadReceiver {
    let (reload_tx, reload_rx) = watch::channel(0u64);
    tracing::warn!(target: "scripting", "SIGUSR2 reload not supported on this platform");
    // Keep the sender alive so `changed()` pends instead of erroring
    std::mem::forget(reload_tx);
    reload_rx
}
