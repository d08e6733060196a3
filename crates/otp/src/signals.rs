//! Signal handling for graceful server shutdown.
//!
//! The first SIGINT/SIGTERM flips the shared [`ShutdownState`] so the accept
//! loops and the event loop wind down; a second one exits immediately.

use otp_core::ShutdownState;
use tokio::signal;
use tracing::{error, info, warn};

/// Waits for the next termination signal.
///
/// Handles SIGINT and SIGTERM on Unix platforms and Ctrl+C on Windows.
pub async fn wait_for_signal() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}

/// Spawns the signal watcher that drives `shutdown_state`.
///
/// # Example
///
/// ```no_run
/// use lib_otp::signals::spawn_signal_handler;
/// use otp_core::ShutdownState;
///
/// #[tokio::main]
/// async fn main() {
///     let shutdown_state = ShutdownState::new();
///     spawn_signal_handler(shutdown_state.clone());
///     // Start the server with `shutdown_state`...
/// }
/// ```
pub fn spawn_signal_handler(shutdown_state: ShutdownState) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up shutdown signal handler: {e}");
                return;
            }

            if shutdown_state.initiate_shutdown() == 1 {
                info!("📡 Received shutdown signal - initiating graceful shutdown");
            } else {
                // merciless shutdown
                warn!("Shutdown signal received again! I'll make this quick.");
                std::process::exit(1);
            }
        }
    });
}
