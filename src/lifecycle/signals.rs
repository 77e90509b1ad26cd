//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second SIGTERM/SIGINT exits immediately
//! - SIGHUP triggers a route reload, not shutdown

use tokio::task::JoinHandle;

use super::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,
    Reload,
}

/// Wait for the next signal of interest.
#[cfg(unix)]
pub async fn next_signal() -> std::io::Result<SignalEvent> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut hup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = term.recv() => Ok(SignalEvent::Shutdown),
        _ = int.recv() => Ok(SignalEvent::Shutdown),
        _ = hup.recv() => Ok(SignalEvent::Reload),
    }
}

#[cfg(not(unix))]
pub async fn next_signal() -> std::io::Result<SignalEvent> {
    tokio::signal::ctrl_c().await?;
    Ok(SignalEvent::Shutdown)
}

/// Route signals to `shutdown` and `on_reload` until the process exits.
pub fn spawn_signal_handler<F>(shutdown: Shutdown, on_reload: F) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match next_signal().await {
                Ok(SignalEvent::Reload) => {
                    tracing::info!("SIGHUP received, reloading routes");
                    on_reload();
                }
                Ok(SignalEvent::Shutdown) => {
                    if shutdown.trigger() {
                        tracing::info!("Shutdown signal received, stopping after the current request");
                    } else {
                        tracing::warn!("Second shutdown signal, exiting immediately");
                        std::process::exit(130);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install signal handlers");
                    return;
                }
            }
        }
    })
}
