//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP only flags a reload; the server applies it on its next tick
//! - A second SIGTERM/SIGINT forces exit without draining

use tokio::task::JoinHandle;

use crate::lifecycle::reload::ReloadTrigger;
use crate::lifecycle::shutdown::Shutdown;

/// Spawn the task translating signals into reload requests and shutdown.
#[cfg(unix)]
pub fn install(trigger: ReloadTrigger, shutdown: Shutdown) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        let mut stopping = false;
        loop {
            let name = tokio::select! {
                _ = hangup.recv() => {
                    tracing::info!("SIGHUP received, reload requested");
                    trigger.request();
                    continue;
                }
                _ = terminate.recv() => "SIGTERM",
                _ = interrupt.recv() => "SIGINT",
            };

            if stopping {
                tracing::warn!(signal = name, "Second termination signal, exiting now");
                std::process::exit(1);
            }
            stopping = true;
            tracing::info!(signal = name, "Shutting down");
            shutdown.trigger();
        }
    }))
}

/// Spawn the task translating Ctrl-C into shutdown.
#[cfg(not(unix))]
pub fn install(_trigger: ReloadTrigger, shutdown: Shutdown) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            shutdown.trigger();
        }
    }))
}
