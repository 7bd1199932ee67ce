//! OS signal handling for the daemon loop.
//!
//! ## Unix
//! - **SIGHUP** asks for a configuration reload
//! - **SIGINT** (Ctrl-C) and **SIGTERM** (systemd/Docker stop) ask for a
//!   graceful shutdown
//!
//! ## Non-Unix
//! Only [`tokio::signal::ctrl_c`] is awaited; reload is never produced.

/// What the received signal asks the daemon to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// Re-read the config file and reconcile the declared items.
    Reload,
    /// Stop all items, flush the store and exit.
    Shutdown,
}

#[cfg(unix)]
pub struct Signals {
    sighup: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    /// Install the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler cannot be registered.
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            sighup: signal(SignalKind::hangup())?,
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next signal of interest.
    pub async fn next(&mut self) -> DaemonSignal {
        tokio::select! {
            _ = self.sighup.recv() => DaemonSignal::Reload,
            _ = self.sigint.recv() => DaemonSignal::Shutdown,
            _ = self.sigterm.recv() => DaemonSignal::Shutdown,
        }
    }
}

#[cfg(not(unix))]
pub struct Signals;

#[cfg(not(unix))]
impl Signals {
    /// Install the signal handlers.
    ///
    /// # Errors
    ///
    /// Infallible on this platform; kept for signature parity.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    /// Wait for the next signal of interest.
    pub async fn next(&mut self) -> DaemonSignal {
        let _ = tokio::signal::ctrl_c().await;
        DaemonSignal::Shutdown
    }
}
