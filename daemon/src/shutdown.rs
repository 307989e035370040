//! Station shutdown.
//!
//! The first trigger wins: either an operator signal or the payload input
//! closing. Its reason is latched in a `tokio::sync::watch` channel, so a
//! task that subscribes after the trigger still stops.

use std::fmt;

use tokio::signal;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or SIGTERM.
    Signal(&'static str),
    /// The decoder stopped writing payloads.
    InputClosed,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "received {name}"),
            ShutdownReason::InputClosed => f.write_str("input closed"),
        }
    }
}

pub struct ShutdownController {
    tx: watch::Sender<Option<ShutdownReason>>,
}

/// Handed to the reader, the audit log and the sweeper.
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been triggered, or once the controller is
    /// gone.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(Option::is_some).await;
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    /// Trigger shutdown. Returns `false` when it was already triggered, in
    /// which case the earlier reason stands.
    pub fn shutdown(&self, reason: ShutdownReason) -> bool {
        let first = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if first {
            tracing::info!(%reason, "shutting down");
        }
        first
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) -> ShutdownReason {
        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let reason = tokio::select! {
            _ = signal::ctrl_c() => ShutdownReason::Signal("SIGINT"),
            _ = terminate => ShutdownReason::Signal("SIGTERM"),
        };
        self.shutdown(reason);
        reason
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
