use std::sync::{Arc, OnceLock};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancels a token on the first SIGTERM or SIGINT.
///
/// The token can be shared with anything that should stop when the terminal
/// operator interrupts the process.
pub struct SigDown {
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
    received: Arc<OnceLock<&'static str>>,
}

impl SigDown {
    /// Registers the signal handlers.
    ///
    /// Returns an error if signal registration fails.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let inner = CancellationToken::new();
        let outer = inner.clone();
        let received = Arc::new(OnceLock::new());
        let record = received.clone();
        let task_tracker = TaskTracker::new();
        task_tracker.spawn(async move {
            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
                _ = inner.cancelled() => return,
            };
            let _ = record.set(name);
            inner.cancel();
        });
        task_tracker.close();
        Ok(Self {
            task_tracker,
            cancellation_token: outer,
            received,
        })
    }

    /// Returns a clone of the cancellation token for distributing to subsystems.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Name of the signal that fired, if any.
    pub fn received(&self) -> Option<&'static str> {
        self.received.get().copied()
    }

    /// Waits for a shutdown signal and ensures the signal handler task completes.
    pub async fn recv(&self) {
        self.cancellation_token.cancelled().await;
        self.task_tracker.wait().await;
    }
}

impl Drop for SigDown {
    fn drop(&mut self) {
        // Stops the handler task when no signal arrived.
        self.cancellation_token.cancel();
    }
}
