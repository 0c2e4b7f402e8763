//! What the terminal does when its member session ends.

use promptpos_reqwest::{LogoutReason, SessionListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Notifies the operator and tears down the running client.
///
/// `reset` cancels [`ClientReset::token`]; every long-running command selects
/// on it and returns to the prompt, which is the CLI equivalent of reloading
/// the application at its landing route. The token is replaced on every reset
/// so a later session starts from a clean slate.
#[derive(Clone, Debug, Default)]
pub struct ClientReset {
    token: Arc<std::sync::Mutex<CancellationToken>>,
    resets: Arc<AtomicUsize>,
}

impl ClientReset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled by the next reset.
    pub fn token(&self) -> CancellationToken {
        match self.token.lock() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of resets performed so far.
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::Relaxed)
    }
}

impl SessionListener for ClientReset {
    fn session_ended(&self, reason: LogoutReason) {
        match reason {
            LogoutReason::UserRequested => tracing::info!("Member session ended: {reason}"),
            LogoutReason::SessionExpired => tracing::warn!("Member session ended: {reason}"),
        }
    }

    fn reset(&self) {
        let previous = match self.token.lock() {
            Ok(mut token) => std::mem::take(&mut *token),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        previous.cancel();
        self.resets.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Client state reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_cancels_current_token_only() {
        let reset = ClientReset::new();
        let before = reset.token();
        reset.reset();
        assert!(before.is_cancelled());
        assert!(!reset.token().is_cancelled());
        assert_eq!(reset.resets(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let reset = ClientReset::new();
        let shared = reset.clone();
        let token = reset.token();
        shared.reset();
        assert!(token.is_cancelled());
        assert_eq!(reset.resets(), 1);
    }
}
