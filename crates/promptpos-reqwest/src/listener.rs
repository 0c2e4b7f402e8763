//! Hooks the coordinator calls when a session ends.

use std::fmt::{Display, Formatter};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The member or cashier signed out.
    UserRequested,
    /// The access token could not be renewed.
    SessionExpired,
}

impl Display for LogoutReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogoutReason::UserRequested => f.write_str("signed out"),
            LogoutReason::SessionExpired => f.write_str("session expired, please sign in again"),
        }
    }
}

/// Receives the user-facing side of a logout.
///
/// Both methods run after local session state is already cleared. `reset` must
/// discard every piece of in-memory client state, the equivalent of reloading
/// the application at its landing route.
pub trait SessionListener: Send + Sync {
    /// Tells the user the session ended.
    fn session_ended(&self, reason: LogoutReason);

    /// Performs the full client reset.
    fn reset(&self);
}

impl<T: SessionListener + ?Sized> SessionListener for std::sync::Arc<T> {
    fn session_ended(&self, reason: LogoutReason) {
        (**self).session_ended(reason)
    }

    fn reset(&self) {
        (**self).reset()
    }
}

/// Listener that does nothing; the default when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl SessionListener for NoopListener {
    fn session_ended(&self, _reason: LogoutReason) {}

    fn reset(&self) {}
}
