//! Single-flight access token refresh.
//!
//! [`SessionCoordinator`] owns the lifecycle of the member token pair:
//!
//! - reads the access token for every outgoing request,
//! - runs at most one refresh at a time, queueing every caller that needs a
//!   fresh token while it is in flight and answering them in arrival order,
//! - keeps one timer that refreshes proactively shortly before expiry,
//! - clears everything and hands over to a [`SessionListener`] when the
//!   session cannot be renewed.
//!
//! ## State
//!
//! ```text
//!            expiry-class 401 / timer
//!   Idle ─────────────────────────────▶ Refreshing { waiters }
//!    ▲                                        │
//!    │  success: store pair, re-arm timer,    │
//!    │           answer waiters with token    │
//!    └────────────────────────────────────────┤
//!       failure: forced logout, answer        │
//!                waiters with the error ◀─────┘
//! ```
//!
//! The refresh itself runs on a spawned task, so a caller giving up on its
//! request never strands the queue in `Refreshing`.
//!
//! Every end of session bumps a session epoch. A refresh that started under an
//! older epoch discards its tokens, so a logout during a refresh stays a logout.

use http::HeaderValue;
use http::header::AUTHORIZATION;
use promptpos_types::config::SessionTiming;
use promptpos_types::session::{StorageKey, TokenPair};
use promptpos_types::timestamp::UnixMillis;
use reqwest::Request;
use std::collections::VecDeque;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument, warn};

use crate::auth_api::AuthApi;
use crate::error::SessionError;
use crate::listener::{LogoutReason, NoopListener, SessionListener};
use crate::store::TokenStore;

type Waiter = oneshot::Sender<Result<String, SessionError>>;

/// Whether a refresh is in flight, and who is waiting on it.
#[derive(Debug, Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing {
        /// Served front to back once the refresh settles.
        waiters: VecDeque<Waiter>,
    },
}

/// The one armed auto-refresh timer.
struct ScheduledRefresh {
    generation: u64,
    fires_in: Duration,
    handle: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn TokenStore>,
    api: Arc<dyn AuthApi>,
    listener: Arc<dyn SessionListener>,
    timing: SessionTiming,
    state: Mutex<RefreshState>,
    timer: Mutex<Option<ScheduledRefresh>>,
    timer_generation: AtomicU64,
    /// Bumped when a session ends. Held while a session ends and while a
    /// refresh result is persisted.
    epoch: Mutex<u64>,
}

/// Keeps the member session alive. Cheap to clone; clones share state.
///
/// Each coordinator is independent: two coordinators over two stores never
/// see each other's refreshes or timers.
///
/// ```rust,no_run
/// use promptpos_reqwest::{HttpAuthApi, MemoryTokenStore, SessionCoordinator};
///
/// let api = HttpAuthApi::try_from("https://pos.example.com/api").unwrap();
/// let coordinator = SessionCoordinator::builder(MemoryTokenStore::new(), api).build();
/// ```
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

/// Builder for [`SessionCoordinator`].
pub struct SessionCoordinatorBuilder {
    store: Arc<dyn TokenStore>,
    api: Arc<dyn AuthApi>,
    listener: Arc<dyn SessionListener>,
    timing: SessionTiming,
}

impl SessionCoordinatorBuilder {
    pub fn listener<L: SessionListener + 'static>(mut self, listener: L) -> Self {
        self.listener = Arc::new(listener);
        self
    }

    pub fn timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn build(self) -> SessionCoordinator {
        SessionCoordinator {
            inner: Arc::new(Inner {
                store: self.store,
                api: self.api,
                listener: self.listener,
                timing: self.timing,
                state: Mutex::new(RefreshState::Idle),
                timer: Mutex::new(None),
                timer_generation: AtomicU64::new(0),
                epoch: Mutex::new(0),
            }),
        }
    }
}

impl SessionCoordinator {
    pub fn builder<S, A>(store: S, api: A) -> SessionCoordinatorBuilder
    where
        S: TokenStore + 'static,
        A: AuthApi + 'static,
    {
        SessionCoordinatorBuilder {
            store: Arc::new(store),
            api: Arc::new(api),
            listener: Arc::new(NoopListener),
            timing: SessionTiming::default(),
        }
    }

    pub fn timing(&self) -> SessionTiming {
        self.inner.timing
    }

    /// The stored access token, if any.
    pub async fn access_token(&self) -> Result<Option<String>, SessionError> {
        self.inner.store.get(StorageKey::AccessToken).await
    }

    /// The stored expiry of the access token, if any.
    pub async fn expires_at(&self) -> Result<Option<UnixMillis>, SessionError> {
        let Some(raw) = self.inner.store.get(StorageKey::TokenExpiry).await? else {
            return Ok(None);
        };
        raw.parse::<UnixMillis>()
            .map(Some)
            .map_err(|e| SessionError::Storage(format!("Invalid {}: {e}", StorageKey::TokenExpiry)))
    }

    /// Whether a refresh is in flight right now.
    pub async fn is_refreshing(&self) -> bool {
        matches!(*self.inner.state.lock().await, RefreshState::Refreshing { .. })
    }

    /// Sets `Authorization: Bearer <token>` from the stored access token.
    ///
    /// Leaves the request untouched when no token is stored.
    pub async fn attach_token(&self, request: &mut Request) -> Result<(), SessionError> {
        if let Some(token) = self.access_token().await? {
            set_bearer(request, &token)?;
        }
        Ok(())
    }

    /// Persists a freshly issued pair (login) and arms the auto-refresh timer.
    #[cfg_attr(feature = "telemetry", instrument(name = "promptpos.session.establish", skip_all, err))]
    pub async fn establish(&self, tokens: TokenPair) -> Result<UnixMillis, SessionError> {
        let expires_at = self.store_tokens(&tokens).await?;
        self.schedule_auto_refresh().await?;
        Ok(expires_at)
    }

    /// Re-arms the auto-refresh timer for a session left in the store by a previous run.
    ///
    /// Returns the delay until the timer fires, or `None` when there is no session.
    pub async fn resume(&self) -> Result<Option<Duration>, SessionError> {
        if self.access_token().await?.is_none() {
            return Ok(None);
        }
        self.schedule_auto_refresh().await
    }

    /// Returns a freshly refreshed access token.
    ///
    /// If no refresh is running one is started; otherwise the caller joins the
    /// queue of the running one. Every caller of one refresh receives the same
    /// token, or the same error. A failed refresh forces logout once, before any
    /// caller is answered. With no refresh token stored the session is already
    /// gone: callers get [`SessionError::MissingRefreshToken`] and nothing else happens.
    pub async fn refreshed_token(&self) -> Result<String, SessionError> {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut state = self.inner.state.lock().await;
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    waiters.push_back(tx);
                    #[cfg(feature = "telemetry")]
                    debug!(queued = waiters.len(), "Refresh in flight, queueing");
                    false
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing {
                        waiters: VecDeque::from([tx]),
                    };
                    true
                }
            }
        };
        if start {
            let this = self.clone();
            tokio::spawn(async move { this.run_refresh().await });
        }
        rx.await.map_err(|_| SessionError::RefreshAbandoned)?
    }

    async fn run_refresh(&self) {
        let epoch = *self.inner.epoch.lock().await;
        let result = match self.fetch_tokens().await {
            Ok(tokens) => self.adopt_tokens(epoch, tokens).await,
            Err(e) => Err(e),
        };
        match &result {
            Ok(_) => {}
            Err(SessionError::MissingRefreshToken | SessionError::SessionEnded) => {
                #[cfg(feature = "telemetry")]
                debug!("No session left to renew");
            }
            Err(_e) => {
                #[cfg(feature = "telemetry")]
                warn!(error = %_e, "Token refresh failed, forcing logout");
                self.end_session(LogoutReason::SessionExpired, Some(epoch))
                    .await;
            }
        }
        let waiters = {
            let mut state = self.inner.state.lock().await;
            match mem::take(&mut *state) {
                RefreshState::Refreshing { waiters } => waiters,
                RefreshState::Idle => VecDeque::new(),
            }
        };
        let outcome = result.map(|tokens| tokens.access_token);
        for waiter in waiters {
            // A waiter whose request was dropped no longer listens.
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Persists `tokens` and re-arms the timer, unless the session ended since `epoch`.
    async fn adopt_tokens(&self, epoch: u64, tokens: TokenPair) -> Result<TokenPair, SessionError> {
        let current = self.inner.epoch.lock().await;
        if *current != epoch {
            #[cfg(feature = "telemetry")]
            debug!("Session ended during refresh, discarding tokens");
            return Err(SessionError::SessionEnded);
        }
        let _expires_at = self.store_tokens(&tokens).await?;
        #[cfg(feature = "telemetry")]
        info!(expires_at = %_expires_at, "Access token refreshed");
        if let Err(_e) = self.schedule_auto_refresh().await {
            #[cfg(feature = "telemetry")]
            warn!(error = %_e, "Failed to re-arm auto refresh");
        }
        Ok(tokens)
    }

    /// Exchanges the stored refresh token for a new pair and persists it.
    ///
    /// This is the raw call: it neither joins nor blocks other refreshes and
    /// never logs out by itself. Use [`SessionCoordinator::refreshed_token`] for
    /// the coordinated path.
    pub async fn refresh_access_token(&self) -> Result<TokenPair, SessionError> {
        let tokens = self.fetch_tokens().await?;
        let _expires_at = self.store_tokens(&tokens).await?;
        #[cfg(feature = "telemetry")]
        info!(expires_at = %_expires_at, "Access token refreshed");
        Ok(tokens)
    }

    #[cfg_attr(feature = "telemetry", instrument(name = "promptpos.session.refresh", skip_all, err))]
    async fn fetch_tokens(&self) -> Result<TokenPair, SessionError> {
        let refresh_token = self
            .inner
            .store
            .get(StorageKey::RefreshToken)
            .await?
            .ok_or(SessionError::MissingRefreshToken)?;
        self.inner.api.refresh(&refresh_token).await
    }

    async fn store_tokens(&self, tokens: &TokenPair) -> Result<UnixMillis, SessionError> {
        let expires_at = UnixMillis::now() + self.inner.timing.access_token_ttl;
        let store = &self.inner.store;
        store
            .set(StorageKey::AccessToken, tokens.access_token.clone())
            .await?;
        store
            .set(StorageKey::RefreshToken, tokens.refresh_token.clone())
            .await?;
        store
            .set(StorageKey::TokenExpiry, expires_at.to_string())
            .await?;
        Ok(expires_at)
    }

    /// Arms the proactive refresh `refresh_lead` before the stored expiry,
    /// replacing any timer armed earlier.
    ///
    /// Returns the delay, or `None` (and no timer) when no expiry is stored.
    pub async fn schedule_auto_refresh(&self) -> Result<Option<Duration>, SessionError> {
        let Some(expires_at) = self.expires_at().await? else {
            self.cancel_auto_refresh().await;
            return Ok(None);
        };
        let delay = expires_at
            .saturating_duration_since(UnixMillis::now())
            .saturating_sub(self.inner.timing.refresh_lead);
        self.arm_timer(delay).await;
        #[cfg(feature = "telemetry")]
        debug!(delay_secs = delay.as_secs(), "Auto refresh scheduled");
        Ok(Some(delay))
    }

    async fn arm_timer(&self, delay: Duration) {
        let generation = self.inner.timer_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        // The slot stays locked until the new handle is in place, so the task
        // always finds itself there when it wakes, unless it was superseded.
        let mut timer = self.inner.timer.lock().await;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                SessionCoordinator { inner }.fire_auto_refresh(generation).await;
            }
        });
        let previous = timer.replace(ScheduledRefresh {
            generation,
            fires_in: delay,
            handle,
        });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    // Boxed to break the cycle with `refreshed_token` through the spawned refresh and timer tasks.
    fn fire_auto_refresh(&self, generation: u64) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            {
                let mut timer = self.inner.timer.lock().await;
                match timer.as_ref() {
                    // Detach from the slot so re-arming after this refresh does not abort us.
                    Some(scheduled) if scheduled.generation == generation => {
                        timer.take();
                    }
                    _ => return,
                }
            }
            match self.access_token().await {
                Ok(Some(_)) => {}
                _ => return,
            }
            #[cfg(feature = "telemetry")]
            debug!("Auto refresh firing");
            if let Err(_e) = self.refreshed_token().await {
                #[cfg(feature = "telemetry")]
                warn!(error = %_e, "Auto refresh failed");
            }
        })
    }

    /// Disarms the auto-refresh timer, if one is armed.
    pub async fn cancel_auto_refresh(&self) {
        if let Some(previous) = self.inner.timer.lock().await.take() {
            previous.handle.abort();
        }
    }

    /// Delay the armed timer was set with, `None` when no timer is armed.
    pub async fn scheduled_refresh(&self) -> Option<Duration> {
        self.inner.timer.lock().await.as_ref().map(|s| s.fires_in)
    }

    /// Signs out: best-effort backend logout, local state cleared, listener notified and reset.
    ///
    /// A refresh in flight when this runs is discarded and answers its callers
    /// with [`SessionError::SessionEnded`].
    pub async fn logout(&self) {
        self.end_session(LogoutReason::UserRequested, None).await
    }

    /// Ends the session. With `expected_epoch`, does nothing if that session already ended.
    #[cfg_attr(feature = "telemetry", instrument(name = "promptpos.session.end", skip(self)))]
    async fn end_session(&self, reason: LogoutReason, expected_epoch: Option<u64>) {
        let mut epoch = self.inner.epoch.lock().await;
        if expected_epoch.is_some_and(|expected| expected != *epoch) {
            return;
        }
        *epoch = epoch.wrapping_add(1);
        self.cancel_auto_refresh().await;
        let store = &self.inner.store;
        if let Ok(Some(refresh_token)) = store.get(StorageKey::RefreshToken).await {
            if let Err(_e) = self.inner.api.logout(&refresh_token).await {
                #[cfg(feature = "telemetry")]
                debug!(error = %_e, "Backend logout failed, ignoring");
            }
        }
        if let Err(_e) = store.clear().await {
            #[cfg(feature = "telemetry")]
            warn!(error = %_e, "Failed to clear session storage");
        }
        self.inner.listener.session_ended(reason);
        self.inner.listener.reset();
    }
}

/// Replaces the `Authorization` header with a bearer credential.
pub(crate) fn set_bearer(request: &mut Request, token: &str) -> Result<(), SessionError> {
    let mut value = HeaderValue::try_from(format!("Bearer {token}"))
        .map_err(|_| SessionError::InvalidHeader)?;
    value.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}
