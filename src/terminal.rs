//! The authenticated API client of one POS terminal.

use promptpos_reqwest::{
    FileTokenStore, HttpAuthApi, ReqwestWithSession, ReqwestWithSessionBuild, SessionCoordinator,
    SessionError,
};
use promptpos_types::session::TokenPair;
use promptpos_types::timestamp::UnixMillis;
use reqwest_middleware::ClientWithMiddleware;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::reset::ClientReset;

/// Stored session as reported by `session status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    SignedOut,
    Active {
        expires_at: Option<UnixMillis>,
        expires_in: Duration,
    },
}

/// Why [`Terminal::keepalive`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveExit {
    /// No session was stored to begin with.
    NoSession,
    /// The shutdown token was cancelled.
    Shutdown,
    /// The session ended and the client was reset.
    SessionEnded,
}

#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Request failed: {0}")]
    Request(#[from] reqwest_middleware::Error),
    #[error("Invalid API path {path}: {source}")]
    Path {
        path: String,
        #[source]
        source: url::ParseError,
    },
}

/// Coordinator, HTTP client and reset hook wired from a [`Config`].
pub struct Terminal {
    api_base: Url,
    coordinator: SessionCoordinator,
    client: ClientWithMiddleware,
    reset: ClientReset,
}

impl Terminal {
    pub fn from_config(config: &Config) -> Result<Self, TerminalError> {
        let api = HttpAuthApi::try_from(config.api_base().as_str())?
            .with_timeout(config.request_timeout());
        let api_base = api.base_url().clone();
        let reset = ClientReset::new();
        let coordinator =
            SessionCoordinator::builder(FileTokenStore::new(config.token_store()), api)
                .listener(reset.clone())
                .timing(config.session())
                .build();
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .with_session(coordinator.clone())
            .build()
            .map_err(reqwest_middleware::Error::Reqwest)?;
        Ok(Self {
            api_base,
            coordinator,
            client,
            reset,
        })
    }

    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }

    pub fn client_reset(&self) -> &ClientReset {
        &self.reset
    }

    /// Stores a pair issued by a login and arms the refresh timer.
    pub async fn import(&self, tokens: TokenPair) -> Result<UnixMillis, TerminalError> {
        Ok(self.coordinator.establish(tokens).await?)
    }

    pub async fn status(&self) -> Result<SessionStatus, TerminalError> {
        if self.coordinator.access_token().await?.is_none() {
            return Ok(SessionStatus::SignedOut);
        }
        let expires_at = self.coordinator.expires_at().await?;
        let expires_in = expires_at
            .map(|at| at.saturating_duration_since(UnixMillis::now()))
            .unwrap_or_default();
        Ok(SessionStatus::Active {
            expires_at,
            expires_in,
        })
    }

    /// Refreshes now through the single-flight path.
    pub async fn refresh(&self) -> Result<(), TerminalError> {
        self.coordinator.refreshed_token().await?;
        Ok(())
    }

    pub async fn logout(&self) {
        self.coordinator.logout().await
    }

    /// Authenticated GET of `path`, relative to the API base.
    pub async fn get(&self, path: &str) -> Result<(reqwest::StatusCode, String), TerminalError> {
        let url = self
            .api_base
            .join(path.trim_start_matches('/'))
            .map_err(|source| TerminalError::Path {
                path: path.to_string(),
                source,
            })?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await.map_err(reqwest_middleware::Error::Reqwest)?;
        Ok((status, body))
    }

    /// Keeps the stored session refreshed until `shutdown` fires or the session ends.
    pub async fn keepalive(&self, shutdown: CancellationToken) -> Result<KeepaliveExit, TerminalError> {
        let reset = self.reset.token();
        let Some(delay) = self.coordinator.resume().await? else {
            return Ok(KeepaliveExit::NoSession);
        };
        tracing::info!(next_refresh_secs = delay.as_secs(), "Keeping member session alive");
        let exit = tokio::select! {
            _ = shutdown.cancelled() => KeepaliveExit::Shutdown,
            _ = reset.cancelled() => KeepaliveExit::SessionEnded,
        };
        self.coordinator.cancel_auto_refresh().await;
        Ok(exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptpos_reqwest::TokenStore;
    use promptpos_types::session::StorageKey;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, dir: &tempfile::TempDir) -> Config {
        let raw = serde_json::json!({
            "api_base": format!("{}/api", server.uri()),
            "token_store": dir.path().join("session.json"),
            "request_timeout_secs": 5,
        });
        serde_json::from_value(raw).unwrap()
    }

    async fn mount_refresh(server: &MockServer, status: u16) {
        let template = if status == 200 {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "success",
                "token": "fresh",
                "refreshToken": "r2",
            }))
        } else {
            ResponseTemplate::new(status)
        };
        Mock::given(method("POST"))
            .and(path("/api/member/refresh"))
            .respond_with(template)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/member/logout"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_import_then_status() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let terminal = Terminal::from_config(&config_for(&server, &dir)).unwrap();
        assert_eq!(terminal.status().await.unwrap(), SessionStatus::SignedOut);

        terminal.import(TokenPair::new("a1", "r1")).await.unwrap();
        match terminal.status().await.unwrap() {
            SessionStatus::Active { expires_at, expires_in } => {
                assert!(expires_at.is_some());
                assert!(expires_in > Duration::from_secs(14 * 60));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert!(dir.path().join("session.json").exists());
    }

    #[tokio::test]
    async fn test_get_replays_after_expiry() {
        let server = MockServer::start().await;
        mount_refresh(&server, 200).await;
        Mock::given(method("GET"))
            .and(path("/api/member/points"))
            .and(header("authorization", "Bearer a1"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({ "code": "TOKEN_EXPIRED" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/member/points"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"points":120}"#))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let terminal = Terminal::from_config(&config_for(&server, &dir)).unwrap();
        terminal.import(TokenPair::new("a1", "r1")).await.unwrap();

        let (status, body) = terminal.get("/member/points").await.unwrap();
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(body, r#"{"points":120}"#);
    }

    #[tokio::test]
    async fn test_keepalive_without_session() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let terminal = Terminal::from_config(&config_for(&server, &dir)).unwrap();
        let exit = terminal.keepalive(CancellationToken::new()).await.unwrap();
        assert_eq!(exit, KeepaliveExit::NoSession);
    }

    #[tokio::test]
    async fn test_keepalive_stops_on_shutdown() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let terminal = Terminal::from_config(&config_for(&server, &dir)).unwrap();
        terminal.import(TokenPair::new("a1", "r1")).await.unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let exit = terminal.keepalive(shutdown).await.unwrap();
        assert_eq!(exit, KeepaliveExit::Shutdown);
        assert!(terminal.coordinator().scheduled_refresh().await.is_none());
    }

    #[tokio::test]
    async fn test_keepalive_ends_when_refresh_fails() {
        let server = MockServer::start().await;
        mount_refresh(&server, 403).await;
        let dir = tempfile::tempdir().unwrap();
        let terminal = Terminal::from_config(&config_for(&server, &dir)).unwrap();
        let store = FileTokenStore::new(dir.path().join("session.json"));
        store
            .set(StorageKey::AccessToken, "a1".to_string())
            .await
            .unwrap();
        store
            .set(StorageKey::RefreshToken, "r1".to_string())
            .await
            .unwrap();
        // Already past expiry: the timer fires at once.
        store
            .set(StorageKey::TokenExpiry, "1".to_string())
            .await
            .unwrap();

        let exit = terminal.keepalive(CancellationToken::new()).await.unwrap();
        assert_eq!(exit, KeepaliveExit::SessionEnded);
        assert_eq!(terminal.client_reset().resets(), 1);
        assert_eq!(terminal.status().await.unwrap(), SessionStatus::SignedOut);
    }
}
