//! Client for the member authentication endpoints.
//!
//! [`HttpAuthApi`] talks to `POST {api_base}/member/refresh` and
//! `POST {api_base}/member/logout`. It deliberately uses a plain
//! `reqwest::Client`: these calls must never pass through the session
//! middleware they serve.
//!
//! ## Example
//!
//! ```rust
//! use promptpos_reqwest::HttpAuthApi;
//!
//! let api = HttpAuthApi::try_from("https://pos.example.com/api").unwrap();
//! assert_eq!(api.refresh_url().as_str(), "https://pos.example.com/api/member/refresh");
//! ```

use async_trait::async_trait;
use http::HeaderMap;
use promptpos_types::session::{LogoutRequest, RefreshRequest, RefreshResponse, TokenPair};
use reqwest::Client;
use std::time::Duration;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::error::SessionError;

/// The two calls the coordinator needs from the backend.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchanges a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError>;

    /// Asks the backend to invalidate a refresh token.
    async fn logout(&self, refresh_token: &str) -> Result<(), SessionError>;
}

#[async_trait]
impl<T: AuthApi + ?Sized> AuthApi for std::sync::Arc<T> {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        (**self).refresh(refresh_token).await
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), SessionError> {
        (**self).logout(refresh_token).await
    }
}

/// [`AuthApi`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpAuthApi {
    /// Base URL of the API (e.g. `https://pos.example.com/api/`)
    base_url: Url,
    /// Full URL to `POST /member/refresh`
    refresh_url: Url,
    /// Full URL to `POST /member/logout`
    logout_url: Url,
    client: Client,
    /// Optional custom headers sent with each request
    headers: HeaderMap,
    /// Optional request timeout
    timeout: Option<Duration>,
}

impl HttpAuthApi {
    /// Constructs the client from a base URL; endpoint URLs are resolved relative to it.
    ///
    /// The path of `base_url` is normalized to exactly one trailing slash, so
    /// `https://pos.example.com/api` keeps its `/api` segment.
    pub fn try_new(mut base_url: Url) -> Result<Self, SessionError> {
        let path = format!("{}/", base_url.path().trim_end_matches('/'));
        base_url.set_path(&path);
        let refresh_url =
            base_url
                .join("./member/refresh")
                .map_err(|e| SessionError::UrlParse {
                    context: "Failed to construct ./member/refresh URL",
                    source: e,
                })?;
        let logout_url =
            base_url
                .join("./member/logout")
                .map_err(|e| SessionError::UrlParse {
                    context: "Failed to construct ./member/logout URL",
                    source: e,
                })?;
        Ok(Self {
            base_url,
            refresh_url,
            logout_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }

    pub fn logout_url(&self) -> &Url {
        &self.logout_url
    }

    /// Attaches custom headers to all future requests.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for all future requests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Uses a caller-provided client, e.g. one with custom TLS roots.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    async fn post_json<T>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<reqwest::Response, SessionError>
    where
        T: serde::Serialize + ?Sized,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|e| SessionError::http(context, e))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SessionError::http(context, e))?;
        Err(SessionError::HttpStatus {
            context,
            status,
            body,
        })
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    #[cfg_attr(feature = "telemetry", instrument(name = "promptpos.auth.refresh", skip_all, err))]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        const CONTEXT: &str = "POST /member/refresh";
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self
            .post_json(&self.refresh_url, CONTEXT, &body)
            .await?
            .json::<RefreshResponse>()
            .await
            .map_err(|e| SessionError::http(CONTEXT, e))?;
        let message = response.message.clone();
        response
            .into_token_pair()
            .ok_or(SessionError::Rejected { message })
    }

    #[cfg_attr(feature = "telemetry", instrument(name = "promptpos.auth.logout", skip_all, err))]
    async fn logout(&self, refresh_token: &str) -> Result<(), SessionError> {
        let body = LogoutRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.post_json(&self.logout_url, "POST /member/logout", &body)
            .await
            .map(|_| ())
    }
}

/// Parses a base URL, normalizing it to exactly one trailing slash.
impl TryFrom<&str> for HttpAuthApi {
    type Error = SessionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(value).map_err(|e| SessionError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        HttpAuthApi::try_new(url)
    }
}

impl TryFrom<String> for HttpAuthApi {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        HttpAuthApi::try_from(value.as_str())
    }
}
