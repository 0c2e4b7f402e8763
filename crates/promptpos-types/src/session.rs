//! Member session wire and storage types.
//!
//! These mirror what the member API exchanges on `POST /member/refresh` and
//! `POST /member/logout`, plus the error body the API returns alongside an
//! HTTP 401, and the fixed keys the token state is persisted under.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Default lifetime of an access token, counted from issuance.
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// How long before expiry the proactive refresh fires.
pub const REFRESH_LEAD: Duration = Duration::from_secs(2 * 60);

/// An access token together with the refresh token it was issued with.
///
/// Both are opaque strings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new<A: Into<String>, R: Into<String>>(access_token: A, refresh_token: R) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Tokens stay out of logs.
impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /member/refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Body of `POST /member/logout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Response of `POST /member/refresh`.
///
/// ```json
/// { "message": "success", "token": "...", "refreshToken": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub message: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl RefreshResponse {
    pub const SUCCESS: &'static str = "success";

    /// The issued pair, if the API reported success and sent both tokens.
    pub fn into_token_pair(self) -> Option<TokenPair> {
        if self.message != Self::SUCCESS {
            return None;
        }
        Some(TokenPair {
            access_token: self.token?,
            refresh_token: self.refresh_token?,
        })
    }
}

/// Error body sent with 4xx responses.
///
/// Older endpoints put the machine-readable code under `error`, newer ones under `code`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiErrorBody {
    pub fn error_code(&self) -> Option<AuthErrorCode> {
        self.code
            .as_deref()
            .or(self.error.as_deref())
            .map(AuthErrorCode::from)
    }
}

/// Machine-readable reason attached to an authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    TokenExpired,
    TokenInvalid,
    Other(String),
}

impl AuthErrorCode {
    /// Expired and invalid access tokens are recoverable by refreshing;
    /// anything else (bad credentials, banned member, ...) is not.
    pub fn is_expiry_class(&self) -> bool {
        matches!(self, AuthErrorCode::TokenExpired | AuthErrorCode::TokenInvalid)
    }

    pub fn as_str(&self) -> &str {
        match self {
            AuthErrorCode::TokenExpired => "TOKEN_EXPIRED",
            AuthErrorCode::TokenInvalid => "TOKEN_INVALID",
            AuthErrorCode::Other(code) => code,
        }
    }
}

impl From<&str> for AuthErrorCode {
    fn from(value: &str) -> Self {
        match value {
            "TOKEN_EXPIRED" => AuthErrorCode::TokenExpired,
            "TOKEN_INVALID" => AuthErrorCode::TokenInvalid,
            other => AuthErrorCode::Other(other.to_string()),
        }
    }
}

impl Display for AuthErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed keys the session state is persisted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    /// Access token expiry, epoch milliseconds.
    TokenExpiry,
}

impl StorageKey {
    pub const ALL: [StorageKey; 3] = [
        StorageKey::AccessToken,
        StorageKey::RefreshToken,
        StorageKey::TokenExpiry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::AccessToken => "accessToken",
            StorageKey::RefreshToken => "refreshToken",
            StorageKey::TokenExpiry => "tokenExpiry",
        }
    }
}

impl Display for StorageKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
