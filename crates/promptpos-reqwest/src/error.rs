use http::StatusCode;
use reqwest_middleware as rqm;

/// Errors that can occur while keeping a member session authenticated.
///
/// The type is `Clone` because a single refresh outcome is handed to every
/// request that queued behind it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// A refresh was attempted with no refresh token in the store. No request is made.
    #[error("No refresh token stored")]
    MissingRefreshToken,
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    /// Transport-level failure; the message of the underlying `reqwest::Error`.
    #[error("HTTP error: {context}: {message}")]
    Http {
        context: &'static str,
        message: String,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    /// The refresh endpoint answered, but not with `"message": "success"` and a token pair.
    #[error("Refresh rejected: {message}")]
    Rejected { message: String },
    #[error("Token store error: {0}")]
    Storage(String),
    #[error("Access token cannot be used as an HTTP header value")]
    InvalidHeader,
    /// Indicates that the original request could not be cloned for replaying with a fresh token.
    /// This typically happens when the request body is a stream or otherwise non-reusable.
    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    RequestNotCloneable,
    #[error("Refresh task ended without reporting a result")]
    RefreshAbandoned,
    /// The session was ended while the refresh was in flight; its result was discarded.
    #[error("Session ended during refresh")]
    SessionEnded,
}

impl SessionError {
    pub(crate) fn http(context: &'static str, source: reqwest::Error) -> Self {
        SessionError::Http {
            context,
            message: source.to_string(),
        }
    }

    pub(crate) fn storage<E: std::fmt::Display>(error: E) -> Self {
        SessionError::Storage(error.to_string())
    }
}

impl From<SessionError> for rqm::Error {
    fn from(error: SessionError) -> Self {
        rqm::Error::Middleware(error.into())
    }
}
