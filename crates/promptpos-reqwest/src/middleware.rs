//! The reqwest middleware half of the session coordinator.

use http::{Extensions, StatusCode};
use promptpos_types::session::ApiErrorBody;
use reqwest::{Request, Response, ResponseBuilderExt};
use reqwest_middleware as rqm;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument, trace};

use crate::coordinator::{SessionCoordinator, set_bearer};
use crate::error::SessionError;

/// Request extension marking a request already replayed after a refresh.
///
/// A response to a marked request is returned as is, so one request never
/// triggers more than one refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionRetried;

/// Middleware that authenticates every request with the member session.
///
/// Each request gets the stored access token as a bearer credential. A `401`
/// whose body carries `TOKEN_EXPIRED` or `TOKEN_INVALID` is answered by
/// refreshing through the [`SessionCoordinator`] and replaying the request
/// once with the new token. Every other response, including other `401`s,
/// reaches the caller untouched.
#[derive(Clone)]
pub struct SessionMiddleware {
    coordinator: SessionCoordinator,
}

impl SessionMiddleware {
    pub fn new(coordinator: SessionCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }
}

impl From<SessionCoordinator> for SessionMiddleware {
    fn from(coordinator: SessionCoordinator) -> Self {
        Self::new(coordinator)
    }
}

/// Tells whether `response` is a `401` carrying an expiry-class error code.
///
/// The body of a `401` has to be consumed to be read, so the response is
/// rebuilt from the same status, version, URL, headers and bytes; the caller
/// receives one indistinguishable from the original. Other statuses are
/// returned without touching the body.
pub async fn classify(response: Response) -> rqm::Result<(Response, bool)> {
    if response.status() != StatusCode::UNAUTHORIZED {
        return Ok((response, false));
    }
    let status = response.status();
    let version = response.version();
    let url = response.url().clone();
    let headers = response.headers().clone();
    let bytes = response.bytes().await?;
    // Anything that is not the expected JSON is just not expiry-class.
    let expired = serde_json::from_slice::<ApiErrorBody>(&bytes)
        .ok()
        .and_then(|body| body.error_code())
        .is_some_and(|code| code.is_expiry_class());

    let mut builder = http::Response::builder()
        .status(status)
        .version(version)
        .url(url);
    if let Some(target) = builder.headers_mut() {
        *target = headers;
    }
    let rebuilt = builder
        .body(bytes)
        .map_err(|e| rqm::Error::Middleware(e.into()))?;
    Ok((Response::from(rebuilt), expired))
}

#[async_trait::async_trait]
impl rqm::Middleware for SessionMiddleware {
    /// Attaches the access token, and on an expiry-class `401`:
    /// 1. Waits for a refreshed token, starting a refresh or joining the running one
    /// 2. Replays the request once with the new token
    #[cfg_attr(feature = "telemetry", instrument(name = "promptpos.reqwest.handle", skip_all, err))]
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        self.coordinator.attach_token(&mut req).await?;
        let retry_req = req.try_clone();
        let res = next.clone().run(req, extensions).await?;

        if extensions.get::<SessionRetried>().is_some() {
            return Ok(res);
        }
        let (res, expired) = classify(res).await?;
        if !expired {
            #[cfg(feature = "telemetry")]
            trace!(status = ?res.status(), "Passing response through");
            return Ok(res);
        }

        #[cfg(feature = "telemetry")]
        debug!(url = %res.url(), "Access token rejected, refreshing");

        let mut retry = retry_req.ok_or(SessionError::RequestNotCloneable)?;
        let token = self.coordinator.refreshed_token().await?;
        set_bearer(&mut retry, &token)?;
        extensions.insert(SessionRetried);

        #[cfg(feature = "telemetry")]
        trace!(url = ?retry.url(), "Replaying request with refreshed token");

        next.run(retry, extensions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_api::HttpAuthApi;
    use crate::builder::{ReqwestWithSession, ReqwestWithSessionBuild};
    use crate::coordinator::tests::RecordingListener;
    use crate::listener::LogoutReason;
    use crate::store::{MemoryTokenStore, TokenStore};
    use promptpos_types::session::StorageKey;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store_with(access: Option<&str>, refresh: Option<&str>) -> MemoryTokenStore {
        let store = MemoryTokenStore::new();
        if let Some(access) = access {
            store
                .set(StorageKey::AccessToken, access.to_string())
                .await
                .unwrap();
        }
        if let Some(refresh) = refresh {
            store
                .set(StorageKey::RefreshToken, refresh.to_string())
                .await
                .unwrap();
        }
        store
    }

    fn coordinator_for(
        server: &MockServer,
        store: MemoryTokenStore,
        listener: Arc<RecordingListener>,
    ) -> SessionCoordinator {
        let api = HttpAuthApi::try_from(format!("{}/api", server.uri())).unwrap();
        SessionCoordinator::builder(store, api)
            .listener(listener)
            .build()
    }

    fn expired() -> ResponseTemplate {
        ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "code": "TOKEN_EXPIRED",
            "message": "jwt expired",
        }))
    }

    async fn mount_refresh(server: &MockServer, delay: Duration, expect: u64) {
        Mock::given(method("POST"))
            .and(path("/api/member/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "message": "success",
                        "token": "fresh",
                        "refreshToken": "r2",
                    }))
                    .set_delay(delay),
            )
            .expect(expect)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_no_token_sends_no_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/catalog"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let coordinator = coordinator_for(&server, MemoryTokenStore::new(), Default::default());
        let client = reqwest::Client::new().with_session(coordinator).build();

        let res = client
            .get(format!("{}/api/catalog", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(!received[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_request_replayed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/orders"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(expired())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/orders"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, Duration::ZERO, 1).await;

        let store = store_with(Some("stale"), Some("r1")).await;
        let coordinator = coordinator_for(&server, store.clone(), Default::default());
        let client = reqwest::Client::new()
            .with_session(coordinator.clone())
            .build();

        let res = client
            .post(format!("{}/api/orders", server.uri()))
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(r#"{"sku":"A-1"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.text().await.unwrap(), "created");
        assert_eq!(
            store.get(StorageKey::RefreshToken).await.unwrap().as_deref(),
            Some("r2")
        );
        assert!(coordinator.scheduled_refresh().await.is_some());
    }

    #[tokio::test]
    async fn test_legacy_error_field_is_expiry_class() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/points"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({ "error": "TOKEN_INVALID" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/points"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        mount_refresh(&server, Duration::ZERO, 1).await;

        let store = store_with(Some("stale"), Some("r1")).await;
        let client = reqwest::Client::new()
            .with_session(coordinator_for(&server, store, Default::default()))
            .build();
        let res = client
            .get(format!("{}/api/points", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_other_unauthorized_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/admin"))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header("x-request-id", "req-42")
                    .set_body_json(serde_json::json!({
                        "code": "NOT_A_CASHIER",
                        "message": "forbidden area",
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, Duration::ZERO, 0).await;

        let store = store_with(Some("stale"), Some("r1")).await;
        let client = reqwest::Client::new()
            .with_session(coordinator_for(&server, store, Default::default()))
            .build();
        let url = format!("{}/api/admin", server.uri());
        let res = client.get(&url).send().await.unwrap();

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.url().as_str(), url);
        assert_eq!(res.headers()["x-request-id"], "req-42");
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["code"], "NOT_A_CASHIER");
        assert_eq!(body["message"], "forbidden area");
    }

    #[tokio::test]
    async fn test_replayed_request_is_not_refreshed_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/points"))
            .respond_with(expired())
            .expect(2)
            .mount(&server)
            .await;
        mount_refresh(&server, Duration::ZERO, 1).await;

        let store = store_with(Some("stale"), Some("r1")).await;
        let client = reqwest::Client::new()
            .with_session(coordinator_for(&server, store, Default::default()))
            .build();
        let res = client
            .get(format!("{}/api/points", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_concurrent_expired_requests_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(expired())
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;
        mount_refresh(&server, Duration::from_millis(300), 1).await;

        let store = store_with(Some("stale"), Some("r1")).await;
        let client = reqwest::Client::new()
            .with_session(coordinator_for(&server, store, Default::default()))
            .build();
        let get = |p: &str| client.get(format!("{}/api/{p}", server.uri())).send();

        let (a, b, c) = tokio::join!(get("points"), get("orders"), get("profile"));
        for res in [a, b, c] {
            assert_eq!(res.unwrap().status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_rejects_request_and_logs_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/points"))
            .respond_with(expired())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/member/refresh"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/member/logout"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let listener = Arc::new(RecordingListener::default());
        let store = store_with(Some("stale"), Some("r1")).await;
        let client = reqwest::Client::new()
            .with_session(coordinator_for(&server, store.clone(), listener.clone()))
            .build();
        let err = client
            .get(format!("{}/api/points", server.uri()))
            .send()
            .await
            .unwrap_err();

        let inner = match err {
            rqm::Error::Middleware(inner) => inner,
            other => panic!("expected a middleware error, got {other:?}"),
        };
        assert!(matches!(
            inner.downcast_ref::<SessionError>(),
            Some(SessionError::HttpStatus { status: StatusCode::FORBIDDEN, .. })
        ));
        assert_eq!(
            *listener.ended.lock().unwrap(),
            vec![LogoutReason::SessionExpired]
        );
        assert_eq!(store.get(StorageKey::AccessToken).await.unwrap(), None);
    }
}
