use reqwest::{Client, ClientBuilder};
use reqwest_middleware as rqm;

use crate::coordinator::SessionCoordinator;
use crate::middleware::SessionMiddleware;

/// Wraps a `reqwest` client or client builder with [`SessionMiddleware`].
pub trait ReqwestWithSession<A> {
    fn with_session(self, coordinator: SessionCoordinator) -> ReqwestWithSessionBuilder<A>;
}

impl ReqwestWithSession<Client> for Client {
    fn with_session(self, coordinator: SessionCoordinator) -> ReqwestWithSessionBuilder<Client> {
        ReqwestWithSessionBuilder {
            inner: self,
            middleware: SessionMiddleware::new(coordinator),
        }
    }
}

impl ReqwestWithSession<ClientBuilder> for ClientBuilder {
    fn with_session(
        self,
        coordinator: SessionCoordinator,
    ) -> ReqwestWithSessionBuilder<ClientBuilder> {
        ReqwestWithSessionBuilder {
            inner: self,
            middleware: SessionMiddleware::new(coordinator),
        }
    }
}

/// A `reqwest` [`Client`] or [`ClientBuilder`] paired with the [`SessionMiddleware`]
/// of one coordinator, waiting to be turned into a [`rqm::ClientWithMiddleware`].
///
/// Finish it with [`ReqwestWithSessionBuild::build`], or take the
/// [`rqm::ClientBuilder`] with [`ReqwestWithSessionBuild::builder`] to stack
/// more middleware after the session one.
pub struct ReqwestWithSessionBuilder<A> {
    inner: A,
    middleware: SessionMiddleware,
}

/// Turns a [`ReqwestWithSessionBuilder`] into a session-aware client.
///
/// Over a [`Client`] both steps are infallible. Over a [`ClientBuilder`] the
/// inner client is built first, so both return its `reqwest::Error`.
pub trait ReqwestWithSessionBuild {
    type BuildResult;
    type BuilderResult;

    /// The finished client, with only the session middleware installed.
    fn build(self) -> Self::BuildResult;
    /// The middleware client builder with the session middleware added first.
    fn builder(self) -> Self::BuilderResult;
}

impl ReqwestWithSessionBuild for ReqwestWithSessionBuilder<Client> {
    type BuildResult = rqm::ClientWithMiddleware;
    type BuilderResult = rqm::ClientBuilder;

    fn build(self) -> Self::BuildResult {
        self.builder().build()
    }

    fn builder(self) -> Self::BuilderResult {
        rqm::ClientBuilder::new(self.inner).with(self.middleware)
    }
}

impl ReqwestWithSessionBuild for ReqwestWithSessionBuilder<ClientBuilder> {
    type BuildResult = Result<rqm::ClientWithMiddleware, reqwest::Error>;
    type BuilderResult = Result<rqm::ClientBuilder, reqwest::Error>;

    fn build(self) -> Self::BuildResult {
        let builder = self.builder()?;
        Ok(builder.build())
    }

    fn builder(self) -> Self::BuilderResult {
        let client = self.inner.build()?;
        Ok(rqm::ClientBuilder::new(client).with(self.middleware))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::tests::{FakeAuthApi, seeded_store};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_client_builder_installs_session_middleware() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/member/points"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let coordinator =
            SessionCoordinator::builder(seeded_store().await, FakeAuthApi::new()).build();
        let client = Client::builder()
            .with_session(coordinator)
            .build()
            .unwrap();
        let res = client
            .get(format!("{}/member/points", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), http::StatusCode::OK);
    }
}
