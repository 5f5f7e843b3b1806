//! Out-of-band liveness probe.
//!
//! While connected the session probes the service's HTTP health endpoint on
//! a slow interval. A probe only annotates status: a failure sets an
//! advisory error, a later success clears it, and neither touches the
//! connection state machine.

use std::time::Duration;

use async_trait::async_trait;
use pcforge_core::SessionError;
use pcforge_core::errors::classify::{classify_probe_failure, classify_probe_status};
use tracing::debug;

use crate::errors::ClientError;

/// One liveness check.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe the service. `Ok` means healthy.
    async fn check(&self) -> Result<(), SessionError>;
}

/// `GET` against a fixed health URL; any 2xx is healthy.
#[derive(Clone, Debug)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    /// Build a probe for `url` with a per-request timeout.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl {
                url: url.to_owned(),
                reason: "scheme must be http or https".into(),
            });
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_owned(),
        })
    }

    /// The probed URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self) -> Result<(), SessionError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| classify_probe_failure(&e.to_string()))?;
        let status = response.status().as_u16();
        debug!(url = %self.url, status, "health probe response");
        match classify_probe_status(status) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pcforge_core::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn probe_for(server: &MockServer) -> HttpHealthProbe {
        HttpHealthProbe::new(&format!("{}/health", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn healthy_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        probe_for(&server).await.check().await.unwrap();
    }

    #[tokio::test]
    async fn no_content_is_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        assert!(probe_for(&server).await.check().await.is_ok());
    }

    #[tokio::test]
    async fn server_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = probe_for(&server).await.check().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Server);
        assert!(err.message.contains("503"));
    }

    #[tokio::test]
    async fn throttled_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = probe_for(&server).await.check().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn slow_response_times_out_as_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let probe = HttpHealthProbe::new(
            &format!("{}/health", server.uri()),
            Duration::from_millis(100),
        )
        .unwrap();
        let err = probe.check().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
    }

    #[tokio::test]
    async fn unreachable_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe =
            HttpHealthProbe::new(&format!("http://{addr}/health"), Duration::from_secs(1)).unwrap();
        let err = probe.check().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert!(err.retryable);
    }

    #[test]
    fn rejects_non_http_url() {
        assert_matches!(
            HttpHealthProbe::new("ws://localhost/health", Duration::from_secs(5)),
            Err(ClientError::InvalidUrl { .. })
        );
    }
}
