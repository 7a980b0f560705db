//! HTTP transport for APNs requests.
//!
//! The dispatcher only needs "POST these headers and this body, tell me the
//! status and body". [`PushTransport`] is that seam; [`HttpTransport`] is the
//! `reqwest` implementation used in production.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// One APNs request, fully resolved.
#[derive(Debug, Clone)]
pub struct PushRequest {
    /// `{endpoint}/3/device/{token}`.
    pub url: String,
    /// Provider token, sent as `authorization: bearer {token}`.
    pub authorization: String,
    /// Bundle ID, sent as `apns-topic`.
    pub topic: String,
    /// JSON payload.
    pub body: Bytes,
}

/// What came back from APNs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// `apns-id` response header, if present.
    pub apns_id: Option<String>,
    /// Raw response body (JSON on errors, usually empty on success).
    pub body: String,
}

/// The request never produced an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The per-request timeout elapsed.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// No connection could be established.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Any other client-side failure.
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Sends a single APNs request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// POST `request` and return whatever HTTP response arrived.
    async fn post(&self, request: &PushRequest) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Build a client.
    ///
    /// APNs only speaks HTTP/2. ALPN negotiates it over TLS, but reqwest
    /// still opens HTTP/1.1 unless told otherwise, so production wants
    /// `http2_prior_knowledge`. Tests against a plain HTTP mock turn it off.
    pub fn new(request_timeout: Duration, http2_prior_knowledge: bool) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().pool_idle_timeout(Duration::from_secs(300));
        if http2_prior_knowledge {
            builder = builder.http2_prior_knowledge();
        }
        Ok(Self {
            client: builder.build()?,
            request_timeout,
        })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }
}

#[async_trait]
impl PushTransport for HttpTransport {
    async fn post(&self, request: &PushRequest) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(&request.url)
            .header("authorization", format!("bearer {}", request.authorization))
            .header("apns-topic", &request.topic)
            .header("apns-push-type", "alert")
            .header(CONTENT_TYPE, "application/json")
            .body(request.body.clone())
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let apns_id = response
            .headers()
            .get("apns-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.text().await.unwrap_or_default();

        Ok(TransportResponse {
            status,
            apns_id,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(server: &MockServer) -> PushRequest {
        PushRequest {
            url: format!("{}/3/device/ABCD", server.uri()),
            authorization: "signed.jwt.value".to_string(),
            topic: "com.example.courier".to_string(),
            body: Bytes::from_static(br#"{"aps":{"alert":{"body":"hi"},"sound":"default"}}"#),
        }
    }

    fn transport(timeout: Duration) -> HttpTransport {
        HttpTransport::new(timeout, false).unwrap()
    }

    #[tokio::test]
    async fn sends_apns_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/3/device/ABCD"))
            .and(header("authorization", "bearer signed.jwt.value"))
            .and(header("apns-topic", "com.example.courier"))
            .and(header("apns-push-type", "alert"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({"aps": {"alert": {"body": "hi"}, "sound": "default"}})))
            .respond_with(ResponseTemplate::new(200).insert_header("apns-id", "EC1BF194-B3B2-424A-89A9-5A918A6E6B5E"))
            .expect(1)
            .mount(&server)
            .await;

        let response = transport(DEFAULT_REQUEST_TIMEOUT).post(&request(&server)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.apns_id.as_deref(), Some("EC1BF194-B3B2-424A-89A9-5A918A6E6B5E"));
    }

    #[tokio::test]
    async fn error_status_is_a_response_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(410).set_body_json(serde_json::json!({"reason": "Unregistered"})))
            .mount(&server)
            .await;

        let response = transport(DEFAULT_REQUEST_TIMEOUT).post(&request(&server)).await.unwrap();

        assert_eq!(response.status, 410);
        assert!(response.body.contains("Unregistered"));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let result = transport(Duration::from_millis(100)).post(&request(&server)).await;

        assert_matches!(result, Err(TransportError::Timeout(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let req = PushRequest {
            url: "http://127.0.0.1:1/3/device/ABCD".to_string(),
            authorization: "x".to_string(),
            topic: "t".to_string(),
            body: Bytes::new(),
        };

        let result = transport(Duration::from_secs(2)).post(&req).await;

        assert!(result.is_err());
    }

    #[test]
    fn transport_error_display() {
        let err = TransportError::Connect("refused".to_string());
        assert_eq!(err.to_string(), "connection failed: refused");
    }
}
