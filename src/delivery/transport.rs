//! Delivery transport boundary.
//!
//! The transport performs exactly one HTTP exchange per call and never
//! retries internally; retry and failover policy belong to the delivery
//! client. Keeping the boundary this thin also makes the client fully
//! scriptable in tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::DeliveryError;

/// One delivery request: method, absolute URL, serialized payload.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: &'static str,
    pub url: String,
    pub body: Bytes,
}

/// Result of one transport exchange.
///
/// `ok` is true only for 2xx responses. A transport-level failure (connect
/// error, timeout) leaves `status` unset and fills `error_message`;
/// `timed_out` distinguishes slow hosts from broken ones for the host
/// health policy.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub ok: bool,
    pub status: Option<u16>,
    pub body: String,
    pub error_message: Option<String>,
    pub timed_out: bool,
}

/// A single-attempt HTTP exchange with the remote service.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> TransportResponse;
}

/// Production transport over `reqwest` with per-request timeout and
/// account credentials attached as headers.
pub struct HttpTransport {
    client: reqwest::Client,
    application_id: String,
    api_key: String,
}

impl HttpTransport {
    /// Build a transport with the given request timeout and credentials.
    pub fn new(
        timeout: Duration,
        application_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| DeliveryError::ClientBuild { source })?;

        Ok(Self {
            client,
            application_id: application_id.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> TransportResponse {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .unwrap_or(reqwest::Method::POST);

        debug!(method = request.method, url = %request.url, bytes = request.body.len(), "Delivery request");

        let result = self
            .client
            .request(method, &request.url)
            .header("X-Application-Id", &self.application_id)
            .header("X-Api-Key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request.body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let ok = response.status().is_success();
                let body = response.text().await.unwrap_or_default();
                TransportResponse {
                    ok,
                    status: Some(status),
                    body,
                    error_message: None,
                    timed_out: false,
                }
            }
            Err(e) => TransportResponse {
                ok: false,
                status: e.status().map(|s| s.as_u16()),
                body: String::new(),
                error_message: Some(e.to_string()),
                timed_out: e.is_timeout(),
            },
        }
    }
}
