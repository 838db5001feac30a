//! Chunk delivery with sequential multi-host failover.
//!
//! Hosts are tried in order and the first success wins; no concurrent
//! fan-out, to avoid duplicate load on the remote service. Classification
//! per attempt:
//!
//! - 2xx: done, return immediately.
//! - 4xx: the request itself is invalid; retrying elsewhere cannot help.
//! - timeout: try the next host, but do NOT mark this one down. A slow
//!   host under transient load is not a broken host.
//! - 5xx or transport error: mark the host down and try the next one.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::diff::ChangeOp;
use crate::emit;
use crate::error::{DeliveryError, SerializePayloadSnafu};
use crate::metrics::events::DeliveryCompleted;

use super::hosts::HostPool;
use super::transport::{DeliveryTransport, TransportRequest, TransportResponse};

/// Batch envelope accepted by the remote batch endpoint.
#[derive(Serialize)]
struct BatchPayload<'a> {
    requests: &'a [ChangeOp],
}

/// Result of delivering one group of operations.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    /// True when some host accepted the batch.
    pub ok: bool,
    /// Hosts tried before returning.
    pub attempts: usize,
    /// Status of the final attempt, when a response was received.
    pub status: Option<u16>,
    /// Failure detail of the final attempt.
    pub message: Option<String>,
    /// Serialized payload size that went on the wire.
    pub payload_bytes: usize,
}

/// Delivers operation batches to one account's candidate hosts.
pub struct DeliveryClient {
    transport: Arc<dyn DeliveryTransport>,
    hosts: HostPool,
    catalog: String,
}

impl DeliveryClient {
    pub fn new(transport: Arc<dyn DeliveryTransport>, hosts: HostPool, catalog: String) -> Self {
        Self {
            transport,
            hosts,
            catalog,
        }
    }

    /// Deliver one batch of operations to the index's batch endpoint.
    ///
    /// A failed delivery is a normal outcome (absorbed into run counters),
    /// not an error; `Err` means the payload could not even be built.
    pub async fn send_ops(
        &mut self,
        index: &str,
        ops: &[ChangeOp],
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let body = Bytes::from(
            serde_json::to_vec(&BatchPayload { requests: ops }).context(SerializePayloadSnafu)?,
        );
        let payload_bytes = body.len();

        let start = Instant::now();
        let mut attempts = 0;
        let mut last: Option<TransportResponse> = None;

        for host in self.hosts.candidates() {
            attempts += 1;
            let request = TransportRequest {
                method: "POST",
                url: format!("https://{host}/v1/catalogs/{index}/batch"),
                body: body.clone(),
            };

            let response = self.transport.send(request).await;

            if response.ok {
                debug!(
                    catalog = %self.catalog,
                    host = %host,
                    attempts,
                    ops = ops.len(),
                    bytes = payload_bytes,
                    "Chunk delivered"
                );
                emit!(DeliveryCompleted {
                    duration: start.elapsed(),
                    catalog: self.catalog.clone(),
                });
                return Ok(DeliveryOutcome {
                    ok: true,
                    attempts,
                    status: response.status,
                    message: None,
                    payload_bytes,
                });
            }

            match response.status {
                // Client error: the request is invalid, no host will differ.
                Some(status) if (400..500).contains(&status) => {
                    warn!(
                        catalog = %self.catalog,
                        host = %host,
                        status,
                        body = %response.body,
                        "Chunk rejected by remote service"
                    );
                    return Ok(failure_outcome(attempts, payload_bytes, response));
                }
                _ if response.timed_out => {
                    warn!(catalog = %self.catalog, host = %host, "Delivery attempt timed out, trying next host");
                }
                _ => {
                    warn!(
                        catalog = %self.catalog,
                        host = %host,
                        status = ?response.status,
                        error = ?response.error_message,
                        "Delivery attempt failed, marking host down"
                    );
                    self.hosts.mark_down(&host);
                }
            }

            last = Some(response);
        }

        emit!(DeliveryCompleted {
            duration: start.elapsed(),
            catalog: self.catalog.clone(),
        });
        Ok(failure_outcome(
            attempts,
            payload_bytes,
            last.unwrap_or_default(),
        ))
    }

    /// Host pool, exposed for failure diagnostics and tests.
    pub fn hosts(&self) -> &HostPool {
        &self.hosts
    }
}

fn failure_outcome(
    attempts: usize,
    payload_bytes: usize,
    response: TransportResponse,
) -> DeliveryOutcome {
    let message = response.error_message.or_else(|| {
        response
            .status
            .map(|status| format!("HTTP {status}: {}", response.body))
    });
    DeliveryOutcome {
        ok: false,
        attempts,
        status: response.status,
        message,
        payload_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::diff::DeleteRef;

    /// Transport that replays scripted responses and records URLs.
    struct ScriptedTransport {
        responses: Mutex<Vec<TransportResponse>>,
        urls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<TransportResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                urls: Mutex::new(Vec::new()),
            })
        }

        fn urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliveryTransport for ScriptedTransport {
        async fn send(&self, request: TransportRequest) -> TransportResponse {
            self.urls.lock().unwrap().push(request.url);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                ok_response()
            } else {
                responses.remove(0)
            }
        }
    }

    fn ok_response() -> TransportResponse {
        TransportResponse {
            ok: true,
            status: Some(200),
            ..Default::default()
        }
    }

    fn server_error() -> TransportResponse {
        TransportResponse {
            ok: false,
            status: Some(503),
            body: "unavailable".into(),
            ..Default::default()
        }
    }

    fn timeout_response() -> TransportResponse {
        TransportResponse {
            ok: false,
            error_message: Some("operation timed out".into()),
            timed_out: true,
            ..Default::default()
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> DeliveryClient {
        let hosts = HostPool::for_account("ACME1", "search-api.net", Duration::from_secs(300));
        DeliveryClient::new(transport, hosts, "products".into())
    }

    fn ops(n: usize) -> Vec<ChangeOp> {
        (0..n)
            .map(|i| ChangeOp::Delete(DeleteRef { key: format!("k{i}") }))
            .collect()
    }

    #[tokio::test]
    async fn test_first_host_success_stops_immediately() {
        let transport = ScriptedTransport::new(vec![ok_response()]);
        let mut client = client(transport.clone());

        let outcome = client.send_ops("products", &ops(2)).await.unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(
            transport.urls(),
            vec!["https://ACME1.search-api.net/v1/catalogs/products/batch"]
        );
    }

    #[tokio::test]
    async fn test_failover_marks_down_and_succeeds_on_third_host() {
        let transport =
            ScriptedTransport::new(vec![server_error(), server_error(), ok_response()]);
        let mut client = client(transport.clone());

        let outcome = client.send_ops("products", &ops(1)).await.unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(transport.urls().len(), 3);

        assert!(!client.hosts().is_available("ACME1.search-api.net"));
        assert!(!client.hosts().is_available("ACME1-1.search-api.net"));
        assert!(client.hosts().is_available("ACME1-2.search-api.net"));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![TransportResponse {
            ok: false,
            status: Some(422),
            body: "bad record".into(),
            ..Default::default()
        }]);
        let mut client = client(transport.clone());

        let outcome = client.send_ops("products", &ops(1)).await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.status, Some(422));
        // 4xx does not mean the host is unhealthy.
        assert!(client.hosts().is_available("ACME1.search-api.net"));
    }

    #[tokio::test]
    async fn test_timeout_does_not_mark_host_down() {
        let transport = ScriptedTransport::new(vec![timeout_response(), ok_response()]);
        let mut client = client(transport.clone());

        let outcome = client.send_ops("products", &ops(1)).await.unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.attempts, 2);
        // The slow host stays eligible for the next independent call.
        assert!(client.hosts().is_available("ACME1.search-api.net"));
    }

    #[tokio::test]
    async fn test_all_hosts_failing_returns_last_failure() {
        let transport = ScriptedTransport::new(vec![
            server_error(),
            server_error(),
            server_error(),
            TransportResponse {
                ok: false,
                status: Some(500),
                body: "boom".into(),
                ..Default::default()
            },
        ]);
        let mut client = client(transport.clone());

        let outcome = client.send_ops("products", &ops(1)).await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.status, Some(500));
        assert!(outcome.message.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_next_call_skips_downed_hosts() {
        let transport = ScriptedTransport::new(vec![server_error(), ok_response(), ok_response()]);
        let mut client = client(transport.clone());

        client.send_ops("products", &ops(1)).await.unwrap();
        client.send_ops("products", &ops(1)).await.unwrap();

        let urls = transport.urls();
        assert_eq!(urls.len(), 3);
        // Second call starts at the first still-healthy host.
        assert_eq!(
            urls[2],
            "https://ACME1-1.search-api.net/v1/catalogs/products/batch"
        );
    }

    #[tokio::test]
    async fn test_payload_is_batch_envelope() {
        struct CapturingTransport(Mutex<Vec<Bytes>>);

        #[async_trait]
        impl DeliveryTransport for CapturingTransport {
            async fn send(&self, request: TransportRequest) -> TransportResponse {
                self.0.lock().unwrap().push(request.body);
                ok_response()
            }
        }

        let transport = Arc::new(CapturingTransport(Mutex::new(Vec::new())));
        let hosts = HostPool::new(vec!["h.example".into()], Duration::from_secs(1));
        let mut client = DeliveryClient::new(transport.clone(), hosts, "products".into());

        client.send_ops("products", &ops(1)).await.unwrap();

        let bodies = transport.0.lock().unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&bodies[0]).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({
                "requests": [{"action": "delete", "body": {"objectID": "k0"}}]
            })
        );
    }
}
