// src/node/replication.rs
use crate::config::ReplicationConfig;
use crate::metrics::MetricsCollector;
use crate::protocol::Endpoint;
use anyhow::Result;
use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request, Uri};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("peer timed out")]
    Timeout,

    #[error("peer answered HTTP {0}")]
    Status(u16),

    #[error("peer unreachable: {0}")]
    Transport(String),
}

impl From<hyper::Error> for ReplicationError {
    fn from(err: hyper::Error) -> Self {
        ReplicationError::Transport(err.to_string())
    }
}

/// What happened to one fan-out. Informational only: it never changes the
/// answer given to the writing client.
#[derive(Debug, Default)]
pub struct ReplicationReport {
    pub delivered: Vec<Endpoint>,
    pub failed: Vec<(Endpoint, ReplicationError)>,
}

/// Best-effort copy of client writes to a fixed peer list.
///
/// Requests go out through hyper with an `http::Uri`, which keeps the key's
/// path bytes as received (no dot-segment or slash normalisation).
pub struct Replicator {
    peers: Vec<Endpoint>,
    client: Client<HttpConnector>,
    timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Replicator {
    pub fn new(
        peers: Vec<Endpoint>,
        config: &ReplicationConfig,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self> {
        Ok(Self {
            peers,
            client: Client::builder().build_http(),
            timeout: config.timeout(),
            metrics,
        })
    }

    pub fn peers(&self) -> &[Endpoint] {
        &self.peers
    }

    /// Send `replicate(key, value)` to each peer in turn. Failures are logged
    /// and dropped; there is no retry and no rollback.
    pub async fn fan_out(&self, key: &str, value: Bytes) -> ReplicationReport {
        let mut report = ReplicationReport::default();

        for peer in &self.peers {
            let result = self.replicate_to(peer, key, value.clone()).await;

            if let Some(metrics) = &self.metrics {
                metrics.record_replication(&peer.to_string(), result.is_ok());
            }

            match result {
                Ok(()) => {
                    debug!(peer = %peer, key, "replicated");
                    report.delivered.push(peer.clone());
                }
                Err(err) => {
                    warn!(peer = %peer, key, error = %err, "replication to peer failed");
                    report.failed.push((peer.clone(), err));
                }
            }
        }

        report
    }

    async fn replicate_to(
        &self,
        peer: &Endpoint,
        key: &str,
        value: Bytes,
    ) -> Result<(), ReplicationError> {
        let uri: Uri = peer
            .url(&format!("/replicate/{}", key))
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| ReplicationError::Transport(e.to_string()))?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::from(value))
            .map_err(|e| ReplicationError::Transport(e.to_string()))?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| ReplicationError::Timeout)??;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ReplicationError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn replicator(peers: Vec<Endpoint>) -> Replicator {
        let config = ReplicationConfig { timeout_ms: 500 };
        Replicator::new(peers, &config, None).unwrap()
    }

    #[tokio::test]
    async fn sends_key_and_body_to_every_peer() {
        let mut first = mockito::Server::new_async().await;
        let mut second = mockito::Server::new_async().await;
        let mocks = [
            first
                .mock("POST", "/replicate/foo")
                .match_body(Matcher::Exact("bar".into()))
                .with_status(200)
                .create_async()
                .await,
            second
                .mock("POST", "/replicate/foo")
                .match_body(Matcher::Exact("bar".into()))
                .with_status(200)
                .create_async()
                .await,
        ];

        let peers = vec![
            first.host_with_port().parse().unwrap(),
            second.host_with_port().parse().unwrap(),
        ];
        let report = replicator(peers)
            .fan_out("foo", Bytes::from_static(b"bar"))
            .await;

        assert_eq!(report.delivered.len(), 2);
        assert!(report.failed.is_empty());
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn failed_peers_do_not_stop_the_fan_out() {
        let dead = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            Endpoint::from(listener.local_addr().unwrap())
        };
        let mut rejecting = mockito::Server::new_async().await;
        rejecting
            .mock("POST", "/replicate/foo")
            .with_status(500)
            .create_async()
            .await;
        let mut healthy = mockito::Server::new_async().await;
        let accepted = healthy
            .mock("POST", "/replicate/foo")
            .with_status(200)
            .create_async()
            .await;

        let peers = vec![
            dead.clone(),
            rejecting.host_with_port().parse().unwrap(),
            healthy.host_with_port().parse().unwrap(),
        ];
        let report = replicator(peers)
            .fan_out("foo", Bytes::from_static(b"bar"))
            .await;

        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].0, dead);
        assert!(matches!(report.failed[0].1, ReplicationError::Transport(_)));
        assert!(matches!(report.failed[1].1, ReplicationError::Status(500)));
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn key_path_is_sent_verbatim() {
        let mut peer = mockito::Server::new_async().await;
        let exact = peer
            .mock("POST", "/replicate/x/../y")
            .match_body(Matcher::Exact("v".into()))
            .with_status(200)
            .create_async()
            .await;
        let normalised = peer
            .mock("POST", "/replicate/y")
            .expect(0)
            .create_async()
            .await;

        let report = replicator(vec![peer.host_with_port().parse().unwrap()])
            .fan_out("x/../y", Bytes::from_static(b"v"))
            .await;

        assert_eq!(report.delivered.len(), 1);
        exact.assert_async().await;
        normalised.assert_async().await;
    }

    #[tokio::test]
    async fn slow_peer_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = Endpoint::from(listener.local_addr().unwrap());
        let _stall = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        });

        let report = replicator(vec![peer]).fan_out("k", Bytes::from_static(b"v")).await;
        assert!(matches!(report.failed[0].1, ReplicationError::Timeout));
    }

    #[tokio::test]
    async fn no_peers_means_nothing_to_do() {
        let report = replicator(vec![]).fan_out("k", Bytes::new()).await;
        assert!(report.delivered.is_empty() && report.failed.is_empty());
    }
}
