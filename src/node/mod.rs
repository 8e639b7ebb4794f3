// src/node/mod.rs
mod replication;
mod service;
mod store;

pub use replication::{ReplicationError, ReplicationReport, Replicator};
pub use service::{NodeService, Route};
pub use store::KeyValueStore;

use crate::config::NodeConfig;
use crate::metrics::MetricsCollector;
use crate::server::ServerBuilder;
use anyhow::Result;
use hyper::body::Bytes;
use hyper::{Body, Response, StatusCode};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl NodeError {
    pub fn status(&self) -> StatusCode {
        match self {
            NodeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            NodeError::NotFound(_) => StatusCode::NOT_FOUND,
            NodeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response(self) -> Response<Body> {
        let body = match &self {
            NodeError::BadRequest(_) => "Bad Request",
            NodeError::NotFound(_) => "NOTFOUND",
            NodeError::Internal(_) => "Error",
        };
        debug!(error = %self, "request failed");
        service::text(self.status(), body)
    }
}

/// A backend node: one local store plus a replication peer list.
pub struct Node {
    config: NodeConfig,
    store: KeyValueStore,
    replicator: Replicator,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Node {
    pub fn new(config: NodeConfig, metrics: Option<Arc<MetricsCollector>>) -> Result<Self> {
        let replicator = Replicator::new(
            config.peers.clone(),
            &config.replication,
            metrics.clone(),
        )?;

        Ok(Self {
            config,
            store: KeyValueStore::new(),
            replicator,
            metrics,
        })
    }

    pub fn peers(&self) -> &[crate::protocol::Endpoint] {
        self.replicator.peers()
    }

    pub(crate) fn metrics(&self) -> Option<&MetricsCollector> {
        self.metrics.as_deref()
    }

    pub fn service(self: &Arc<Self>) -> NodeService {
        NodeService::new(self.clone())
    }

    /// Liveness only; says nothing about store contents or replication lag.
    pub fn probe(&self) -> &'static str {
        "OK"
    }

    /// Local state only, peers are never consulted.
    pub async fn read(&self, key: &str) -> Result<Bytes, NodeError> {
        self.store
            .get(key)
            .await
            .ok_or_else(|| NodeError::NotFound(key.to_string()))
    }

    /// Store locally, then fan out to peers outside the store lock. Always
    /// succeeds once the local store holds the value.
    pub async fn write(&self, key: String, value: Bytes) -> ReplicationReport {
        self.store.put(key.clone(), value.clone()).await;
        self.update_key_count().await;

        let report = self.replicator.fan_out(&key, value).await;
        if !report.failed.is_empty() {
            debug!(
                key = %key,
                delivered = report.delivered.len(),
                failed = report.failed.len(),
                "write accepted with partial replication"
            );
        }
        report
    }

    /// Write coming from a peer. Stored locally and never forwarded again.
    pub async fn replicate(&self, key: String, value: Bytes) {
        self.store.put(key, value).await;
        self.update_key_count().await;
    }

    async fn update_key_count(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.update_store_keys(self.store.len().await);
        }
    }

    /// Serve the node protocol on `listener` until `shutdown` resolves.
    pub async fn run<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            listen = %self.config.listen,
            peers = ?self.peers().iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Starting backend node"
        );

        ServerBuilder::from_listener(listener)
            .with_handler(self.service())
            .with_connection_timeout(self.config.request_timeout())
            .with_shutdown(shutdown)
            .serve()
            .await
    }
}
