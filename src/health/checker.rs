// src/health/checker.rs
use super::prober::Prober;
use crate::config::HealthCheckConfig;
use crate::metrics::MetricsCollector;
use crate::protocol::Endpoint;
use crate::proxy::{BackendPool, HealthStatus};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Periodic prober. The only component that can promote a backend.
pub struct HealthChecker {
    config: HealthCheckConfig,
    pool: Arc<BackendPool>,
    prober: Arc<dyn Prober>,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct HealthCheckResult {
    pub endpoint: Endpoint,
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl HealthChecker {
    pub fn new(
        config: HealthCheckConfig,
        pool: Arc<BackendPool>,
        prober: Arc<dyn Prober>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Self {
            config,
            pool,
            prober,
            metrics,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Runs until `shutdown` is called. The first round starts immediately.
    pub async fn start(self: Arc<Self>) {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            "Starting health checker with interval: {:?}",
            self.config.interval()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all_backends().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// One probe round over every configured backend.
    pub async fn check_all_backends(&self) -> Vec<HealthCheckResult> {
        let checks = self
            .pool
            .endpoints()
            .iter()
            .map(|endpoint| self.check_backend(endpoint));
        let results = futures::future::join_all(checks).await;

        let healthy_count = self.pool.healthy_endpoints().await.len();
        let total_count = self.pool.endpoints().len();
        if let Some(metrics) = &self.metrics {
            metrics.update_backend_counts(healthy_count, total_count);
        }

        debug!(
            "Health check complete: {}/{} backends healthy",
            healthy_count, total_count
        );
        results
    }

    async fn check_backend(&self, endpoint: &Endpoint) -> HealthCheckResult {
        let start = Instant::now();
        let outcome = self.prober.probe(endpoint).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        let healthy = outcome.is_ok();
        let error = outcome.err().map(|e| e.to_string());

        let transition = self.pool.record_probe(endpoint, healthy).await;

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_health(&endpoint.to_string(), healthy);
        }

        match transition {
            Some(HealthStatus::Healthy) => {
                info!(backend = %endpoint, response_time_ms, "Backend is now healthy")
            }
            Some(HealthStatus::Unhealthy) => warn!(
                backend = %endpoint,
                error = error.as_deref().unwrap_or("unknown"),
                "Backend is now unhealthy"
            ),
            None if !healthy => debug!(
                backend = %endpoint,
                error = error.as_deref().unwrap_or("unknown"),
                "Backend still unhealthy"
            ),
            None => {}
        }

        HealthCheckResult {
            endpoint: endpoint.clone(),
            healthy,
            response_time_ms,
            error,
        }
    }
}
