// src/load_balancer/mod.rs
mod round_robin;

pub use round_robin::RoundRobin;

use crate::config::BalancerConfig;
use crate::health::{HealthChecker, HttpProber, Prober};
use crate::metrics::MetricsCollector;
use crate::proxy::{BackendPool, Proxy};
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Health-checked, round-robin entry point in front of a static set of nodes.
pub struct LoadBalancer {
    pool: Arc<BackendPool>,
    proxy: Arc<Proxy>,
    health: Arc<HealthChecker>,
}

impl LoadBalancer {
    pub fn new(config: BalancerConfig, metrics: Option<Arc<MetricsCollector>>) -> Result<Self> {
        let prober = HttpProber::new(&config.health_check)?;
        Ok(Self::with_prober(config, Arc::new(prober), metrics))
    }

    pub fn with_prober(
        config: BalancerConfig,
        prober: Arc<dyn Prober>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let pool = Arc::new(BackendPool::new(config.backends));
        if let Some(metrics) = &metrics {
            metrics.update_backend_counts(0, pool.endpoints().len());
        }

        let health = Arc::new(HealthChecker::new(
            config.health_check,
            pool.clone(),
            prober,
            metrics.clone(),
        ));
        let proxy = Arc::new(Proxy::new(config.forwarding, pool.clone(), metrics));

        Self {
            pool,
            proxy,
            health,
        }
    }

    pub fn pool(&self) -> Arc<BackendPool> {
        self.pool.clone()
    }

    pub fn proxy(&self) -> Arc<Proxy> {
        self.proxy.clone()
    }

    /// Spawn the health loop, then accept clients until `shutdown` resolves.
    pub async fn run<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let health_task = tokio::spawn(self.health.clone().start());

        let served = self.proxy.clone().serve(listener, shutdown).await;

        self.health.shutdown();
        health_task.await.context("health checker task failed")?;
        served
    }
}
