// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Load balancer
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
    pub backend_health_status: IntGaugeVec,
    pub backend_demotions_total: IntCounterVec,
    pub healthy_backends: IntGauge,
    pub total_backends: IntGauge,

    // Backend node
    pub node_requests_total: IntCounterVec,
    pub node_replication_total: IntCounterVec,
    pub node_store_keys: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("lb_requests_total", "Client requests by routing outcome"),
            &["outcome", "backend"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_request_duration_seconds",
                "Time from backend selection to end of relay",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let backend_health_status = IntGaugeVec::new(
            Opts::new(
                "lb_backend_health_status",
                "Backend health status (1=healthy, 0=unhealthy)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_health_status.clone()))?;

        let backend_demotions_total = IntCounterVec::new(
            Opts::new(
                "lb_backend_demotions_total",
                "Backends demoted after a forwarding failure",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_demotions_total.clone()))?;

        let healthy_backends =
            IntGauge::new("lb_healthy_backends", "Number of healthy backends")?;
        registry.register(Box::new(healthy_backends.clone()))?;

        let total_backends = IntGauge::new("lb_total_backends", "Total number of backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        let node_requests_total = IntCounterVec::new(
            Opts::new("node_requests_total", "Requests served by a backend node"),
            &["operation", "status_code"],
        )?;
        registry.register(Box::new(node_requests_total.clone()))?;

        let node_replication_total = IntCounterVec::new(
            Opts::new(
                "node_replication_total",
                "Replicate calls sent to peers by result",
            ),
            &["peer", "result"],
        )?;
        registry.register(Box::new(node_replication_total.clone()))?;

        let node_store_keys = IntGauge::new("node_store_keys", "Keys held in the local store")?;
        registry.register(Box::new(node_store_keys.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            backend_health_status,
            backend_demotions_total,
            healthy_backends,
            total_backends,
            node_requests_total,
            node_replication_total,
            node_store_keys,
        })
    }

    pub fn record_request(&self, outcome: &str, backend: &str, duration: std::time::Duration) {
        self.requests_total
            .with_label_values(&[outcome, backend])
            .inc();

        if !backend.is_empty() {
            self.request_duration_seconds
                .with_label_values(&[backend])
                .observe(duration.as_secs_f64());
        }
    }

    pub fn update_backend_health(&self, backend: &str, healthy: bool) {
        let value = if healthy { 1 } else { 0 };
        self.backend_health_status
            .with_label_values(&[backend])
            .set(value);
    }

    pub fn record_demotion(&self, backend: &str) {
        self.backend_demotions_total
            .with_label_values(&[backend])
            .inc();
        self.update_backend_health(backend, false);
    }

    pub fn update_backend_counts(&self, healthy: usize, total: usize) {
        self.healthy_backends.set(healthy as i64);
        self.total_backends.set(total as i64);
    }

    pub fn record_node_request(&self, operation: &str, status_code: u16) {
        self.node_requests_total
            .with_label_values(&[operation, &status_code.to_string()])
            .inc();
    }

    pub fn record_replication(&self, peer: &str, delivered: bool) {
        let result = if delivered { "delivered" } else { "failed" };
        self.node_replication_total
            .with_label_values(&[peer, result])
            .inc();
    }

    pub fn update_store_keys(&self, keys: usize) {
        self.node_store_keys.set(keys as i64);
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
