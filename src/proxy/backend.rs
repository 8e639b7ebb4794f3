// src/proxy/backend.rs
use crate::protocol::Endpoint;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// One configured backend as the balancer sees it. Lives under the pool lock,
/// so plain fields are enough.
#[derive(Debug, Clone)]
pub struct Backend {
    pub endpoint: Endpoint,

    status: HealthStatus,
    last_probe: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    routed_requests: u64,
    failed_forwards: u64,
}

impl Backend {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            status: HealthStatus::Unhealthy,
            last_probe: None,
            consecutive_failures: 0,
            routed_requests: 0,
            failed_forwards: 0,
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Record a probe result. Returns the new status when it changed.
    pub fn apply_probe(&mut self, healthy: bool) -> Option<HealthStatus> {
        self.last_probe = Some(Utc::now());
        if healthy {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }

        let next = if healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        let changed = next != self.status;
        self.status = next;
        changed.then_some(next)
    }

    /// Forwarding failure. Returns true if the backend was healthy until now.
    pub fn demote(&mut self) -> bool {
        self.failed_forwards += 1;
        let was_healthy = self.is_healthy();
        self.status = HealthStatus::Unhealthy;
        was_healthy
    }

    pub fn record_routed(&mut self) {
        self.routed_requests += 1;
    }

    pub fn last_probe(&self) -> Option<DateTime<Utc>> {
        self.last_probe
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn routed_requests(&self) -> u64 {
        self.routed_requests
    }

    pub fn failed_forwards(&self) -> u64 {
        self.failed_forwards
    }
}
