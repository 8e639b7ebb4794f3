//
// src/proxy/pool.rs
//

use super::backend::{Backend, HealthStatus};
use crate::load_balancer::RoundRobin;
use crate::protocol::Endpoint;
use tokio::sync::Mutex;

/// Health state and routing cursor for a static set of backends.
///
/// Both live behind one mutex: selection snapshots the healthy subset, picks
/// from it and advances the cursor without releasing the lock. The lock is
/// never held across network I/O.
pub struct BackendPool {
    endpoints: Vec<Endpoint>,
    state: Mutex<PoolState>,
}

struct PoolState {
    backends: Vec<Backend>,
    cursor: RoundRobin,
}

impl BackendPool {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        let backends = endpoints.iter().cloned().map(Backend::new).collect();

        Self {
            endpoints,
            state: Mutex::new(PoolState {
                backends,
                cursor: RoundRobin::new(),
            }),
        }
    }

    /// The configured endpoints, in configuration order.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub async fn select_backend(&self) -> Option<Endpoint> {
        let mut state = self.state.lock().await;
        let PoolState { backends, cursor } = &mut *state;

        let healthy: Vec<usize> = backends
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_healthy())
            .map(|(i, _)| i)
            .collect();
        let index = *cursor.next(&healthy)?;

        let backend = &mut backends[index];
        backend.record_routed();
        Some(backend.endpoint.clone())
    }

    /// Apply a probe result. Returns the new status if it changed.
    pub async fn record_probe(&self, endpoint: &Endpoint, healthy: bool) -> Option<HealthStatus> {
        let mut state = self.state.lock().await;
        state
            .backends
            .iter_mut()
            .find(|b| &b.endpoint == endpoint)
            .and_then(|b| b.apply_probe(healthy))
    }

    /// Demote after a forwarding failure. Never promotes.
    pub async fn mark_unhealthy(&self, endpoint: &Endpoint) -> bool {
        let mut state = self.state.lock().await;
        let demoted = state
            .backends
            .iter_mut()
            .find(|b| &b.endpoint == endpoint)
            .map(Backend::demote)
            .unwrap_or(false);

        if demoted {
            tracing::warn!(backend = %endpoint, "Backend demoted after forwarding failure");
        }
        demoted
    }

    pub async fn healthy_endpoints(&self) -> Vec<Endpoint> {
        self.state
            .lock()
            .await
            .backends
            .iter()
            .filter(|b| b.is_healthy())
            .map(|b| b.endpoint.clone())
            .collect()
    }

    /// Point-in-time copy of every backend's bookkeeping.
    pub async fn snapshot(&self) -> Vec<Backend> {
        self.state.lock().await.backends.clone()
    }
}
