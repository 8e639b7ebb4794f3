// src/config/models.rs
use crate::protocol::Endpoint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

/// A process runs either as a backend node or as the load balancer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Config {
    Node(NodeConfig),
    Balancer(BalancerConfig),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("balancer needs at least one backend")]
    NoBackends,

    #[error("endpoint {0} is listed more than once")]
    DuplicateEndpoint(Endpoint),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

impl Config {
    pub fn listen(&self) -> SocketAddr {
        match self {
            Config::Node(node) => node.listen,
            Config::Balancer(balancer) => balancer.listen,
        }
    }

    pub fn metrics(&self) -> &MetricsConfig {
        match self {
            Config::Node(node) => &node.metrics,
            Config::Balancer(balancer) => &balancer.metrics,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Config::Node(node) => {
                unique(&node.peers)?;
                non_zero("replication.timeout_ms", node.replication.timeout_ms)?;
                non_zero("request_timeout_ms", node.request_timeout_ms)?;
            }
            Config::Balancer(balancer) => {
                if balancer.backends.is_empty() {
                    return Err(ConfigError::NoBackends);
                }
                unique(&balancer.backends)?;
                non_zero("health_check.interval_ms", balancer.health_check.interval_ms)?;
                non_zero("health_check.timeout_ms", balancer.health_check.timeout_ms)?;
                non_zero(
                    "forwarding.connect_timeout_ms",
                    balancer.forwarding.connect_timeout_ms,
                )?;
                non_zero("forwarding.io_timeout_ms", balancer.forwarding.io_timeout_ms)?;
                non_zero(
                    "forwarding.client_read_timeout_ms",
                    balancer.forwarding.client_read_timeout_ms,
                )?;
            }
        }
        Ok(())
    }
}

fn unique(endpoints: &[Endpoint]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for endpoint in endpoints {
        if !seen.insert(endpoint) {
            return Err(ConfigError::DuplicateEndpoint(endpoint.clone()));
        }
    }
    Ok(())
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::ZeroDuration(field))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub listen: SocketAddr,

    /// Nodes that receive a copy of every client write.
    #[serde(default)]
    pub peers: Vec<Endpoint>,

    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Upper bound on one connection, fan-out included.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl NodeConfig {
    pub fn new(listen: SocketAddr, peers: Vec<Endpoint>) -> Self {
        Self {
            listen,
            peers,
            replication: ReplicationConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
            metrics: MetricsConfig::default(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Per-peer timeout for one replicate call.
    pub timeout_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self { timeout_ms: 2000 }
    }
}

impl ReplicationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    pub listen: SocketAddr,

    pub backends: Vec<Endpoint>,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub forwarding: ForwardingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl BalancerConfig {
    pub fn new(listen: SocketAddr, backends: Vec<Endpoint>) -> Self {
        Self {
            listen,
            backends,
            health_check: HealthCheckConfig::default(),
            forwarding: ForwardingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            timeout_ms: 2000,
            path: "/health".to_string(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardingConfig {
    pub connect_timeout_ms: u64,
    /// Applies to each write to and each read from the backend.
    pub io_timeout_ms: u64,
    /// Time a client gets to deliver its complete request.
    pub client_read_timeout_ms: u64,
    pub max_request_bytes: usize,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            io_timeout_ms: 5000,
            client_read_timeout_ms: 3000,
            max_request_bytes: 1024 * 1024,
        }
    }
}

impl ForwardingConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn client_read_timeout(&self) -> Duration {
        Duration::from_millis(self.client_read_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9100,
            path: "/metrics".to_string(),
        }
    }
}
