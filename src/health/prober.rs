// src/health/prober.rs
use crate::config::HealthCheckConfig;
use crate::protocol::Endpoint;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("probe answered HTTP {0}")]
    Status(u16),

    #[error("probe failed: {0}")]
    Transport(String),
}

/// Liveness check against one backend.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), ProbeError>;
}

/// `GET {path}` over HTTP; only a 200 within the timeout counts as alive.
pub struct HttpProber {
    client: Client,
    path: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(config: &HealthCheckConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .no_proxy()
            .build()
            .context("Failed to create health check HTTP client")?;

        Ok(Self {
            client,
            path: config.path.clone(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), ProbeError> {
        let url = endpoint.url(&self.path);

        match timeout(self.timeout, self.client.get(url).send()).await {
            Ok(Ok(response)) if response.status() == StatusCode::OK => Ok(()),
            Ok(Ok(response)) => Err(ProbeError::Status(response.status().as_u16())),
            Ok(Err(e)) if e.is_timeout() => Err(ProbeError::Timeout(self.timeout)),
            Ok(Err(e)) => Err(ProbeError::Transport(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prober() -> HttpProber {
        let config = HealthCheckConfig {
            timeout_ms: 500,
            ..HealthCheckConfig::default()
        };
        HttpProber::new(&config).unwrap()
    }

    fn endpoint_of(server: &mockito::ServerGuard) -> Endpoint {
        server.host_with_port().parse().unwrap()
    }

    #[tokio::test]
    async fn healthy_backend_passes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body("OK")
            .create_async()
            .await;

        assert!(prober().probe(&endpoint_of(&server)).await.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(503)
            .create_async()
            .await;

        let err = prober().probe(&endpoint_of(&server)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Status(503)));
    }

    #[tokio::test]
    async fn only_200_counts_as_alive() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(204)
            .create_async()
            .await;

        let err = prober().probe(&endpoint_of(&server)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Status(204)));
    }

    #[tokio::test]
    async fn refused_connection_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::from(listener.local_addr().unwrap());
        drop(listener);

        let err = prober().probe(&endpoint).await.unwrap_err();
        assert!(matches!(err, ProbeError::Transport(_)));
    }
}
