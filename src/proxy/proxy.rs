// ────────────────────────────────
// src/proxy/proxy.rs
// Raw byte forwarding from clients to the selected backend.
// ────────────────────────────────

use super::pool::BackendPool;
use crate::config::ForwardingConfig;
use crate::metrics::{MetricsCollector, Timer};
use crate::protocol::{read_request, write_response, Endpoint, FramingError, READ_CHUNK};
use anyhow::Result;
use hyper::StatusCode;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

pub struct Proxy {
    config: ForwardingConfig,
    pool: Arc<BackendPool>,
    metrics: Option<Arc<MetricsCollector>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No healthy backends available")]
    NoHealthyBackends,

    #[error("Backend {endpoint} unreachable: {source}")]
    BackendUnreachable {
        endpoint: Endpoint,
        relayed: u64,
        #[source]
        source: io::Error,
    },

    #[error("Client connection failed: {0}")]
    Client(#[source] io::Error),
}

impl ProxyError {
    /// Status to send back, if the client is still there to receive it.
    /// A backend failure after a partial relay is still answered with 502,
    /// appended to whatever was already streamed.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ProxyError::NoHealthyBackends => Some(StatusCode::SERVICE_UNAVAILABLE),
            ProxyError::BackendUnreachable { .. } => Some(StatusCode::BAD_GATEWAY),
            ProxyError::Client(_) => None,
        }
    }

    pub fn body(&self) -> &'static [u8] {
        match self {
            ProxyError::NoHealthyBackends => b"No backends alive\n",
            ProxyError::BackendUnreachable { .. } => b"Bad Gateway\n",
            ProxyError::Client(_) => b"",
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            ProxyError::NoHealthyBackends => "no_backend",
            ProxyError::BackendUnreachable { .. } => "bad_gateway",
            ProxyError::Client(_) => "client_error",
        }
    }
}

enum ForwardError {
    Backend { relayed: u64, source: io::Error },
    Client(io::Error),
}

impl Proxy {
    pub fn new(
        config: ForwardingConfig,
        pool: Arc<BackendPool>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            config,
            pool,
            metrics,
        }
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    /// Accept clients until `shutdown` resolves, one task per connection.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr()?;
        info!("Load balancer listening on {}", local);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(%err, "accept failed");
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Load balancer on {} shutting down", local);
                    return Ok(());
                }
            };

            let proxy = self.clone();
            let span = tracing::info_span!("lb_request", request_id = %Uuid::new_v4(), %peer);
            tokio::spawn(async move { proxy.handle_connection(stream, peer).await }.instrument(span));
        }
    }

    /// Read one request from the client, route it, answer any failure.
    pub async fn handle_connection<S>(&self, mut stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let read = read_request(&mut stream, self.config.max_request_bytes);
        let request = match timeout(self.config.client_read_timeout(), read).await {
            Ok(Ok(Some(request))) => request,
            Ok(Ok(None)) => return,
            Ok(Err(err)) => {
                self.reject(&mut stream, peer, err).await;
                return;
            }
            Err(_) => {
                debug!(%peer, "client did not send a complete request in time");
                return;
            }
        };

        debug!(method = %request.head.method, path = %request.head.path, "request received");

        if let Err(err) = self.route(&request.bytes, &mut stream).await {
            if let Some(status) = err.status() {
                if let Err(e) = write_response(&mut stream, status, err.body()).await {
                    debug!(%peer, error = %e, "could not deliver error response");
                }
            }
        }
        let _ = stream.shutdown().await;
    }

    async fn reject<S>(&self, stream: &mut S, peer: SocketAddr, err: FramingError)
    where
        S: AsyncWrite + Unpin,
    {
        if !err.is_client_error() {
            debug!(%peer, error = %err, "client read failed");
            return;
        }

        debug!(%peer, error = %err, "rejecting malformed request");
        if let Some(metrics) = &self.metrics {
            metrics.record_request("bad_request", "", Duration::ZERO);
        }
        let _ = write_response(stream, StatusCode::BAD_REQUEST, b"Bad Request").await;
        let _ = stream.shutdown().await;
    }

    /// Pick a healthy backend and relay `request` to it, streaming the answer
    /// into `client`. No retry: a failure demotes the backend and surfaces.
    pub async fn route<W>(&self, request: &[u8], client: &mut W) -> Result<Endpoint, ProxyError>
    where
        W: AsyncWrite + Unpin,
    {
        let timer = Timer::new();
        let result = self.route_inner(request, client).await;

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(endpoint) => {
                    metrics.record_request("forwarded", &endpoint.to_string(), timer.elapsed())
                }
                Err(ProxyError::BackendUnreachable { endpoint, .. }) => {
                    metrics.record_request("bad_gateway", &endpoint.to_string(), timer.elapsed())
                }
                Err(err) => metrics.record_request(err.outcome(), "", timer.elapsed()),
            }
        }
        result
    }

    async fn route_inner<W>(&self, request: &[u8], client: &mut W) -> Result<Endpoint, ProxyError>
    where
        W: AsyncWrite + Unpin,
    {
        let endpoint = match self.pool.select_backend().await {
            Some(endpoint) => endpoint,
            None => {
                warn!("No healthy backend for request");
                return Err(ProxyError::NoHealthyBackends);
            }
        };
        debug!(backend = %endpoint, "forwarding request");

        match self.forward(&endpoint, request, client).await {
            Ok(relayed) => {
                debug!(backend = %endpoint, relayed, "response relayed");
                Ok(endpoint)
            }
            Err(ForwardError::Backend { relayed, source }) => {
                warn!(backend = %endpoint, relayed, error = %source, "forwarding failed");
                if self.pool.mark_unhealthy(&endpoint).await {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_demotion(&endpoint.to_string());
                    }
                }
                Err(ProxyError::BackendUnreachable {
                    endpoint,
                    relayed,
                    source,
                })
            }
            Err(ForwardError::Client(source)) => {
                debug!(backend = %endpoint, error = %source, "client went away during relay");
                Err(ProxyError::Client(source))
            }
        }
    }

    async fn forward<W>(
        &self,
        endpoint: &Endpoint,
        request: &[u8],
        client: &mut W,
    ) -> Result<u64, ForwardError>
    where
        W: AsyncWrite + Unpin,
    {
        let backend_err =
            |relayed: u64| move |source: io::Error| ForwardError::Backend { relayed, source };
        let io_timeout = self.config.io_timeout();

        let mut backend = bounded(
            self.config.connect_timeout(),
            TcpStream::connect((endpoint.host(), endpoint.port())),
        )
        .await
        .map_err(backend_err(0))?;

        bounded(io_timeout, backend.write_all(request))
            .await
            .map_err(backend_err(0))?;

        let mut buf = [0u8; READ_CHUNK];
        let mut relayed = 0u64;
        loop {
            let n = bounded(io_timeout, backend.read(&mut buf))
                .await
                .map_err(backend_err(relayed))?;
            if n == 0 {
                break;
            }
            client
                .write_all(&buf[..n])
                .await
                .map_err(ForwardError::Client)?;
            relayed += n as u64;
        }

        if relayed == 0 {
            return Err(ForwardError::Backend {
                relayed,
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "backend closed without responding",
                ),
            });
        }

        client.flush().await.map_err(ForwardError::Client)?;
        Ok(relayed)
    }
}

async fn bounded<T, F>(limit: Duration, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no progress within {:?}", limit),
        )),
    }
}
