// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use hyper::{server::conn::Http, Body, Request, Response};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::Service;

/// Builder pattern so callers can inject the node handler (or any handler).
///
/// Connections are HTTP/1 only and closed after one response, matching the
/// one-request-per-connection framing the load balancer relays.
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    listener: TcpListener,
    handler: Option<H>,
    shutdown: Option<BoxFuture<'static, ()>>,
    connection_timeout: Duration,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    /// Serve on an already bound listener, see [`crate::server::bind_tcp`].
    pub fn from_listener(listener: TcpListener) -> Self {
        Self {
            listener,
            handler: None,
            shutdown: None,
            connection_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Stop accepting once `signal` resolves. In-flight connections finish.
    pub fn with_shutdown<F>(mut self, signal: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.shutdown = Some(Box::pin(signal));
        self
    }

    /// Upper bound for reading, handling and answering one connection.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Consume the builder and spawn one Hyper task per accepted connection.
    pub async fn serve(self) -> Result<()> {
        let Self {
            listener,
            handler,
            shutdown,
            connection_timeout,
        } = self;
        let handler = handler.context("handler must be set via with_handler()")?;
        let local = listener.local_addr()?;
        tracing::info!("HTTP server listening on {}", local);

        let mut shutdown: BoxFuture<'static, ()> = match shutdown {
            Some(signal) => signal,
            None => Box::pin(futures::future::pending()),
        };

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        tracing::warn!(%err, "accept failed");
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    tracing::info!("HTTP server on {} shutting down", local);
                    return Ok(());
                }
            };
            let svc = handler.clone();

            // One Tokio task per connection.
            tokio::spawn(async move {
                let mut http = Http::new();
                http.http1_only(true).http1_keep_alive(false);
                let connection = http.serve_connection(stream, svc);

                match tokio::time::timeout(connection_timeout, connection).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => tracing::warn!(%peer, %err, "connection error"),
                    Err(_) => tracing::warn!(%peer, "connection timed out"),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::bind_tcp;
    use std::convert::Infallible;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[derive(Clone)]
    struct Hello;

    impl Service<Request<Body>> for Hello {
        type Response = Response<Body>;
        type Error = Infallible;
        type Future = futures::future::Ready<Result<Response<Body>, Infallible>>;

        fn poll_ready(
            &mut self,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Body>) -> Self::Future {
            futures::future::ready(Ok(Response::new(Body::from("hello"))))
        }
    }

    #[tokio::test]
    async fn answers_once_and_closes_then_stops_on_shutdown() {
        let listener = bind_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(
            ServerBuilder::from_listener(listener)
                .with_handler(Hello)
                .with_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .serve(),
        );

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("hello"));

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn serve_without_handler_fails() {
        let listener = bind_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let result = ServerBuilder::<Hello>::from_listener(listener).serve().await;
        assert!(result.is_err());
    }
}
