// src/main.rs
use anyhow::Result;
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use kv_balancer::{
    config::{self, Config, MetricsConfig},
    load_balancer::LoadBalancer,
    metrics::MetricsRegistry,
    node::Node,
    server::bind_tcp,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kv_balancer=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    // Initialize metrics
    let metrics_registry = MetricsRegistry::new()?;
    let metrics = metrics_registry.collector();
    start_metrics_server(config.metrics(), metrics_registry);

    let listener = bind_tcp(config.listen()).await?;

    match config {
        Config::Node(node_config) => {
            let node = Arc::new(Node::new(node_config, Some(metrics))?);
            node.run(listener, shutdown_signal()).await?;
        }
        Config::Balancer(balancer_config) => {
            info!(
                backends = balancer_config.backends.len(),
                interval = ?balancer_config.health_check.interval(),
                "Starting load balancer"
            );
            let balancer = LoadBalancer::new(balancer_config, Some(metrics))?;
            balancer.run(listener, shutdown_signal()).await?;
        }
    }

    info!("Stopped");
    Ok(())
}

fn start_metrics_server(config: &MetricsConfig, registry: MetricsRegistry) {
    if !config.enabled {
        return;
    }

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(config.path.clone());
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    let response = if req.uri().path() == path.as_str() {
                        match registry.gather() {
                            Ok(metrics) => {
                                let mut response = Response::new(Body::from(metrics));
                                response.headers_mut().insert(
                                    hyper::header::CONTENT_TYPE,
                                    hyper::header::HeaderValue::from_static(
                                        "text/plain; version=0.0.4",
                                    ),
                                );
                                response
                            }
                            Err(e) => {
                                error!("Failed to encode metrics: {}", e);
                                status_response(StatusCode::INTERNAL_SERVER_ERROR, "Error")
                            }
                        }
                    } else {
                        status_response(StatusCode::NOT_FOUND, "Not Found")
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_service),
        Err(e) => {
            error!("Metrics server could not bind {}: {}", addr, e);
            return;
        }
    };

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });
}

fn status_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
