//! Shared utilities for integration tests: real nodes on ephemeral ports,
//! scripted raw-TCP backends and a raw client.

use kv_balancer::config::NodeConfig;
use kv_balancer::node::Node;
use kv_balancer::protocol::{read_request, status_code, Endpoint};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub async fn reserve() -> (TcpListener, Endpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Endpoint::from(listener.local_addr().unwrap());
    (listener, endpoint)
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn dead_endpoint() -> Endpoint {
    let (_listener, endpoint) = reserve().await;
    endpoint
}

/// Start a backend node on `listener`, replicating to `peers`.
#[allow(dead_code)]
pub fn spawn_node(listener: TcpListener, peers: Vec<Endpoint>) -> (Arc<Node>, JoinHandle<()>) {
    let addr = listener.local_addr().unwrap();
    let mut config = NodeConfig::new(addr, peers);
    config.replication.timeout_ms = 500;

    let node = Arc::new(Node::new(config, None).unwrap());
    let runner = node.clone();
    let handle = tokio::spawn(async move {
        runner
            .run(listener, std::future::pending())
            .await
            .unwrap();
    });
    (node, handle)
}

/// Raw backend that answers every connection with `name` as a 200 body, and
/// counts connections. Flip `alive` off to make it answer 503 instead.
#[allow(dead_code)]
pub struct ScriptedBackend {
    pub endpoint: Endpoint,
    pub connections: Arc<AtomicUsize>,
    pub alive: Arc<AtomicBool>,
    pub handle: JoinHandle<()>,
}

#[allow(dead_code)]
pub async fn scripted_backend(name: &'static str) -> ScriptedBackend {
    let (listener, endpoint) = reserve().await;
    let connections = Arc::new(AtomicUsize::new(0));
    let alive = Arc::new(AtomicBool::new(true));

    let counter = connections.clone();
    let flag = alive.clone();
    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let up = flag.load(Ordering::SeqCst);
            tokio::spawn(async move {
                let _ = read_request(&mut socket, 1 << 20).await;
                let (status, body) = if up {
                    ("200 OK", name)
                } else {
                    ("503 Service Unavailable", "down")
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    ScriptedBackend {
        endpoint,
        connections,
        alive,
        handle,
    }
}

/// Send `request` verbatim and read until the server closes.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("server did not close the connection")
        .unwrap();
    response
}

/// Status code and body of a raw response.
pub fn split_response(response: &[u8]) -> (u16, String) {
    let status = status_code(response).expect("missing status line");
    let body_start = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| p + 4)
        .unwrap_or(response.len());
    (
        status,
        String::from_utf8_lossy(&response[body_start..]).into_owned(),
    )
}

#[allow(dead_code)]
pub fn get(key: &str) -> Vec<u8> {
    format!("GET /get/{} HTTP/1.1\r\nHost: test\r\n\r\n", key).into_bytes()
}

#[allow(dead_code)]
pub fn put(key: &str, value: &str) -> Vec<u8> {
    format!(
        "POST /put/{} HTTP/1.1\r\nHost: test\r\nContent-Length: {}\r\n\r\n{}",
        key,
        value.len(),
        value
    )
    .into_bytes()
}

/// Poll `check` until it holds or `limit` passes.
#[allow(dead_code)]
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}
