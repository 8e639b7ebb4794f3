// src/node/service.rs
use super::{Node, NodeError};
use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tracing::debug;

/// Wire routes understood by a backend node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Health,
    Get(String),
    Put(String),
    Replicate(String),
}

impl Route {
    pub fn parse(method: &Method, path: &str) -> Result<Self, NodeError> {
        let route = if method == Method::GET && path == "/health" {
            Route::Health
        } else if let (true, Some(key)) = (method == Method::GET, path.strip_prefix("/get/")) {
            Route::Get(non_empty(key)?)
        } else if let (true, Some(key)) = (
            method == Method::POST || method == Method::PUT,
            path.strip_prefix("/put/"),
        ) {
            Route::Put(non_empty(key)?)
        } else if let (true, Some(key)) = (method == Method::POST, path.strip_prefix("/replicate/"))
        {
            Route::Replicate(non_empty(key)?)
        } else {
            return Err(NodeError::BadRequest(format!("no route for {} {}", method, path)));
        };
        Ok(route)
    }

    fn operation(&self) -> &'static str {
        match self {
            Route::Health => "probe",
            Route::Get(_) => "read",
            Route::Put(_) => "write",
            Route::Replicate(_) => "replicate",
        }
    }
}

fn non_empty(key: &str) -> Result<String, NodeError> {
    if key.is_empty() {
        Err(NodeError::BadRequest("empty key".to_string()))
    } else {
        Ok(key.to_string())
    }
}

/// tower handler in front of a [`Node`]; cheap to clone per connection.
#[derive(Clone)]
pub struct NodeService {
    node: Arc<Node>,
}

impl NodeService {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    async fn handle(node: Arc<Node>, req: Request<Body>) -> Response<Body> {
        let route = Route::parse(req.method(), req.uri().path());
        let operation = route.as_ref().map(Route::operation).unwrap_or("unknown");

        let response = match route {
            Ok(route) => Self::dispatch(&node, route, req.into_body())
                .await
                .unwrap_or_else(|err| err.into_response()),
            Err(err) => err.into_response(),
        };

        debug!(operation, status = response.status().as_u16(), "node request served");
        if let Some(metrics) = node.metrics() {
            metrics.record_node_request(operation, response.status().as_u16());
        }
        response
    }

    async fn dispatch(node: &Node, route: Route, body: Body) -> Result<Response<Body>, NodeError> {
        match route {
            Route::Health => Ok(text(StatusCode::OK, node.probe())),
            Route::Get(key) => {
                let value = node.read(&key).await?;
                Ok(text(StatusCode::OK, value))
            }
            Route::Put(key) => {
                let value = read_body(body).await?;
                node.write(key, value).await;
                Ok(text(StatusCode::OK, "OK"))
            }
            Route::Replicate(key) => {
                let value = read_body(body).await?;
                node.replicate(key, value).await;
                Ok(text(StatusCode::OK, "OK"))
            }
        }
    }
}

async fn read_body(body: Body) -> Result<hyper::body::Bytes, NodeError> {
    hyper::body::to_bytes(body)
        .await
        .map_err(|e| NodeError::Internal(format!("failed to read request body: {}", e)))
}

pub(super) fn text(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
}

impl Service<Request<Body>> for NodeService {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let node = self.node.clone();
        Box::pin(async move { Ok(Self::handle(node, req).await) })
    }
}
