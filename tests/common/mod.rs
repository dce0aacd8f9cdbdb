//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use tokio::net::TcpListener;

use pass_proxy::Dispatcher;

/// What an upstream saw.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
}

impl Seen {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A running backend recording every request it receives.
#[derive(Clone)]
pub struct Backend {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Backend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn last(&self) -> Seen {
        self.seen().pop().expect("backend saw no requests")
    }
}

/// Bind an ephemeral port and serve `router` with connection info.
pub async fn serve(router: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await;
    });
    addr
}

pub async fn serve_dispatcher(dispatcher: Dispatcher) -> SocketAddr {
    serve(dispatcher.into_router()).await
}

/// Start a backend whose response is computed from the request.
pub async fn start_programmable_backend<F, Fut, R>(f: F) -> Backend
where
    F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let router = axum::Router::new().fallback(move |req: Request<Body>| {
        let f = f.clone();
        let recorder = recorder.clone();
        async move {
            recorder.lock().unwrap().push(Seen {
                method: req.method().clone(),
                path_and_query: req
                    .uri()
                    .path_and_query()
                    .map(|pq| pq.to_string())
                    .unwrap_or_default(),
                headers: req.headers().clone(),
            });
            f(req).await.into_response()
        }
    });
    let addr = serve(router).await;
    Backend { addr, seen }
}

/// Start a backend that answers every request with its own path and query.
pub async fn start_echo_backend() -> Backend {
    start_programmable_backend(|req: Request<Body>| async move {
        let body = req.uri().path_and_query().map(|pq| pq.to_string()).unwrap_or_default();
        (StatusCode::OK, body)
    })
    .await
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub fn teapot() -> Response<Body> {
    let mut response = Response::new(Body::from("teapot"));
    *response.status_mut() = StatusCode::IM_A_TEAPOT;
    response
}
