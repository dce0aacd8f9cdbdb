//! Round-trip transports.
//!
//! A [`Transport`] performs one request/response exchange with an upstream.
//! The default [`HttpTransport`] is a pooled hyper client shared by every
//! forwarder of a dispatcher; tests and callers swap in their own through
//! [`MountOption::transport`](crate::options::MountOption::transport).

use std::future::Future;
use std::sync::{Arc, Once};

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::error::BoxError;

/// Sends a fully directed request and returns the upstream response.
pub trait Transport: Send + Sync + 'static {
    fn round_trip(&self, req: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, BoxError>>;
}

/// HTTP/1.1 transport over a pooled hyper client. `https` destinations
/// are reached over rustls with the bundled webpki roots.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl HttpTransport {
    pub fn new() -> Self {
        install_crypto_provider();

        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.enforce_http(false);

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);
        let client = Client::builder(TokioExecutor::new()).build(https);
        Self { client }
    }
}

fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Err only means a process default is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn round_trip(&self, req: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, BoxError>> {
        let fut = self.client.request(req);
        Box::pin(async move {
            let response: Response<Incoming> = fut.await?;
            Ok(response.map(Body::new))
        })
    }
}

/// Transport backed by an async closure.
pub struct TransportFn<F>(F);

impl<F, Fut> Transport for TransportFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Body>, BoxError>> + Send + 'static,
{
    fn round_trip(&self, req: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, BoxError>> {
        Box::pin((self.0)(req))
    }
}

pub fn transport_fn<F, Fut>(f: F) -> Arc<dyn Transport>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Body>, BoxError>> + Send + 'static,
{
    Arc::new(TransportFn(f))
}

/// Whether a transport error means the destination was never reached.
pub(crate) fn is_connect_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(client) = e.downcast_ref::<hyper_util::client::legacy::Error>() {
            if client.is_connect() {
                return true;
            }
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_transport_fn_round_trip() {
        let transport = transport_fn(|req: Request<Body>| async move {
            let mut response = Response::new(Body::from(req.uri().to_string()));
            *response.status_mut() = StatusCode::ACCEPTED;
            Ok(response)
        });
        let response = transport
            .round_trip(Request::builder().uri("http://upstream/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_https_destination_negotiates_tls() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut first = [0u8; 1];
            tokio::io::AsyncReadExt::read_exact(&mut socket, &mut first).await.unwrap();
            first[0]
        });

        let transport = HttpTransport::new();
        let request = Request::builder()
            .uri(format!("https://127.0.0.1:{}/secure", addr.port()))
            .body(Body::empty())
            .unwrap();
        let in_flight = tokio::spawn(transport.round_trip(request));

        // 0x16 opens a TLS handshake record.
        let first = tokio::time::timeout(std::time::Duration::from_secs(5), accepted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, 0x16);
        in_flight.abort();
    }

    #[test]
    fn test_connect_error_detection() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(is_connect_error(&refused));

        let other: BoxError = "broken transport".into();
        assert!(!is_connect_error(other.as_ref()));
    }
}
