//! Per-upstream forwarding.
//!
//! # Data Flow
//! ```text
//! request (prefix already stripped)
//!     → Director (retarget, Host rewrite, request modifier)
//!     → hop-by-hop removal, X-Forwarded-For
//!     → Transport::round_trip
//!     → hop-by-hop removal, response modifier
//!     → flush policy
//!     → client
//! ```
//!
//! Protocol upgrade requests (`Connection: upgrade`) are answered with 501
//! instead of being relayed with their upgrade headers stripped.
//!
//! Any failure (transport, directing, response modifier) goes to the error
//! handler when one is configured. Otherwise it is written to the error log
//! and answered with 502.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};

use crate::config::Upstream;
use crate::error::{ConfigurationError, ProxyError};
use crate::http::director::{Director, Target};
use crate::http::flush::{self, BufferPool, FlushPolicy};
use crate::http::headers::is_upgrade_request;
use crate::http::request::prepare_outgoing;
use crate::http::response::{bad_gateway, remove_hop_by_hop, upgrade_not_supported};
use crate::http::transport::{is_connect_error, Transport};
use crate::observability::logging::ErrorLog;
use crate::observability::metrics;
use crate::options::{ErrorHandler, FailedRequest, MountConfig, ResponseModifier};

/// Relays requests to one upstream destination.
pub struct UpstreamForwarder {
    identifier: String,
    director: Director,
    flush: FlushPolicy,
    transport: Arc<dyn Transport>,
    error_log: Arc<dyn ErrorLog>,
    buffer_pool: Option<Arc<dyn BufferPool>>,
    response_modifier: Option<ResponseModifier>,
    error_handler: Option<ErrorHandler>,
}

impl UpstreamForwarder {
    /// Build the forwarder for `upstream`. `transport` is used unless the
    /// configuration names its own.
    pub fn new(
        upstream: &Upstream,
        config: &MountConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigurationError> {
        let target = Target::parse(&upstream.destination)?;
        let mut forwarder = Self {
            identifier: upstream.identifier.clone(),
            director: Director::new(target, config.request_modifier.clone()),
            flush: FlushPolicy::from_millis(upstream.flush_interval_ms),
            transport,
            error_log: config.error_log.clone(),
            buffer_pool: None,
            response_modifier: None,
            error_handler: None,
        };

        if let Some(transport) = &config.transport {
            forwarder.transport = transport.clone();
        }
        if let Some(pool) = &config.buffer_pool {
            forwarder.buffer_pool = Some(pool.clone());
        }
        if let Some(modifier) = &config.response_modifier {
            forwarder.response_modifier = Some(modifier.clone());
        }
        if let Some(handler) = &config.error_handler {
            forwarder.error_handler = Some(handler.clone());
        }

        Ok(forwarder)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn target(&self) -> &Target {
        self.director.target()
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        self.flush
    }

    pub async fn forward(&self, mut req: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = req.method().clone();

        if is_upgrade_request(req.headers()) {
            tracing::warn!(
                upstream = %self.identifier,
                uri = %req.uri(),
                upgrade = ?req.headers().get(header::UPGRADE),
                "Refusing protocol upgrade"
            );
            metrics::record_forward(&self.identifier, method.as_str(), StatusCode::NOT_IMPLEMENTED.as_u16(), start);
            return upgrade_not_supported();
        }

        let directed = self.director.direct(&mut req);
        let failed = FailedRequest {
            upstream: self.identifier.clone(),
            method: method.clone(),
            uri: req.uri().clone(),
        };
        if let Err(source) = directed {
            return self.fail(
                failed,
                ProxyError::Transport {
                    upstream: self.identifier.clone(),
                    source,
                },
            );
        }
        prepare_outgoing(&mut req);

        tracing::debug!(upstream = %self.identifier, method = %method, uri = %failed.uri, "Forwarding request");

        let mut response = match self.transport.round_trip(req).await {
            Ok(response) => response,
            Err(source) => {
                let upstream = self.identifier.clone();
                let err = if is_connect_error(source.as_ref()) {
                    ProxyError::Unreachable { upstream, source }
                } else {
                    ProxyError::Transport { upstream, source }
                };
                return self.fail(failed, err);
            }
        };

        remove_hop_by_hop(response.headers_mut());
        if let Some(modify) = &self.response_modifier {
            if let Err(source) = modify(&mut response) {
                return self.fail(
                    failed,
                    ProxyError::ResponseModifier {
                        upstream: self.identifier.clone(),
                        source,
                    },
                );
            }
        }

        metrics::record_forward(&self.identifier, method.as_str(), response.status().as_u16(), start);

        let policy = self.flush.for_response(response.headers());
        flush::apply(response, policy, self.buffer_pool.clone())
    }

    fn fail(&self, failed: FailedRequest, err: ProxyError) -> Response<Body> {
        metrics::record_upstream_error(&self.identifier, err.kind());
        tracing::debug!(upstream = %self.identifier, uri = %failed.uri, error = %err, "Upstream request failed");

        match &self.error_handler {
            Some(handler) => handler(failed, err),
            None => {
                self.error_log.log(&format!("proxy error: {}", err));
                bad_gateway()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::http::transport::transport_fn;
    use crate::observability::logging::WriterLog;
    use crate::options::MountOption;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn upstream() -> Upstream {
        Upstream::new("accounts", "http://accounts.internal")
    }

    fn echo_transport() -> Arc<dyn Transport> {
        transport_fn(|req: Request<Body>| async move {
            let host = req.headers()[header::HOST].clone();
            let mut response = Response::new(Body::from(req.uri().to_string()));
            response.headers_mut().insert("x-upstream-host", host);
            response.headers_mut().insert(header::CONNECTION, "close".parse().unwrap());
            Ok::<_, BoxError>(response)
        })
    }

    fn broken_transport() -> Arc<dyn Transport> {
        transport_fn(|_req: Request<Body>| async { Err::<Response<Body>, BoxError>("broken transport".into()) })
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_missing_scheme_rejected() {
        let result = UpstreamForwarder::new(
            &Upstream::new("accounts", "noscheme.local"),
            &MountConfig::default(),
            echo_transport(),
        );
        assert!(matches!(result, Err(ConfigurationError::MissingScheme { .. })));
    }

    #[test]
    fn test_flush_policy_from_upstream() {
        let forwarder = UpstreamForwarder::new(
            &upstream().flush_interval_ms(-1),
            &MountConfig::default(),
            echo_transport(),
        )
        .unwrap();
        assert_eq!(forwarder.flush_policy(), FlushPolicy::Immediate);
        assert_eq!(forwarder.identifier(), "accounts");
    }

    #[tokio::test]
    async fn test_forwards_with_host_rewrite() {
        let forwarder = UpstreamForwarder::new(&upstream(), &MountConfig::default(), echo_transport()).unwrap();
        let req = Request::builder()
            .uri("/accounts/1?x=1")
            .header(header::HOST, "proxy.local")
            .body(Body::empty())
            .unwrap();

        let response = forwarder.forward(req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-upstream-host"], "accounts.internal");
        assert!(!response.headers().contains_key(header::CONNECTION));
        assert_eq!(body_string(response).await, "http://accounts.internal/accounts/1?x=1");
    }

    #[tokio::test]
    async fn test_default_failure_logs_and_502() {
        let log = Arc::new(WriterLog::new(Vec::new()));
        let config = MountConfig::from_options([MountOption::ErrorLog(log.clone())]);
        let forwarder = UpstreamForwarder::new(&upstream(), &config, broken_transport()).unwrap();

        let response = forwarder.forward(Request::new(Body::empty())).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(log.contents().contains("broken transport"));
    }

    #[tokio::test]
    async fn test_error_handler_replaces_default() {
        let log = Arc::new(WriterLog::new(Vec::new()));
        let config = MountConfig::from_options([
            MountOption::ErrorLog(log.clone()),
            MountOption::error_handler(|failed, err| {
                assert_eq!(failed.upstream, "accounts");
                assert_eq!(err.kind(), "transport");
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::IM_A_TEAPOT;
                response
            }),
        ]);
        let forwarder = UpstreamForwarder::new(&upstream(), &config, broken_transport()).unwrap();

        let response = forwarder.forward(Request::new(Body::empty())).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert!(log.contents().is_empty());
    }

    #[tokio::test]
    async fn test_response_modifier_failure_uses_error_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let config = MountConfig::from_options([
            MountOption::response_modifier(|_response| Err("rejected".into())),
            MountOption::error_handler(move |_failed, err| {
                seen.fetch_add(1, Ordering::SeqCst);
                assert_eq!(err.kind(), "response_modifier");
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
                response
            }),
        ]);
        let forwarder = UpstreamForwarder::new(&upstream(), &config, echo_transport()).unwrap();

        let response = forwarder.forward(Request::new(Body::empty())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upgrade_request_refused() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let transport = transport_fn(move |_req: Request<Body>| {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, BoxError>(Response::new(Body::empty())) }
        });
        let forwarder = UpstreamForwarder::new(&upstream(), &MountConfig::default(), transport).unwrap();
        let req = Request::builder()
            .uri("/socket")
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .body(Body::empty())
            .unwrap();

        let response = forwarder.forward(req).await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_configured_transport_overrides_default() {
        let config = MountConfig::from_options([MountOption::transport(broken_transport())]);
        let forwarder = UpstreamForwarder::new(&upstream(), &config, echo_transport()).unwrap();
        let response = forwarder.forward(Request::new(Body::empty())).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
