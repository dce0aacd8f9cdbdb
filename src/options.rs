//! Mount options and the effective configuration they build.
//!
//! # Data Flow
//! ```text
//! [MountOption, MountOption, ...]   (ordered, caller supplied)
//!     → MountConfig::from_options   (fold, later options win)
//!     → MountConfig                 (immutable, shared by the compiler
//!                                    and every forwarding handler)
//! ```
//!
//! # Defaults
//! - error log: [`DiscardLog`]
//! - upstream middleware: none
//! - trailing slashes: `/a` and `/a/` are the same route
//! - transport: a pooled [`HttpTransport`](crate::http::transport::HttpTransport)
//!   created once per compile
//!
//! Every hook stored here is invoked concurrently by in-flight requests and
//! must be safe for that.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response, Uri};

use crate::error::{BoxError, ProxyError};
use crate::http::flush::BufferPool;
use crate::http::transport::Transport;
use crate::observability::logging::{DiscardLog, ErrorLog};
use crate::routing::handler::{Middleware, SharedHandler};

/// Route metadata handed to the observation hook, built per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub route_method: Method,
    /// The route's own path, without any prefix.
    pub route_path: String,
    /// Full effective prefix stripped before forwarding.
    pub route_prefix: String,
    /// The upstream destination as configured.
    pub upstream_host: String,
    pub upstream_identifier: String,
    pub upstream_owner: String,
}

/// The outgoing request a failure belongs to.
#[derive(Debug, Clone)]
pub struct FailedRequest {
    pub upstream: String,
    pub method: Method,
    /// Rewritten URI as sent (or attempted) upstream.
    pub uri: Uri,
}

/// Called just before a matched request is forwarded.
pub type ObserveFn = Arc<dyn Fn(&Request<Body>, RouteInfo) + Send + Sync>;

/// Mutates every outgoing request after the host rewrite.
pub type RequestModifier = Arc<dyn Fn(&mut Request<Body>) + Send + Sync>;

/// Mutates upstream responses. An error is handled like a transport failure.
pub type ResponseModifier = Arc<dyn Fn(&mut Response<Body>) -> Result<(), BoxError> + Send + Sync>;

/// Owns the response when forwarding fails. Replaces the default
/// log-and-502 behaviour entirely.
pub type ErrorHandler = Arc<dyn Fn(FailedRequest, ProxyError) -> Response<Body> + Send + Sync>;

/// One named setting, applied in order by [`MountConfig::from_options`].
pub enum MountOption {
    Observe(ObserveFn),
    Root(String),
    ErrorLog(Arc<dyn ErrorLog>),
    BufferPool(Arc<dyn BufferPool>),
    ResponseModifier(ResponseModifier),
    /// Replaces the chain for one upstream identifier.
    UpstreamMiddleware(String, Vec<Middleware>),
    ErrorHandler(ErrorHandler),
    RequestModifier(RequestModifier),
    Transport(Arc<dyn Transport>),
    NotFound(SharedHandler),
    KeepTrailingSlashes,
}

impl MountOption {
    pub fn observe<F>(f: F) -> Self
    where
        F: Fn(&Request<Body>, RouteInfo) + Send + Sync + 'static,
    {
        MountOption::Observe(Arc::new(f))
    }

    /// Root the surrounding router mounts the proxy under. Stripped from
    /// every request sent upstream.
    pub fn root(prefix: impl Into<String>) -> Self {
        MountOption::Root(prefix.into())
    }

    pub fn error_log(log: impl ErrorLog) -> Self {
        MountOption::ErrorLog(Arc::new(log))
    }

    pub fn buffer_pool(pool: impl BufferPool) -> Self {
        MountOption::BufferPool(Arc::new(pool))
    }

    pub fn response_modifier<F>(f: F) -> Self
    where
        F: Fn(&mut Response<Body>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        MountOption::ResponseModifier(Arc::new(f))
    }

    pub fn upstream_middleware(
        upstream: impl Into<String>,
        chain: impl IntoIterator<Item = Middleware>,
    ) -> Self {
        MountOption::UpstreamMiddleware(upstream.into(), chain.into_iter().collect())
    }

    pub fn error_handler<F>(f: F) -> Self
    where
        F: Fn(FailedRequest, ProxyError) -> Response<Body> + Send + Sync + 'static,
    {
        MountOption::ErrorHandler(Arc::new(f))
    }

    pub fn request_modifier<F>(f: F) -> Self
    where
        F: Fn(&mut Request<Body>) + Send + Sync + 'static,
    {
        MountOption::RequestModifier(Arc::new(f))
    }

    pub fn transport(transport: Arc<dyn Transport>) -> Self {
        MountOption::Transport(transport)
    }

    /// Handler for requests matching no manifest route. Use it to fall
    /// through to in-process routes.
    pub fn not_found(handler: SharedHandler) -> Self {
        MountOption::NotFound(handler)
    }

    pub fn keep_trailing_slashes() -> Self {
        MountOption::KeepTrailingSlashes
    }
}

/// Effective configuration for one compile.
#[derive(Clone)]
pub struct MountConfig {
    pub(crate) observe: Option<ObserveFn>,
    pub(crate) root: String,
    pub(crate) upstream_middleware: BTreeMap<String, Vec<Middleware>>,
    pub(crate) keep_trailing_slashes: bool,

    pub(crate) buffer_pool: Option<Arc<dyn BufferPool>>,
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) error_log: Arc<dyn ErrorLog>,
    pub(crate) request_modifier: Option<RequestModifier>,
    pub(crate) response_modifier: Option<ResponseModifier>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) not_found: Option<SharedHandler>,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            observe: None,
            root: String::new(),
            upstream_middleware: BTreeMap::new(),
            keep_trailing_slashes: false,
            buffer_pool: None,
            error_handler: None,
            error_log: Arc::new(DiscardLog),
            request_modifier: None,
            response_modifier: None,
            transport: None,
            not_found: None,
        }
    }
}

impl MountConfig {
    /// Fold options over the defaults, in order.
    pub fn from_options(options: impl IntoIterator<Item = MountOption>) -> Self {
        let mut config = Self::default();
        for option in options {
            config.apply(option);
        }
        config
    }

    pub fn apply(&mut self, option: MountOption) {
        match option {
            MountOption::Observe(f) => self.observe = Some(f),
            MountOption::Root(root) => self.root = root,
            MountOption::ErrorLog(log) => self.error_log = log,
            MountOption::BufferPool(pool) => self.buffer_pool = Some(pool),
            MountOption::ResponseModifier(f) => self.response_modifier = Some(f),
            MountOption::UpstreamMiddleware(upstream, chain) => {
                self.upstream_middleware.insert(upstream, chain);
            }
            MountOption::ErrorHandler(f) => self.error_handler = Some(f),
            MountOption::RequestModifier(f) => self.request_modifier = Some(f),
            MountOption::Transport(t) => self.transport = Some(t),
            MountOption::NotFound(h) => self.not_found = Some(h),
            MountOption::KeepTrailingSlashes => self.keep_trailing_slashes = true,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn keeps_trailing_slashes(&self) -> bool {
        self.keep_trailing_slashes
    }

    /// Middleware chain configured for an upstream, empty if none.
    pub fn middleware_for(&self, upstream: &str) -> &[Middleware] {
        self.upstream_middleware
            .get(upstream)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Upstream identifiers that have a middleware chain, sorted.
    pub fn middleware_upstreams(&self) -> impl Iterator<Item = &str> {
        self.upstream_middleware.keys().map(String::as_str)
    }

    pub fn error_log(&self) -> &Arc<dyn ErrorLog> {
        &self.error_log
    }
}

impl fmt::Debug for MountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountConfig")
            .field("root", &self.root)
            .field("observe", &self.observe.is_some())
            .field("upstream_middleware", &self.upstream_middleware.iter().map(|(k, v)| (k, v.len())).collect::<Vec<_>>())
            .field("keep_trailing_slashes", &self.keep_trailing_slashes)
            .field("buffer_pool", &self.buffer_pool.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .field("request_modifier", &self.request_modifier.is_some())
            .field("response_modifier", &self.response_modifier.is_some())
            .field("transport", &self.transport.is_some())
            .field("not_found", &self.not_found.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::handler::{handler_fn, middleware_fn};

    fn passthrough() -> Middleware {
        middleware_fn(|next| next)
    }

    #[test]
    fn test_defaults() {
        let config = MountConfig::default();
        assert_eq!(config.root(), "");
        assert!(!config.keeps_trailing_slashes());
        assert!(config.middleware_for("anything").is_empty());
        assert!(config.transport.is_none());
        assert!(config.error_handler.is_none());
    }

    #[test]
    fn test_later_options_win() {
        let config = MountConfig::from_options([
            MountOption::root("/first"),
            MountOption::upstream_middleware("accounts", [passthrough(), passthrough()]),
            MountOption::root("/second"),
            MountOption::upstream_middleware("accounts", [passthrough()]),
            MountOption::upstream_middleware("billing", [passthrough()]),
            MountOption::keep_trailing_slashes(),
            MountOption::not_found(handler_fn(|_req: Request<Body>| async { "nf" })),
        ]);

        assert_eq!(config.root(), "/second");
        assert_eq!(config.middleware_for("accounts").len(), 1);
        assert_eq!(config.middleware_upstreams().collect::<Vec<_>>(), vec!["accounts", "billing"]);
        assert!(config.keeps_trailing_slashes());
        assert!(config.not_found.is_some());
        assert!(format!("{:?}", config).contains("\"/second\""));
    }
}
