//! Manifest-to-route-table compilation.
//!
//! # Data Flow
//! ```text
//! Manifest + MountConfig
//!     → check middleware identifiers
//!     → per upstream: UpstreamForwarder, effective prefix
//!     → per route, per method: RouteEndpoint wrapped in the upstream's
//!       middleware chain
//!     → RouteTable (nothing registered yet)
//!     → RouteTable::install(registrar)
//! ```
//!
//! # Design Decisions
//! - Every check runs before the first registration, so a failed compile
//!   leaves the registrar untouched
//! - Route metadata is bound into the endpoint at compile time; requests
//!   only read it
//! - Within an endpoint: strip prefix, observe, forward. Middleware wraps
//!   the whole endpoint and sees the unstripped path

use std::collections::HashSet;
use std::future;
use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{Method, Request, Response, Uri};
use futures_util::future::BoxFuture;

use crate::config::{Manifest, Upstream};
use crate::error::ConfigurationError;
use crate::http::forward::UpstreamForwarder;
use crate::http::transport::{HttpTransport, Transport};
use crate::options::{MountConfig, ObserveFn, RouteInfo};
use crate::routing::handler::{apply_middleware, Handler, SharedHandler};
use crate::routing::path;
use crate::routing::pattern::Pattern;
use crate::routing::router::{not_found, RouteRegistrar};

struct Registration {
    method: Method,
    path: String,
    upstream: String,
    handler: SharedHandler,
}

/// Compiled routes, ready to be installed into a registrar.
pub struct RouteTable {
    registrations: Vec<Registration>,
    not_found: Option<SharedHandler>,
    root: String,
    upstreams: usize,
}

impl RouteTable {
    /// Effective root (external root joined with the manifest prefix).
    /// Empty when neither is set.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Number of (method, path) registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Registered (method, path) pairs in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.registrations.iter().map(|r| (&r.method, r.path.as_str()))
    }

    pub fn install<R: RouteRegistrar + ?Sized>(self, registrar: &mut R) {
        if let Some(handler) = self.not_found {
            registrar.not_found(handler);
        }
        let routes = self.registrations.len();
        for registration in self.registrations {
            tracing::debug!(
                method = %registration.method,
                path = %registration.path,
                upstream = %registration.upstream,
                "Registering route"
            );
            registrar.register(registration.method, &registration.path, registration.handler);
        }
        tracing::info!(
            upstreams = self.upstreams,
            routes,
            root = %path::display_root(&self.root),
            "Manifest routes mounted"
        );
    }
}

/// Compile `manifest` under `config`.
pub fn compile(manifest: &Manifest, config: &MountConfig) -> Result<RouteTable, ConfigurationError> {
    for identifier in config.middleware_upstreams() {
        if manifest.upstream(identifier).is_none() {
            return Err(ConfigurationError::MissingUpstreamForMiddleware {
                identifier: identifier.to_string(),
            });
        }
    }

    let root = path::join(&[config.root(), manifest.prefix_path()]);
    let transport: Arc<dyn Transport> = match &config.transport {
        Some(transport) => transport.clone(),
        None => Arc::new(HttpTransport::new()),
    };

    let mut registrations = Vec::new();
    let mut seen = HashSet::new();
    for upstream in manifest.upstreams() {
        let forwarder = Arc::new(UpstreamForwarder::new(upstream, config, transport.clone())?);
        let prefix = path::join(&[&root, &upstream.prefix_path]);
        let chain = config.middleware_for(&upstream.identifier);

        for route in &upstream.routes {
            if route.methods.is_empty() {
                return Err(ConfigurationError::RouteWithoutMethods {
                    upstream: upstream.identifier.clone(),
                    path: route.path.clone(),
                });
            }

            let full = path::route_path(&prefix, &route.path, config.keep_trailing_slashes);
            Pattern::parse(&full).map_err(|source| ConfigurationError::InvalidRoutePattern {
                upstream: upstream.identifier.clone(),
                source,
            })?;
            let mut paths = vec![full.clone()];
            if !config.keep_trailing_slashes {
                paths.extend(path::trailing_slash_variant(&full));
            }

            let mut methods: Vec<Method> = Vec::with_capacity(route.methods.len());
            for raw in &route.methods {
                let method = parse_method(upstream, raw)?;
                if !methods.contains(&method) {
                    methods.push(method);
                }
            }

            for method in methods {
                let endpoint = RouteEndpoint {
                    info: RouteInfo {
                        route_method: method.clone(),
                        route_path: route.path.clone(),
                        route_prefix: prefix.clone(),
                        upstream_host: upstream.destination.clone(),
                        upstream_identifier: upstream.identifier.clone(),
                        upstream_owner: upstream.owner.clone(),
                    },
                    prefix: prefix.clone(),
                    trim_trailing_slash: !config.keep_trailing_slashes,
                    observe: config.observe.clone(),
                    forwarder: forwarder.clone(),
                };
                let handler = apply_middleware(Arc::new(endpoint), chain);

                for full_path in &paths {
                    if !seen.insert((method.clone(), full_path.clone())) {
                        return Err(ConfigurationError::DuplicateRoute {
                            method,
                            path: full_path.clone(),
                        });
                    }
                    registrations.push(Registration {
                        method: method.clone(),
                        path: full_path.clone(),
                        upstream: upstream.identifier.clone(),
                        handler: handler.clone(),
                    });
                }
            }
        }
    }

    Ok(RouteTable {
        registrations,
        not_found: config.not_found.clone(),
        root,
        upstreams: manifest.upstreams().len(),
    })
}

fn parse_method(upstream: &Upstream, raw: &str) -> Result<Method, ConfigurationError> {
    let normalized = raw.trim().to_ascii_uppercase();
    if normalized.is_empty() {
        return Err(ConfigurationError::InvalidMethod {
            upstream: upstream.identifier.clone(),
            method: raw.to_string(),
        });
    }
    Method::from_bytes(normalized.as_bytes()).map_err(|_| ConfigurationError::InvalidMethod {
        upstream: upstream.identifier.clone(),
        method: raw.to_string(),
    })
}

/// The handler registered for one (method, path) of an upstream route.
struct RouteEndpoint {
    info: RouteInfo,
    prefix: String,
    trim_trailing_slash: bool,
    observe: Option<ObserveFn>,
    forwarder: Arc<UpstreamForwarder>,
}

impl Handler for RouteEndpoint {
    fn call(&self, mut req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        let Some(stripped) = path::strip_prefix(req.uri().path(), &self.prefix) else {
            return Box::pin(future::ready(not_found()));
        };
        let stripped = if self.trim_trailing_slash {
            path::trim_trailing_slash(&stripped)
        } else {
            &stripped
        };
        match with_path(req.uri(), stripped) {
            Some(uri) => *req.uri_mut() = uri,
            None => return Box::pin(future::ready(not_found())),
        }

        if let Some(observe) = &self.observe {
            observe(&req, self.info.clone());
        }

        let forwarder = self.forwarder.clone();
        Box::pin(async move { forwarder.forward(req).await })
    }
}

/// `uri` with its path replaced, query kept.
fn with_path(uri: &Uri, path: &str) -> Option<Uri> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::from_str(&path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}
