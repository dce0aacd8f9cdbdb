//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes in a segment trie
//! - Look up the handler for a (method, path) pair
//! - Fall back to a not-found handler or a textual 404
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Per segment: static beats regex-constrained parameter, which beats
//!   plain parameter, which beats catch-all; lookup backtracks
//! - A path that exists under other methods answers 405, not 404

use std::collections::HashMap;
use std::future;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, Response, StatusCode};
use futures_util::future::BoxFuture;

use crate::routing::handler::{Handler, SharedHandler};
use crate::routing::pattern::{split_path, PathParams, Pattern, PatternError, Segment};

/// The minimal registration surface the route compiler targets.
pub trait RouteRegistrar {
    /// Register `handler` for `method` requests whose path matches `path`.
    fn register(&mut self, method: Method, path: &str, handler: SharedHandler);

    /// Install the handler for requests matching no registered route.
    fn not_found(&mut self, handler: SharedHandler);
}

/// Result of a route lookup.
pub enum Lookup {
    Found {
        handler: SharedHandler,
        params: PathParams,
    },
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

type Endpoint = HashMap<Method, SharedHandler>;

#[derive(Default)]
struct Node {
    statics: HashMap<String, Node>,
    /// Constrained parameters first, then plain ones.
    params: Vec<ParamChild>,
    catch_all: Option<(String, Endpoint)>,
    endpoint: Endpoint,
}

struct ParamChild {
    segment: Segment,
    name: String,
    node: Node,
}

impl Node {
    fn insert(&mut self, segments: &[Segment], method: Method, handler: SharedHandler) -> Option<SharedHandler> {
        let Some((head, rest)) = segments.split_first() else {
            return self.endpoint.insert(method, handler);
        };

        match head {
            Segment::Static(s) => self
                .statics
                .entry(s.clone())
                .or_default()
                .insert(rest, method, handler),
            Segment::Param { name, constraint } => {
                let existing = self.params.iter().position(|p| p.segment == *head);
                let index = match existing {
                    Some(i) => i,
                    None => {
                        let child = ParamChild {
                            segment: head.clone(),
                            name: name.clone(),
                            node: Node::default(),
                        };
                        let at = if constraint.is_some() {
                            self.params
                                .iter()
                                .position(|p| matches!(&p.segment, Segment::Param { constraint: None, .. }))
                                .unwrap_or(self.params.len())
                        } else {
                            self.params.len()
                        };
                        self.params.insert(at, child);
                        at
                    }
                };
                self.params[index].node.insert(rest, method, handler)
            }
            Segment::CatchAll(name) => {
                let (_, endpoint) = self
                    .catch_all
                    .get_or_insert_with(|| (name.clone(), Endpoint::new()));
                endpoint.insert(method, handler)
            }
        }
    }

    fn find(
        &self,
        segments: &[&str],
        method: &Method,
        params: &mut PathParams,
        allowed: &mut Vec<Method>,
    ) -> Option<SharedHandler> {
        let Some((head, rest)) = segments.split_first() else {
            return select(&self.endpoint, method, allowed);
        };

        if let Some(child) = self.statics.get(*head) {
            if let Some(found) = child.find(rest, method, params, allowed) {
                return Some(found);
            }
        }

        for param in &self.params {
            if param.segment.accepts(head) {
                params.push(&param.name, head.to_string());
                if let Some(found) = param.node.find(rest, method, params, allowed) {
                    return Some(found);
                }
                params.pop();
            }
        }

        if let Some((name, endpoint)) = &self.catch_all {
            params.push(name, segments.join("/"));
            if let Some(found) = select(endpoint, method, allowed) {
                return Some(found);
            }
            params.pop();
        }

        None
    }
}

fn select(endpoint: &Endpoint, method: &Method, allowed: &mut Vec<Method>) -> Option<SharedHandler> {
    if let Some(handler) = endpoint.get(method) {
        return Some(handler.clone());
    }
    for m in endpoint.keys() {
        if !allowed.contains(m) {
            allowed.push(m.clone());
        }
    }
    None
}

/// Method + path router.
#[derive(Default)]
pub struct Router {
    root: Node,
    not_found: Option<SharedHandler>,
    routes: usize,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. A second handler for the same method and pattern
    /// replaces the first.
    pub fn route(&mut self, method: Method, path: &str, handler: SharedHandler) -> Result<(), PatternError> {
        let pattern = Pattern::parse(path)?;
        if self.root.insert(pattern.segments(), method.clone(), handler).is_some() {
            tracing::warn!(method = %method, path, "Route replaced an existing handler");
        } else {
            self.routes += 1;
        }
        Ok(())
    }

    /// Number of distinct (method, pattern) routes.
    pub fn len(&self) -> usize {
        self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes == 0
    }

    pub fn set_not_found(&mut self, handler: SharedHandler) {
        self.not_found = Some(handler);
    }

    pub fn lookup(&self, method: &Method, path: &str) -> Lookup {
        let segments = split_path(path);
        let mut params = PathParams::default();
        let mut allowed = Vec::new();
        match self.root.find(&segments, method, &mut params, &mut allowed) {
            Some(handler) => Lookup::Found { handler, params },
            None if !allowed.is_empty() => Lookup::MethodNotAllowed(allowed),
            None => Lookup::NotFound,
        }
    }

    /// Route a request to its handler.
    pub fn dispatch(&self, mut req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        match self.lookup(req.method(), req.uri().path()) {
            Lookup::Found { handler, params } => {
                req.extensions_mut().insert(params);
                handler.call(req)
            }
            Lookup::MethodNotAllowed(allowed) => {
                tracing::debug!(method = %req.method(), path = %req.uri().path(), "Method not allowed");
                Box::pin(future::ready(method_not_allowed(&allowed)))
            }
            Lookup::NotFound => match &self.not_found {
                Some(handler) => handler.call(req),
                None => {
                    tracing::debug!(path = %req.uri().path(), "No route matched");
                    Box::pin(future::ready(not_found()))
                }
            },
        }
    }
}

impl Handler for Router {
    fn call(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        self.dispatch(req)
    }
}

impl RouteRegistrar for Router {
    fn register(&mut self, method: Method, path: &str, handler: SharedHandler) {
        if let Err(e) = self.route(method.clone(), path, handler) {
            tracing::error!(method = %method, path, error = %e, "Rejected route pattern");
        }
    }

    fn not_found(&mut self, handler: SharedHandler) {
        self.set_not_found(handler);
    }
}

/// Default response when nothing matches.
pub fn not_found() -> Response<Body> {
    text_response(StatusCode::NOT_FOUND, "404 page not found\n")
}

fn method_not_allowed(allowed: &[Method]) -> Response<Body> {
    let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "405 method not allowed\n");
    let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
