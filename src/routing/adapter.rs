//! Mounting onto an existing `axum::Router`.
//!
//! Lets callers interleave compiled manifest routes with routes they manage
//! themselves. Manifest routes are collected into a built-in
//! [`Router`](crate::routing::Router) that becomes the axum router's
//! fallback, so:
//! - routes the caller registered on the axum router are matched first
//! - manifest routes keep the built-in precedence (static, constrained
//!   parameter, parameter, catch-all) and regex segments
//! - parameter names never reach axum's matcher, so patterns like
//!   `/items/{id}` and `/items/{slug}` cannot collide there
//!
//! Installing a not-found handler replaces any fallback the axum router
//! already had.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};

use crate::routing::handler::SharedHandler;
use crate::routing::router::{RouteRegistrar, Router};

/// [`RouteRegistrar`] over an `axum::Router`.
#[derive(Default)]
pub struct AxumRegistrar {
    router: axum::Router,
    routes: Router,
    fallback: bool,
}

impl AxumRegistrar {
    pub fn new(router: axum::Router) -> Self {
        Self {
            router,
            routes: Router::new(),
            fallback: false,
        }
    }

    /// Number of manifest routes registered so far.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn into_router(self) -> axum::Router {
        if !self.fallback && self.routes.is_empty() {
            return self.router;
        }
        let routes = Arc::new(self.routes);
        self.router.fallback(move |req: Request<Body>| {
            let routes = routes.clone();
            async move { routes.dispatch(req).await }
        })
    }
}

impl RouteRegistrar for AxumRegistrar {
    fn register(&mut self, method: Method, path: &str, handler: SharedHandler) {
        self.routes.register(method, path, handler);
    }

    fn not_found(&mut self, handler: SharedHandler) {
        self.routes.set_not_found(handler);
        self.fallback = true;
    }
}
