//! Request handler and middleware abstractions.
//!
//! Every registered route resolves to a [`SharedHandler`]: a cheaply
//! clonable, thread-safe function from request to response future. Handlers
//! own whatever context they need; nothing is captured by reference.

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;

/// A request handler.
///
/// Implementations must be safe to call from many requests at once.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>>;
}

/// A handler shared between routes and requests.
pub type SharedHandler = Arc<dyn Handler>;

/// Wraps a handler to produce a new one. Applied in declared order: the
/// first middleware in a chain sees the request first.
pub type Middleware = Arc<dyn Fn(SharedHandler) -> SharedHandler + Send + Sync>;

/// Handler backed by an async closure.
pub struct HandlerFn<F>(F);

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoResponse,
{
    fn call(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Build a [`SharedHandler`] from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoResponse,
{
    Arc::new(HandlerFn(f))
}

/// Build a [`Middleware`] from a closure.
pub fn middleware_fn<F>(f: F) -> Middleware
where
    F: Fn(SharedHandler) -> SharedHandler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap `handler` so that `chain[0]` is outermost.
pub(crate) fn apply_middleware(handler: SharedHandler, chain: &[Middleware]) -> SharedHandler {
    chain.iter().rev().fold(handler, |inner, middleware| middleware(inner))
}
