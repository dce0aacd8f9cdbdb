//! Compiled dispatchers and the mount entry point.
//!
//! - [`Dispatcher`]: a self-contained request handler built from a manifest
//! - [`mount`]: compile a manifest into a caller-supplied [`RouteRegistrar`]
//! - [`ReloadableDispatcher`]: swaps whole dispatchers atomically on reload

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;

use crate::config::{Manifest, Upstream};
use crate::error::ConfigurationError;
use crate::options::{MountConfig, MountOption};
use crate::routing::compiler::compile;
use crate::routing::handler::Handler;
use crate::routing::path::display_root;
use crate::routing::router::{RouteRegistrar, Router};

/// A manifest compiled into an immutable dispatch table.
#[derive(Clone)]
pub struct Dispatcher {
    manifest: Arc<Manifest>,
    router: Arc<Router>,
    root: String,
}

impl Dispatcher {
    pub fn new(
        manifest: impl Into<Arc<Manifest>>,
        options: impl IntoIterator<Item = MountOption>,
    ) -> Result<Self, ConfigurationError> {
        Self::with_config(manifest, &MountConfig::from_options(options))
    }

    pub fn with_config(manifest: impl Into<Arc<Manifest>>, config: &MountConfig) -> Result<Self, ConfigurationError> {
        let manifest = manifest.into();
        let table = compile(&manifest, config)?;
        let root = table.root().to_string();

        let mut router = Router::new();
        table.install(&mut router);

        Ok(Self {
            manifest,
            router: Arc::new(router),
            root,
        })
    }

    /// External root joined with the manifest prefix; `/` when both are empty.
    pub fn root(&self) -> &str {
        display_root(&self.root)
    }

    pub fn upstreams(&self) -> &[Upstream] {
        self.manifest.upstreams()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn handle(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        self.router.dispatch(req)
    }

    /// An `axum::Router` that sends every request through this dispatcher.
    pub fn into_router(self) -> axum::Router {
        axum::Router::new().fallback(move |req: Request<Body>| {
            let dispatcher = self.clone();
            async move { dispatcher.handle(req).await }
        })
    }
}

impl Handler for Dispatcher {
    fn call(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        self.handle(req)
    }
}

/// Compile `manifest` and register its routes with `registrar`.
///
/// Nothing is registered when compilation fails.
pub fn mount<R: RouteRegistrar + ?Sized>(
    manifest: &Manifest,
    registrar: &mut R,
    options: impl IntoIterator<Item = MountOption>,
) -> Result<(), ConfigurationError> {
    let table = compile(manifest, &MountConfig::from_options(options))?;
    table.install(registrar);
    Ok(())
}

/// A dispatcher that can be replaced while serving.
///
/// Requests already dispatched finish on the dispatcher they started with.
#[derive(Clone)]
pub struct ReloadableDispatcher {
    current: Arc<ArcSwap<Dispatcher>>,
}

impl ReloadableDispatcher {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(dispatcher)),
        }
    }

    pub fn load(&self) -> Arc<Dispatcher> {
        self.current.load_full()
    }

    /// Swap in `dispatcher`, returning the one it replaced.
    pub fn replace(&self, dispatcher: Dispatcher) -> Arc<Dispatcher> {
        let next = Arc::new(dispatcher);
        tracing::info!(
            root = %next.root(),
            upstreams = next.upstreams().len(),
            "Dispatcher replaced"
        );
        self.current.swap(next)
    }

    pub fn handle(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        self.current.load().handle(req)
    }
}

impl Handler for ReloadableDispatcher {
    fn call(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        self.handle(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Route;
    use crate::error::BoxError;
    use crate::http::transport::transport_fn;
    use crate::routing::handler::handler_fn;
    use axum::http::StatusCode;

    fn manifest(prefix: &str, destination: &str) -> Manifest {
        Manifest::builder()
            .prefix_path(prefix)
            .upstream(Upstream::new("accounts", destination).route(Route::new(["GET"], "/accounts")))
            .build()
            .unwrap()
    }

    fn tagged(tag: &'static str) -> MountOption {
        MountOption::transport(transport_fn(move |_req: Request<Body>| async move {
            Ok::<_, BoxError>(Response::new(Body::from(tag)))
        }))
    }

    async fn body(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_root_reporting() {
        let dispatcher = Dispatcher::new(manifest("", "http://a"), [tagged("a")]).unwrap();
        assert_eq!(dispatcher.root(), "/");
        assert_eq!(dispatcher.upstreams().len(), 1);

        let dispatcher = Dispatcher::new(manifest("/api/v2", "http://a"), [tagged("a"), MountOption::root("/root")]).unwrap();
        assert_eq!(dispatcher.root(), "/root/api/v2");
    }

    #[test]
    fn test_missing_scheme_fails_construction() {
        let err = Dispatcher::new(manifest("", "noscheme.local"), std::iter::empty()).err().unwrap();
        assert_eq!(err.to_string(), r#"missing scheme: "noscheme.local""#);
    }

    #[test]
    fn test_mount_is_atomic() {
        let manifest = Manifest::builder()
            .upstream(Upstream::new("good", "http://good").route(Route::new(["GET"], "/good")))
            .upstream(Upstream::new("bad", "noscheme.local").route(Route::new(["GET"], "/bad")))
            .build()
            .unwrap();
        let mut router = Router::new();
        assert!(mount(&manifest, &mut router, [tagged("x")]).is_err());
        assert!(router.is_empty());
    }

    #[tokio::test]
    async fn test_into_router_serves() {
        use tower::ServiceExt;
        let router = Dispatcher::new(manifest("", "http://a"), [tagged("a")]).unwrap().into_router();
        let response = router
            .oneshot(Request::builder().uri("/accounts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body(response).await, "a");
    }

    #[tokio::test]
    async fn test_reload_swaps_whole_dispatcher() {
        let reloadable = ReloadableDispatcher::new(Dispatcher::new(manifest("", "http://a"), [tagged("first")]).unwrap());
        let request = || Request::builder().uri("/accounts").body(Body::empty()).unwrap();

        let in_flight = reloadable.handle(request());
        let previous = reloadable.replace(Dispatcher::new(manifest("", "http://a"), [tagged("second")]).unwrap());
        assert_eq!(previous.root(), "/");

        assert_eq!(body(in_flight.await).await, "first");
        assert_eq!(body(reloadable.handle(request()).await).await, "second");
    }

    #[tokio::test]
    async fn test_not_found_option() {
        let dispatcher = Dispatcher::new(
            manifest("", "http://a"),
            [
                tagged("a"),
                MountOption::not_found(handler_fn(|_req: Request<Body>| async { (StatusCode::IM_A_TEAPOT, "local") })),
            ],
        )
        .unwrap();
        let response = dispatcher.handle(Request::builder().uri("/elsewhere").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }
}
