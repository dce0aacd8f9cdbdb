//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Serve a [`ReloadableDispatcher`] behind the axum stack
//! - Wire up middleware (tracing, timeout, request ID)
//! - Recompile and swap the dispatcher when a new manifest arrives
//! - Stop accepting and drain on shutdown

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Manifest;
use crate::dispatcher::{Dispatcher, ReloadableDispatcher};
use crate::http::request::{UuidRequestId, X_REQUEST_ID};
use crate::options::MountConfig;

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    dispatcher: ReloadableDispatcher,
    mount: MountConfig,
}

impl HttpServer {
    /// `mount` is reused to compile manifests received while running.
    pub fn new(dispatcher: Dispatcher, mount: MountConfig, request_timeout: Duration) -> Self {
        let dispatcher = ReloadableDispatcher::new(dispatcher);
        let router = Self::build_router(dispatcher.clone(), request_timeout);
        Self {
            router,
            dispatcher,
            mount,
        }
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(dispatcher: ReloadableDispatcher, request_timeout: Duration) -> Router {
        Router::new()
            .fallback(move |req: Request<Body>| {
                let dispatcher = dispatcher.clone();
                async move { dispatcher.handle(req).await }
            })
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    /// Handle for inspecting or replacing the live dispatcher.
    pub fn dispatcher(&self) -> ReloadableDispatcher {
        self.dispatcher.clone()
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Manifests received on `updates` are compiled with the server's mount
    /// configuration; one that fails to compile is logged and ignored.
    pub async fn run(
        self,
        listener: TcpListener,
        mut updates: mpsc::UnboundedReceiver<Manifest>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            root = %self.dispatcher.load().root(),
            "HTTP server starting"
        );

        let dispatcher = self.dispatcher.clone();
        let mount = self.mount.clone();
        let reloader = tokio::spawn(async move {
            while let Some(manifest) = updates.recv().await {
                match Dispatcher::with_config(manifest, &mount) {
                    Ok(next) => {
                        dispatcher.replace(next);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Reloaded manifest failed to compile, keeping current dispatcher");
                    }
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
