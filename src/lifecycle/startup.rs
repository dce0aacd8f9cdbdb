//! Startup orchestration for the binary.
//!
//! # Responsibilities
//! - Load and compile the manifest
//! - Start optional background work (metrics exporter, manifest watcher)
//! - Bind the listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use clap::Parser;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::{load_manifest, LoadError, ManifestWatcher};
use crate::dispatcher::Dispatcher;
use crate::error::ConfigurationError;
use crate::http::request::request_id;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::logging::{LogFormat, TracingLog};
use crate::observability::metrics::init_metrics;
use crate::options::{MountConfig, MountOption, RouteInfo};

#[derive(Debug, Clone, Parser)]
#[command(name = "pass-proxy", version)]
#[command(about = "Reverse proxy driven by a service manifest", long_about = None)]
pub struct Args {
    /// Manifest file (.toml or .json)
    #[arg(short, long)]
    pub manifest: PathBuf,

    #[arg(short, long, default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Root the proxy is mounted under, stripped before forwarding
    #[arg(long, default_value = "")]
    pub root: String,

    /// Treat `/a` and `/a/` as distinct routes
    #[arg(long)]
    pub keep_trailing_slashes: bool,

    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    pub metrics_address: Option<SocketAddr>,

    /// Reload the manifest when the file changes
    #[arg(long)]
    pub watch: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load manifest: {0}")]
    Load(#[from] LoadError),

    #[error("failed to compile manifest: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to watch manifest: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Mount options the binary derives from its flags.
pub fn mount_options(args: &Args) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::root(args.root.clone()),
        MountOption::error_log(TracingLog),
        MountOption::observe(log_request),
    ];
    if args.keep_trailing_slashes {
        options.push(MountOption::keep_trailing_slashes());
    }
    options
}

fn log_request(req: &Request<Body>, info: RouteInfo) {
    tracing::info!(
        request_id = request_id(req).unwrap_or("-"),
        method = %info.route_method,
        route = %info.route_path,
        prefix = %info.route_prefix,
        upstream = %info.upstream_identifier,
        owner = %info.upstream_owner,
        destination = %info.upstream_host,
        path = %req.uri().path(),
        "Proxying request"
    );
}

/// Run the proxy described by `args` until a termination signal.
pub async fn run(args: Args) -> Result<(), StartupError> {
    let manifest = load_manifest(&args.manifest)?;
    tracing::info!(
        manifest = ?args.manifest,
        upstreams = manifest.upstreams().len(),
        "Manifest loaded"
    );

    let mount = MountConfig::from_options(mount_options(&args));
    let dispatcher = Dispatcher::with_config(manifest, &mount)?;

    if let Some(addr) = args.metrics_address {
        init_metrics(addr)?;
    }

    let listener = TcpListener::bind(args.bind).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let (_watcher, updates) = if args.watch {
        let (watcher, updates) = ManifestWatcher::new(&args.manifest);
        (Some(watcher.run()?), updates)
    } else {
        let (_, updates) = mpsc::unbounded_channel();
        (None, updates)
    };

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(dispatcher, mount, Duration::from_secs(args.request_timeout_secs));
    server.run(listener, updates, shutdown.subscribe()).await?;
    Ok(())
}
