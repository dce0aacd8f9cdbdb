//! pass-proxy: a reverse proxy driven by a service manifest.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                      PASS PROXY                      │
//!                     │                                                      │
//!   manifest.toml ────┼─▶ config ──▶ routing::compiler ──▶ Dispatcher        │
//!                     │   (load,      (prefixes, routes,    (segment trie,   │
//!                     │    validate)   middleware)           immutable)      │
//!                     │                                          │           │
//!   Client Request    │  ┌─────────┐    ┌──────────┐    ┌────────▼────────┐  │
//!   ──────────────────┼─▶│  http   │───▶│ request  │───▶│ route endpoint  │  │
//!                     │  │ server  │    │ id/trace │    │ strip, observe  │  │
//!                     │  └─────────┘    └──────────┘    └────────┬────────┘  │
//!                     │                                          ▼           │
//!   Client Response   │  ┌─────────┐    ┌──────────┐    ┌─────────────────┐  │
//!   ◀─────────────────┼──│  flush  │◀───│ response │◀───│ forwarder       │◀─┼── Upstream
//!                     │  │ policy  │    │ modifier │    │ director+client │  │
//!                     │  └─────────┘    └──────────┘    └─────────────────┘  │
//!                     │                                                      │
//!                     │  Cross-cutting: observability, lifecycle, watcher    │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;

use pass_proxy::lifecycle::{self, Args};
use pass_proxy::observability::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.log_format);

    tracing::info!("pass-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    lifecycle::run(args).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
