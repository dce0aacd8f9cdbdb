//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Compiler and forwarders produce:
//!     → logging.rs (tracing events, error-log sinks for upstream failures)
//!     → metrics.rs (request counters, latency histograms, error counters)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (only when an address is configured)
//! ```
//!
//! # Design Decisions
//! - Upstream failures go to a pluggable [`ErrorLog`](logging::ErrorLog) sink
//!   that discards by default, so library users opt in to that output
//! - Metric calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, DiscardLog, ErrorLog, LogFormat, TracingLog, WriterLog};
