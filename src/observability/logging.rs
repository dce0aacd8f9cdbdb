//! Structured logging and the upstream error-log sink.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for the binary
//! - Provide the sinks forwarders report upstream failures to
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the default filter
//! - JSON format for production, pretty format for development

use std::io::Write;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "pass_proxy=info,tower_http=info";

/// Output format of the process-wide subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global tracing subscriber.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Destination for upstream communication errors.
///
/// Shared by every forwarder of a dispatcher, so implementations are called
/// concurrently.
pub trait ErrorLog: Send + Sync + 'static {
    fn log(&self, message: &str);
}

/// Drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardLog;

impl ErrorLog for DiscardLog {
    fn log(&self, _message: &str) {}
}

/// Emits each message as a `tracing` error event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl ErrorLog for TracingLog {
    fn log(&self, message: &str) {
        tracing::error!(target: "pass_proxy::upstream", "{}", message);
    }
}

/// Writes one line per message to any writer.
#[derive(Debug, Default)]
pub struct WriterLog<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send + 'static> WriterLog<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WriterLog<Vec<u8>> {
    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let buf = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl<W: Write + Send + 'static> ErrorLog for WriterLog<W> {
    fn log(&self, message: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // A failing sink must not affect the response.
        let _ = writeln!(writer, "{}", message).and_then(|_| writer.flush());
    }
}
