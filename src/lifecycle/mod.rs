//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Parse flags → Load manifest → Compile → Metrics → Bind → Serve
//!
//! Shutdown (shutdown.rs):
//!     trigger() → broadcast to subscribers → server drains in-flight requests
//!
//! Signals (signals.rs):
//!     SIGTERM or Ctrl-C → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - Fail fast: a manifest that does not load or compile stops startup
//! - Listeners bind last, after the dispatcher exists
//! - Reload never interrupts serving; a bad manifest keeps the old table

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, Args, StartupError};
