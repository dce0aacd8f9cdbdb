//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup or reload):
//!     Manifest + MountConfig
//!     → compiler.rs (prefixes, forwarders, middleware, endpoints)
//!     → RouteTable
//!     → install into a RouteRegistrar (router.rs or adapter.rs)
//!
//! Incoming Request:
//!     → router.rs (segment trie lookup, path parameters)
//!     → middleware chain → endpoint (strip prefix, observe, forward)
//! ```
//!
//! # Design Decisions
//! - Routes compiled up front, immutable at runtime
//! - Compilation is all-or-nothing: nothing is registered on failure
//! - Deterministic precedence: static, regex parameter, parameter, catch-all

pub mod adapter;
pub mod compiler;
pub mod handler;
pub mod path;
pub mod pattern;
pub mod router;

pub use adapter::AxumRegistrar;
pub use compiler::{compile, RouteTable};
pub use handler::{handler_fn, middleware_fn, Handler, HandlerFn, Middleware, SharedHandler};
pub use pattern::{PathParams, Pattern, PatternError};
pub use router::{Lookup, RouteRegistrar, Router};
