//! Manifest-driven reverse proxy library.
//!
//! A [`Manifest`] names upstream destinations and the routes they answer.
//! [`Dispatcher::new`] compiles it into an immutable dispatch table;
//! [`mount`] compiles it into a router the caller already owns.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod options;
pub mod routing;

pub use config::{load_manifest, Manifest, Route, Upstream};
pub use dispatcher::{mount, Dispatcher, ReloadableDispatcher};
pub use error::{ConfigurationError, ManifestError, ProxyError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use options::{FailedRequest, MountConfig, MountOption, RouteInfo};
pub use routing::{AxumRegistrar, RouteRegistrar, Router};
