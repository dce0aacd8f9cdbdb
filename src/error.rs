//! Error types shared across subsystems.
//!
//! # Taxonomy
//! ```text
//! Load time     → ManifestError       (fatal to load)
//! Compile time  → ConfigurationError  (fatal to the whole compile)
//! Request time  → ProxyError          (isolated to one request)
//! ```
//!
//! Load and compile errors are returned synchronously and abort construction;
//! no partially built dispatcher is ever handed to a caller. Request errors
//! are handed to the configured error handler or the default 502 policy.

use axum::http::Method;
use thiserror::Error;

use crate::routing::pattern::PatternError;

/// Boxed error used at trait seams (transports, modifiers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structural problems found while loading a manifest.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("duplicate upstream identifier: {0:?}")]
    DuplicateUpstreamIdentifier(String),
}

/// Problems found while compiling a manifest into a dispatch table.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing scheme: {destination:?}")]
    MissingScheme { destination: String },

    #[error("missing host: {destination:?}")]
    MissingHost { destination: String },

    #[error("invalid destination {destination:?}: {source}")]
    InvalidDestination {
        destination: String,
        #[source]
        source: BoxError,
    },

    #[error("middleware configured for unknown upstream: {identifier:?}")]
    MissingUpstreamForMiddleware { identifier: String },

    #[error("upstream {upstream:?} has a route without methods: {path:?}")]
    RouteWithoutMethods { upstream: String, path: String },

    #[error("upstream {upstream:?} has an invalid method {method:?}")]
    InvalidMethod { upstream: String, method: String },

    #[error("upstream {upstream:?} has an invalid route pattern: {source}")]
    InvalidRoutePattern {
        upstream: String,
        #[source]
        source: PatternError,
    },

    #[error("route registered twice: {method} {path}")]
    DuplicateRoute { method: Method, path: String },
}

/// Failures while relaying a single request upstream.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The destination could not be connected to.
    #[error("upstream {upstream:?} unreachable: {source}")]
    Unreachable {
        upstream: String,
        #[source]
        source: BoxError,
    },

    /// The round trip started but did not complete.
    #[error("upstream {upstream:?} transport failure: {source}")]
    Transport {
        upstream: String,
        #[source]
        source: BoxError,
    },

    /// The configured response modifier rejected the upstream response.
    #[error("upstream {upstream:?} response modifier failed: {source}")]
    ResponseModifier {
        upstream: String,
        #[source]
        source: BoxError,
    },
}

impl ProxyError {
    /// Identifier of the upstream the failure belongs to.
    pub fn upstream(&self) -> &str {
        match self {
            ProxyError::Unreachable { upstream, .. }
            | ProxyError::Transport { upstream, .. }
            | ProxyError::ResponseModifier { upstream, .. } => upstream,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Unreachable { .. } => "unreachable",
            ProxyError::Transport { .. } => "transport",
            ProxyError::ResponseModifier { .. } => "response_modifier",
        }
    }
}
