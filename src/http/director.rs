//! Outgoing request rewriting.
//!
//! # Steps (in order)
//! 1. Retarget: scheme and authority from the destination, destination base
//!    path joined with the request path, destination query merged in front of
//!    the request query, protocol forced to HTTP/1.1
//! 2. Host rewrite: `Host` set to the destination authority, so the upstream
//!    never sees (and never routes back to) the proxy's own host
//! 3. Request modifier, when configured
//!
//! The step list is fixed when the forwarder is built.

use std::str::FromStr;

use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, HeaderValue, Request, Uri, Version};
use url::Url;

use crate::error::{BoxError, ConfigurationError};
use crate::options::RequestModifier;

/// A parsed upstream destination.
#[derive(Debug, Clone)]
pub struct Target {
    destination: String,
    scheme: Scheme,
    authority: Authority,
    host: HeaderValue,
    base_path: String,
    base_query: Option<String>,
}

impl Target {
    pub fn parse(destination: &str) -> Result<Self, ConfigurationError> {
        let url = Url::parse(destination).map_err(|e| match e {
            url::ParseError::RelativeUrlWithoutBase => ConfigurationError::MissingScheme {
                destination: destination.to_string(),
            },
            other => ConfigurationError::InvalidDestination {
                destination: destination.to_string(),
                source: Box::new(other),
            },
        })?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigurationError::MissingHost {
                destination: destination.to_string(),
            })?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let invalid = |source: BoxError| ConfigurationError::InvalidDestination {
            destination: destination.to_string(),
            source,
        };
        let scheme = Scheme::from_str(url.scheme()).map_err(|e| invalid(e.into()))?;
        let host_header = HeaderValue::from_str(&authority).map_err(|e| invalid(e.into()))?;
        let authority = Authority::from_str(&authority).map_err(|e| invalid(e.into()))?;

        Ok(Self {
            destination: destination.to_string(),
            scheme,
            authority,
            host: host_header,
            base_path: url.path().to_string(),
            base_query: url.query().map(str::to_string),
        })
    }

    /// The destination as configured.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Request URI for `uri` on this destination.
    pub fn rewrite_uri(&self, uri: &Uri) -> Result<Uri, BoxError> {
        let path = single_joining_slash(&self.base_path, uri.path());
        let query = match (self.base_query.as_deref(), uri.query()) {
            (Some(base), Some(q)) if !base.is_empty() && !q.is_empty() => Some(format!("{}&{}", base, q)),
            (Some(base), Some(q)) => Some(format!("{}{}", base, q)),
            (Some(base), None) => Some(base.to_string()),
            (None, q) => q.map(str::to_string),
        };
        let path_and_query = match query {
            Some(q) if !q.is_empty() => format!("{}?{}", path, q),
            _ => path,
        };

        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(PathAndQuery::from_str(&path_and_query)?)
            .build()?)
    }
}

fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => format!("{}/{}", a, b),
        _ => format!("{}{}", a, b),
    }
}

enum DirectorStep {
    Retarget,
    RewriteHost,
    Modify(RequestModifier),
}

/// Rewrites inbound requests into requests for one destination.
pub struct Director {
    target: Target,
    steps: Vec<DirectorStep>,
}

impl Director {
    pub fn new(target: Target, modifier: Option<RequestModifier>) -> Self {
        let mut steps = vec![DirectorStep::Retarget, DirectorStep::RewriteHost];
        if let Some(modifier) = modifier {
            steps.push(DirectorStep::Modify(modifier));
        }
        Self { target, steps }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn direct(&self, req: &mut Request<Body>) -> Result<(), BoxError> {
        for step in &self.steps {
            match step {
                DirectorStep::Retarget => {
                    *req.uri_mut() = self.target.rewrite_uri(req.uri())?;
                    *req.version_mut() = Version::HTTP_11;
                }
                DirectorStep::RewriteHost => {
                    req.headers_mut().insert(header::HOST, self.target.host.clone());
                }
                DirectorStep::Modify(modify) => modify(req),
            }
        }
        Ok(())
    }
}
