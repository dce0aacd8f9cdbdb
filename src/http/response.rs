//! Client-facing responses produced by the proxy itself.
//!
//! Upstream responses are relayed as-is apart from hop-by-hop headers; the
//! proxy only authors responses when the upstream could not be used.

use axum::body::Body;
use axum::http::{Response, StatusCode};

pub use crate::http::headers::remove_hop_by_hop;

/// Default answer when forwarding fails: an empty 502.
pub fn bad_gateway() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response
}

/// Answer to protocol upgrade requests, which are not relayed.
pub fn upgrade_not_supported() -> Response<Body> {
    let mut response = Response::new(Body::from("protocol upgrades are not proxied\n"));
    *response.status_mut() = StatusCode::NOT_IMPLEMENTED;
    response
}
