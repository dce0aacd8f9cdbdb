//! Inbound request identity and outgoing request preparation.
//!
//! # Responsibilities
//! - Generate a UUID v4 `x-request-id` when the client sent none
//! - Strip hop-by-hop headers from the request sent upstream
//! - Record the client address in `X-Forwarded-For`
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Original request preserved for the observation hook; the directed copy
//!   is what gets prepared

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::http::headers::{append_forwarded_for, remove_hop_by_hop, wants_trailers};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Issues random request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Request ID of an inbound request, if one was assigned.
pub fn request_id<B>(req: &Request<B>) -> Option<&str> {
    req.headers().get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
}

/// Final header pass over a directed request.
pub fn prepare_outgoing(req: &mut Request<Body>) {
    let client = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    let keep_trailers = wants_trailers(req.headers());

    let headers = req.headers_mut();
    remove_hop_by_hop(headers);
    if keep_trailers {
        headers.insert(header::TE, HeaderValue::from_static("trailers"));
    }
    if let Some(ip) = client {
        append_forwarded_for(headers, ip);
    }
}
