//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, request ID, tracing, timeout)
//!     → [dispatcher picks the route and upstream]
//!     → forward.rs (director.rs, request.rs, transport.rs)
//!     → response.rs / flush.rs (hop-by-hop removal, body flushing)
//!     → Send to client
//! ```

pub mod director;
pub mod flush;
pub mod forward;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;
pub mod transport;

pub use director::{Director, Target};
pub use flush::{BufferPool, FlushPolicy, SharedBufferPool};
pub use forward::UpstreamForwarder;
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;
pub use transport::{transport_fn, HttpTransport, Transport, TransportFn};
