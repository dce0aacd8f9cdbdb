//! Response body flushing.
//!
//! # Policies
//! - `flush_interval_ms = 0`: coalesce chunks into a copy buffer, write when
//!   it fills or the body ends
//! - negative: relay every chunk as soon as it arrives
//! - positive: coalesce, but never hold data longer than the interval
//!
//! Server-sent events and bodies of unknown length are always relayed
//! immediately so long-lived streams are not held back.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, BodyDataStream};
use axum::http::{header, HeaderMap, Response};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::time::Instant;

/// Size of a copy buffer.
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Source of copy buffers for response bodies.
///
/// Shared by concurrent responses; implementations provide their own
/// synchronization.
pub trait BufferPool: Send + Sync + 'static {
    fn get(&self) -> BytesMut;
    fn put(&self, buf: BytesMut);
}

/// Mutex-backed pool keeping a bounded number of idle buffers.
#[derive(Debug)]
pub struct SharedBufferPool {
    idle: Mutex<Vec<BytesMut>>,
    buffer_size: usize,
    max_idle: usize,
}

impl SharedBufferPool {
    pub fn new(buffer_size: usize, max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            buffer_size,
            max_idle,
        }
    }

    /// Buffers currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

impl Default for SharedBufferPool {
    fn default() -> Self {
        Self::new(COPY_BUFFER_SIZE, 64)
    }
}

impl BufferPool for SharedBufferPool {
    fn get(&self) -> BytesMut {
        self.idle
            .lock()
            .ok()
            .and_then(|mut idle| idle.pop())
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_size))
    }

    fn put(&self, mut buf: BytesMut) {
        buf.clear();
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.max_idle {
                idle.push(buf);
            }
        }
    }
}

impl<P: BufferPool> BufferPool for Arc<P> {
    fn get(&self) -> BytesMut {
        (**self).get()
    }

    fn put(&self, buf: BytesMut) {
        (**self).put(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Write when the buffer fills or the body ends.
    Buffered,
    /// Write every chunk as it arrives.
    Immediate,
    /// Buffered, plus a flush at least this often.
    Periodic(Duration),
}

impl FlushPolicy {
    pub fn from_millis(ms: i64) -> Self {
        match ms {
            0 => FlushPolicy::Buffered,
            ms if ms < 0 => FlushPolicy::Immediate,
            ms => FlushPolicy::Periodic(Duration::from_millis(ms.unsigned_abs())),
        }
    }

    /// The policy to use for a response with these headers.
    pub fn for_response(self, headers: &HeaderMap) -> Self {
        let event_stream = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/event-stream"));
        let unknown_length = !headers.contains_key(header::CONTENT_LENGTH);
        if event_stream || unknown_length {
            FlushPolicy::Immediate
        } else {
            self
        }
    }
}

/// Re-body `response` according to `policy`.
pub fn apply(response: Response<Body>, policy: FlushPolicy, pool: Option<Arc<dyn BufferPool>>) -> Response<Body> {
    let interval = match policy {
        FlushPolicy::Immediate => return response,
        FlushPolicy::Buffered => None,
        FlushPolicy::Periodic(interval) => Some(interval),
    };
    response.map(|body| coalesce(body, interval, pool))
}

struct Coalesce {
    inner: BodyDataStream,
    buf: BytesMut,
    pool: Option<Arc<dyn BufferPool>>,
    interval: Option<Duration>,
    deadline: Option<Instant>,
    pending_error: Option<axum::Error>,
    done: bool,
}

impl Coalesce {
    fn take(&mut self) -> Bytes {
        let chunk = Bytes::copy_from_slice(&self.buf);
        self.buf.clear();
        self.deadline = None;
        chunk
    }

    async fn next_chunk(&mut self) -> Option<Result<Bytes, axum::Error>> {
        loop {
            if let Some(err) = self.pending_error.take() {
                return Some(Err(err));
            }
            if self.done {
                return (!self.buf.is_empty()).then(|| Ok(self.take()));
            }

            let next = match self.deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, self.inner.next()).await {
                    Ok(next) => next,
                    Err(_) => return Some(Ok(self.take())),
                },
                None => self.inner.next().await,
            };

            match next {
                Some(Ok(chunk)) => {
                    if self.buf.is_empty() {
                        self.deadline = self.interval.map(|interval| Instant::now() + interval);
                    }
                    self.buf.extend_from_slice(&chunk);
                    if self.buf.len() >= COPY_BUFFER_SIZE {
                        return Some(Ok(self.take()));
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    if self.buf.is_empty() {
                        return Some(Err(err));
                    }
                    self.pending_error = Some(err);
                    return Some(Ok(self.take()));
                }
                None => self.done = true,
            }
        }
    }
}

impl Drop for Coalesce {
    fn drop(&mut self) {
        if let Some(pool) = &self.pool {
            pool.put(std::mem::take(&mut self.buf));
        }
    }
}

fn coalesce(body: Body, interval: Option<Duration>, pool: Option<Arc<dyn BufferPool>>) -> Body {
    let buf = match &pool {
        Some(pool) => pool.get(),
        None => BytesMut::with_capacity(COPY_BUFFER_SIZE),
    };
    let state = Coalesce {
        inner: body.into_data_stream(),
        buf,
        pool,
        interval,
        deadline: None,
        pending_error: None,
        done: false,
    };
    let stream = futures_util::stream::unfold(state, |mut state| async move {
        let chunk = state.next_chunk().await?;
        Some((chunk, state))
    });
    Body::from_stream(stream)
}
