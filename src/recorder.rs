use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};

use crate::writer::{CloseGuard, CloseNotify, Flush, ResponseWriter};

/// An in-memory [`ResponseWriter`] that keeps everything a handler sends.
///
/// Useful for exercising handlers and middleware without a network. The first
/// status written wins, matching what a client would observe on the wire.
/// Hijacking is never supported.
#[derive(Debug)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    header_writes: usize,
    flushes: usize,
    flush_supported: bool,
    close_guard: Option<CloseGuard>,
    close_notify: CloseNotify,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        let (close_guard, close_notify) = CloseNotify::channel();

        Self {
            status: None,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            header_writes: 0,
            flushes: 0,
            flush_supported: true,
            close_guard: Some(close_guard),
            close_notify,
        }
    }

    /// A recorder that doesn't advertise the flush capability
    pub fn without_flush() -> Self {
        Self {
            flush_supported: false,
            ..Self::new()
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.body)
    }

    /// Number of `write_header` calls received, including superfluous ones
    pub fn header_writes(&self) -> usize {
        self.header_writes
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Simulate the client going away
    pub fn disconnect(&mut self) {
        self.close_guard.take();
    }
}

impl Default for ResponseRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);
        self.body.extend_from_slice(data);

        Ok(data.len())
    }

    fn write_header(&mut self, status: StatusCode) {
        self.header_writes += 1;
        self.status.get_or_insert(status);
    }

    fn close_notify(&self) -> CloseNotify {
        self.close_notify.clone()
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        if self.flush_supported {
            Some(self)
        } else {
            None
        }
    }
}

impl Flush for ResponseRecorder {
    fn flush(&mut self) {
        self.flushes += 1;
    }
}
