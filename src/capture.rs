use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};

use crate::error::CaptureError;
use crate::writer::{CloseNotify, Flush, Hijack, Hijacked, ResponseWriter};

/// A response writer that records what passes through it.
///
/// Every call is forwarded unchanged to the wrapped writer. Along the way the
/// capture remembers the status that was sent, how many body bytes the
/// delegate accepted, and a copy of the body itself, so middleware can inspect
/// what a handler produced once it returns.
///
/// One capture serves exactly one request and is not meant to be shared
/// between threads.
#[derive(Debug)]
pub struct ResponseCapture<W> {
    inner: W,
    status: Option<StatusCode>,
    size: usize,
    body: Option<BytesMut>,
}

impl<W: ResponseWriter> ResponseCapture<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            status: None,
            size: 0,
            body: None,
        }
    }

    /// Forward `data` to the wrapped writer.
    ///
    /// The first write without a prior `write_header` records `200 OK`. The
    /// bytes are kept for [`body`](Self::body) even if the delegate fails, and
    /// the delegate's result is returned as is.
    pub fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);

        self.body
            .get_or_insert_with(BytesMut::new)
            .extend_from_slice(data);

        let n = self.inner.write(data)?;
        self.size += n;

        Ok(n)
    }

    /// Record `status` and forward it. Repeated calls are forwarded as well;
    /// it is up to the delegate to decide what a second head means.
    pub fn write_header(&mut self, status: StatusCode) {
        if let Some(previous) = self.status.replace(status) {
            tracing::trace!(%previous, %status, "status overwritten");
        }

        self.inner.write_header(status);
    }

    /// The recorded status, if any has been written
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The recorded status code, or 0 if none has been written yet
    pub fn status_code(&self) -> u16 {
        self.status.map_or(0, |status| status.as_u16())
    }

    pub fn written(&self) -> bool {
        self.status.is_some()
    }

    /// Body bytes accepted by the wrapped writer so far
    pub fn size(&self) -> usize {
        self.size
    }

    /// A copy of the body written so far, exactly [`size`](Self::size) bytes
    /// long.
    ///
    /// Fails with [`CaptureError::NoBody`] if `write` was never called. Reads
    /// don't consume anything, so repeated calls return the same bytes.
    pub fn body(&self) -> Result<Bytes, CaptureError> {
        self.body
            .as_ref()
            .map(|body| Bytes::copy_from_slice(&body[..self.size.min(body.len())]))
            .ok_or(CaptureError::NoBody)
    }

    /// Flush the wrapped writer if it supports flushing
    pub fn flush(&mut self) {
        if let Some(flusher) = self.inner.flusher() {
            flusher.flush();
        }
    }

    pub fn hijack(&mut self) -> Result<Hijacked, CaptureError> {
        self.inner
            .hijacker()
            .ok_or(CaptureError::HijackUnsupported)?
            .hijack()
    }

    pub fn close_notify(&self) -> CloseNotify {
        self.inner.close_notify()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for ResponseCapture<W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        ResponseCapture::write(self, data)
    }

    fn write_header(&mut self, status: StatusCode) {
        ResponseCapture::write_header(self, status)
    }

    fn close_notify(&self) -> CloseNotify {
        ResponseCapture::close_notify(self)
    }

    // Both capabilities are always advertised; missing support in the
    // delegate shows up when they are used.
    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        Some(self)
    }
}

impl<W: ResponseWriter> Flush for ResponseCapture<W> {
    fn flush(&mut self) {
        ResponseCapture::flush(self)
    }
}

impl<W: ResponseWriter> Hijack for ResponseCapture<W> {
    fn hijack(&mut self) -> Result<Hijacked, CaptureError> {
        ResponseCapture::hijack(self)
    }
}
