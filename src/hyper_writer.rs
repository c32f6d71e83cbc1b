use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use hyper::body::{Body, Frame};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::error::CaptureError;
use crate::writer::{CloseGuard, CloseNotify, Flush, Hijack, Hijacked, Io, ResponseWriter};

/// Number of body chunks that may be queued ahead of the client before
/// `write` blocks
pub const BODY_CHANNEL_CAPACITY: usize = 16;

/// Streaming body of a response produced by a [`HyperResponseWriter`].
///
/// Dropping the body before the writer is done (hyper does this when the
/// client goes away) fires the writer's close notification.
pub struct ResponseBody {
    rx: mpsc::Receiver<Bytes>,
    _close_guard: Option<CloseGuard>,
}

impl ResponseBody {
    pub fn empty() -> Self {
        let (_, rx) = mpsc::channel(1);

        Self {
            rx,
            _close_guard: None,
        }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.rx
            .poll_recv(cx)
            .map(|chunk| chunk.map(|data| Ok(Frame::data(data))))
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").finish_non_exhaustive()
    }
}

/// Resolves to the response once its head has been committed
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<Response<ResponseBody>>,
}

impl Future for PendingResponse {
    type Output = Result<Response<ResponseBody>, CaptureError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|response| response.map_err(|_| CaptureError::Abandoned))
    }
}

/// A [`ResponseWriter`] that feeds a hyper response.
///
/// The head is committed on the first write, explicit status, flush or
/// hijack, and otherwise when the writer is dropped. Header changes made after
/// that point are not sent.
///
/// At most [`BODY_CHANNEL_CAPACITY`] chunks are queued for the client. Past
/// that, `write` blocks the calling thread until hyper takes a chunk, so it
/// must not run on a runtime worker thread once the queue can fill up.
pub struct HyperResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<Response<ResponseBody>>>,
    body_tx: Option<mpsc::Sender<Bytes>>,
    body: Option<ResponseBody>,
    on_upgrade: Option<OnUpgrade>,
    close_notify: CloseNotify,
}

impl HyperResponseWriter {
    /// Create a writer and the handle the server awaits for the response.
    ///
    /// `on_upgrade` enables hijacking; it should only be supplied for
    /// requests that asked for a protocol upgrade.
    pub fn new(on_upgrade: Option<OnUpgrade>) -> (Self, PendingResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let (close_guard, close_notify) = CloseNotify::channel();

        let writer = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            head_tx: Some(head_tx),
            body_tx: Some(body_tx),
            body: Some(ResponseBody {
                rx: body_rx,
                _close_guard: Some(close_guard),
            }),
            on_upgrade,
            close_notify,
        };

        (writer, PendingResponse { rx: head_rx })
    }

    pub fn is_committed(&self) -> bool {
        self.head_tx.is_none()
    }

    fn commit(&mut self) {
        let Some(head_tx) = self.head_tx.take() else {
            return;
        };

        let body = self.body.take().unwrap_or_else(ResponseBody::empty);
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();

        if head_tx.send(response).is_err() {
            tracing::debug!(status = %self.status, "Response dropped before its head was committed");
        }
    }
}

impl ResponseWriter for HyperResponseWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.commit();

        let body_tx = self.body_tx.as_ref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "the connection has been hijacked")
        })?;

        if data.is_empty() {
            return Ok(0);
        }

        let closed = || {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                "the client is no longer receiving the response body",
            )
        };

        match body_tx.try_send(Bytes::copy_from_slice(data)) {
            Ok(()) => {}
            Err(TrySendError::Full(chunk)) => {
                body_tx.blocking_send(chunk).map_err(|_| closed())?;
            }
            Err(TrySendError::Closed(_)) => return Err(closed()),
        }

        Ok(data.len())
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.is_committed() {
            tracing::warn!(%status, current = %self.status, "Superfluous write_header call");
            return;
        }

        self.status = status;
        self.commit();
    }

    fn close_notify(&self) -> CloseNotify {
        self.close_notify.clone()
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        if self.on_upgrade.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl Flush for HyperResponseWriter {
    // Frames are handed to hyper as soon as they are written, so the only
    // thing left to push out is a head that hasn't been sent yet
    fn flush(&mut self) {
        self.commit();
    }
}

impl Hijack for HyperResponseWriter {
    fn hijack(&mut self) -> Result<Hijacked, CaptureError> {
        let on_upgrade = self
            .on_upgrade
            .take()
            .ok_or(CaptureError::HijackUnsupported)?;

        // The switching response goes out with an empty body
        if !self.is_committed() {
            self.status = StatusCode::SWITCHING_PROTOCOLS;
        }
        self.commit();
        self.body_tx = None;

        Ok(Hijacked::new(async move {
            let upgraded = on_upgrade
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

            Ok(Box::new(TokioIo::new(upgraded)) as Box<dyn Io>)
        }))
    }
}

impl Drop for HyperResponseWriter {
    fn drop(&mut self) {
        // A handler that panicked must not look like it succeeded
        if std::thread::panicking() {
            return;
        }

        self.commit();
    }
}

impl fmt::Debug for HyperResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperResponseWriter")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("committed", &self.is_committed())
            .field("hijackable", &self.on_upgrade.is_some())
            .finish()
    }
}
