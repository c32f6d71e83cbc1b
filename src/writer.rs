//! The capability set a response writer exposes to handlers.
//!
//! Writing bytes, emitting a status and observing client disconnects are
//! required of every writer. Flushing and hijacking are optional: a writer
//! advertises them through [`ResponseWriter::flusher`] and
//! [`ResponseWriter::hijacker`], which default to `None`.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::{HeaderMap, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::error::CaptureError;

pub trait ResponseWriter {
    /// Headers that will be sent with the response head
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Write a chunk of the response body, returning how many bytes were
    /// accepted by the underlying transport
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Send the response head with the given status
    fn write_header(&mut self, status: StatusCode);

    /// Get a handle that resolves once the client connection has gone away
    fn close_notify(&self) -> CloseNotify;

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        None
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        None
    }
}

/// Push any buffered response data to the client. Flushing is advisory and
/// never fails.
pub trait Flush {
    fn flush(&mut self);
}

/// Take over the underlying connection, bypassing any further HTTP
/// processing of the response
pub trait Hijack {
    fn hijack(&mut self) -> Result<Hijacked, CaptureError>;
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn write_header(&mut self, status: StatusCode) {
        (**self).write_header(status)
    }

    fn close_notify(&self) -> CloseNotify {
        (**self).close_notify()
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        (**self).flusher()
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        (**self).hijacker()
    }
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for Box<W> {
    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn write_header(&mut self, status: StatusCode) {
        (**self).write_header(status)
    }

    fn close_notify(&self) -> CloseNotify {
        (**self).close_notify()
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        (**self).flusher()
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        (**self).hijacker()
    }
}

/// A raw, bidirectional connection handed out by a hijack
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// A hijacked connection.
///
/// In an async server the raw connection usually becomes available only after
/// the response head has been flushed to the client, so the connection is
/// handed out as a future.
pub struct Hijacked {
    inner: BoxFuture<'static, io::Result<Box<dyn Io>>>,
}

impl Hijacked {
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = io::Result<Box<dyn Io>>> + Send + 'static,
    {
        Self {
            inner: Box::pin(fut),
        }
    }

    /// Wrap a connection that is already available
    pub fn ready<T: Io + 'static>(io: T) -> Self {
        Self::new(futures::future::ready(Ok(Box::new(io) as Box<dyn Io>)))
    }
}

impl Future for Hijacked {
    type Output = io::Result<Box<dyn Io>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for Hijacked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hijacked").finish_non_exhaustive()
    }
}

/// Receiving half of a close notification
#[derive(Debug, Clone)]
pub struct CloseNotify {
    rx: watch::Receiver<bool>,
}

/// Sending half of a close notification. The signal fires when the guard is
/// closed or dropped, whichever comes first.
#[derive(Debug)]
pub struct CloseGuard {
    tx: watch::Sender<bool>,
}

impl CloseNotify {
    pub fn channel() -> (CloseGuard, CloseNotify) {
        let (tx, rx) = watch::channel(false);

        (CloseGuard { tx }, CloseNotify { rx })
    }

    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the connection is reported closed
    pub async fn closed(&mut self) {
        // A dropped guard has already published `true`, so an error here
        // means the same thing
        let _ = self.rx.wait_for(|closed| *closed).await;
    }
}

impl CloseGuard {
    pub fn close(&self) {
        self.tx.send_replace(true);
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_close_notify_fires_on_guard_drop() {
        let (guard, mut notify) = CloseNotify::channel();
        let observer = notify.clone();

        assert!(!notify.is_closed());

        drop(guard);

        notify.closed().await;
        assert!(notify.is_closed());
        assert!(observer.is_closed());
    }

    #[tokio::test]
    async fn test_close_notify_fires_on_close() {
        let (guard, mut notify) = CloseNotify::channel();

        guard.close();

        tokio::time::timeout(std::time::Duration::from_secs(1), notify.closed())
            .await
            .expect("close notification was not delivered");
        assert!(notify.is_closed());
    }

    #[tokio::test]
    async fn test_hijacked_ready_yields_usable_connection() {
        let (client, server) = tokio::io::duplex(64);

        let mut conn = Hijacked::ready(server).await.unwrap();
        let mut client = client;

        conn.write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }
}
