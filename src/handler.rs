use std::time::Instant;

use bytes::Bytes;
use http::{Request, StatusCode};

use crate::capture::ResponseCapture;
use crate::error::CaptureError;
use crate::writer::ResponseWriter;

/// Something that can answer a request by driving a [`ResponseWriter`].
///
/// Handlers run synchronously on a blocking thread; the request body has
/// already been collected.
pub trait Handler: Send + Sync + 'static {
    fn serve(&self, writer: &mut dyn ResponseWriter, request: &Request<Bytes>);
}

impl<F> Handler for F
where
    F: Fn(&mut dyn ResponseWriter, &Request<Bytes>) + Send + Sync + 'static,
{
    fn serve(&self, writer: &mut dyn ResponseWriter, request: &Request<Bytes>) {
        self(writer, request)
    }
}

/// Middleware that logs every response the inner handler produces
#[derive(Debug, Clone)]
pub struct Logger<H> {
    inner: H,
    body_limit: usize,
}

impl<H: Handler> Logger<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            body_limit: 0,
        }
    }

    /// Also log up to `limit` bytes of each response body at debug level
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }
}

impl<H: Handler> Handler for Logger<H> {
    #[tracing::instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
    fn serve(&self, writer: &mut dyn ResponseWriter, request: &Request<Bytes>) {
        let started = Instant::now();
        let mut capture = ResponseCapture::new(writer);

        self.inner.serve(&mut capture, request);

        // A handler that wrote nothing still gets the implicit 200 on the wire
        let status = capture.status().unwrap_or(StatusCode::OK);

        tracing::info!(
            status = status.as_u16(),
            size = capture.size(),
            written = capture.written(),
            elapsed = ?started.elapsed(),
            "Request completed"
        );

        if self.body_limit == 0 {
            return;
        }

        match capture.body() {
            Ok(body) => {
                let shown = &body[..body.len().min(self.body_limit)];

                tracing::debug!(
                    body = %String::from_utf8_lossy(shown),
                    truncated = body.len() > shown.len(),
                    "Response body"
                );
            }
            Err(CaptureError::NoBody) => tracing::debug!("Response has no body"),
            Err(e) => tracing::debug!("Response body unavailable: {}", e),
        }
    }
}
