use thiserror::Error;

/// Errors surfaced by [`ResponseCapture`](crate::ResponseCapture) and the
/// writers it wraps.
///
/// Transport failures from a delegate's `write` are not represented here; they
/// are returned to the caller as the delegate's own [`std::io::Error`].
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No body has been written yet (end of data). This is distinct from a
    /// body that was written with zero bytes.
    #[error("no response body has been written")]
    NoBody,
    #[error("the response writer doesn't support hijacking the connection")]
    HijackUnsupported,
    /// The writer was dropped without committing a response head
    #[error("the handler went away without producing a response")]
    Abandoned,
}
