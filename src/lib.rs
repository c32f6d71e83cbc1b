//! Observability hooks for HTTP response writers.
//!
//! [`ResponseCapture`] wraps a [`ResponseWriter`] and records the status,
//! size and body of whatever a handler sends through it, while passing every
//! call on unchanged. The remaining modules provide a hyper-backed writer, an
//! in-memory one, and a small server to run handlers on.

pub mod capture;
pub mod config;
pub mod error;
pub mod handler;
pub mod hyper_writer;
pub mod recorder;
pub mod server;
pub mod writer;

pub use capture::ResponseCapture;
pub use error::CaptureError;
pub use handler::{Handler, Logger};
pub use recorder::ResponseRecorder;
pub use writer::{CloseGuard, CloseNotify, Flush, Hijack, Hijacked, Io, ResponseWriter};
