use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use http::Request;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tempfile::NamedTempFile;
use tokio::net::TcpListener;

use response_capture::server::serve_listener;
use response_capture::{Handler, ResponseCapture, ResponseWriter};

/// What a capture saw once the handler it wrapped returned
#[derive(Debug, Clone)]
pub struct Observed {
    pub status_code: u16,
    pub written: bool,
    pub size: usize,
    pub body: Option<Bytes>,
}

/// Handler wrapper that records every response its inner handler produces
pub struct Observer<H> {
    inner: H,
    seen: Arc<Mutex<Vec<Observed>>>,
}

impl<H: Handler> Observer<H> {
    pub fn new(inner: H) -> (Self, Observations) {
        let seen = Arc::new(Mutex::new(Vec::new()));

        (
            Self {
                inner,
                seen: Arc::clone(&seen),
            },
            Observations { seen },
        )
    }
}

impl<H: Handler> Handler for Observer<H> {
    fn serve(&self, writer: &mut dyn ResponseWriter, request: &Request<Bytes>) {
        let mut capture = ResponseCapture::new(writer);

        self.inner.serve(&mut capture, request);

        self.seen.lock().expect("poisoned lock").push(Observed {
            status_code: capture.status_code(),
            written: capture.written(),
            size: capture.size(),
            body: capture.body().ok(),
        });
    }
}

#[derive(Clone)]
pub struct Observations {
    seen: Arc<Mutex<Vec<Observed>>>,
}

impl Observations {
    pub fn all(&self) -> Vec<Observed> {
        self.seen.lock().expect("poisoned lock").clone()
    }

    /// Wait until at least `n` responses have been observed
    pub async fn wait_for(&self, n: usize) -> anyhow::Result<Vec<Observed>> {
        for _ in 0..100 {
            let seen = self.all();

            if seen.len() >= n {
                return Ok(seen);
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Err(anyhow::anyhow!("expected {} observed responses", n))
    }
}

/// Serve `handler` on an ephemeral local port
pub async fn spawn_server<H: Handler>(handler: H) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = serve_listener(listener, handler).await {
            panic!("server terminated: {e}");
        }
    });

    Ok(addr)
}

pub struct Process {
    proc: std::process::Child,
}

impl Process {
    pub fn new_with_args(args: &[&str]) -> anyhow::Result<Self> {
        let proc = std::process::Command::new(env!("CARGO_BIN_EXE_capture-server"))
            .args(args)
            .spawn()
            .context("failed to spawn capture-server process")?;

        Ok(Self { proc })
    }

    pub fn kill(&mut self) {
        let _ = self.proc.kill();
    }

    pub fn signal(&mut self, signal: Signal) -> anyhow::Result<()> {
        signal::kill(Pid::from_raw(self.proc.id().try_into()?), signal)
            .context("failed to send signal to capture-server process")
    }

    pub fn proc_mut(&mut self) -> &mut std::process::Child {
        &mut self.proc
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        self.kill();
    }
}

pub struct ConfigFile {
    inner: NamedTempFile,
}

impl ConfigFile {
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        let mut file = NamedTempFile::new().context("failed to create temporary file")?;
        file.as_file_mut()
            .write_all(s.as_bytes())
            .context("failed to write config to temporary file")?;

        Ok(Self { inner: file })
    }

    pub fn path(&self) -> &std::path::Path {
        self.inner.path()
    }

    pub fn path_str(&self) -> &str {
        self.path().to_str().expect("path is not valid utf-8")
    }
}
