use std::net::SocketAddr;

use bytes::Bytes;
use clap::Parser;
use http::header::{HeaderValue, CONNECTION, CONTENT_TYPE, UPGRADE};
use http::{Request, StatusCode};

use response_capture::config::Config;
use response_capture::server;
use response_capture::{CaptureError, Logger, ResponseWriter};

/// capture-server runs a small set of demo routes behind a middleware that
/// captures and logs every response they produce.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env)]
    pub config: Option<String>,

    /// Log level
    #[arg(short, long, default_value_t = tracing::Level::INFO, env)]
    pub log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let config = match args.config.as_deref() {
        Some(path) => Config::parse(path)?,
        None => Config::default(),
    };

    let listen_addr: SocketAddr = config.server.address.parse()?;
    let app = Logger::new(route).with_body_limit(config.logging.body_limit);

    tokio::select! {
        result = server::serve(&listen_addr, app) => result?,
        result = shutdown_signal() => {
            result?;
            tracing::info!("Received shutdown signal, exiting");
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

fn route(writer: &mut dyn ResponseWriter, request: &Request<Bytes>) {
    match request.uri().path() {
        "/" => respond(writer, StatusCode::OK, "Hello, world!"),
        "/health" => respond(writer, StatusCode::OK, "OK"),
        "/echo" => echo(writer, request),
        "/upgrade" => upgrade(writer, request),
        _ => respond(writer, StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn respond(writer: &mut dyn ResponseWriter, status: StatusCode, text: &'static str) {
    writer
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    writer.write_header(status);

    if let Err(e) = writer.write(text.as_bytes()) {
        tracing::debug!("Failed to write response: {}", e);
    }
}

fn echo(writer: &mut dyn ResponseWriter, request: &Request<Bytes>) {
    if let Some(content_type) = request.headers().get(CONTENT_TYPE) {
        writer
            .headers_mut()
            .insert(CONTENT_TYPE, content_type.clone());
    }

    if let Err(e) = writer.write(request.body()) {
        tracing::debug!("Failed to echo request body: {}", e);
    }
}

/// Switches to a raw byte echo over the hijacked connection
fn upgrade(writer: &mut dyn ResponseWriter, request: &Request<Bytes>) {
    if !request.headers().contains_key(UPGRADE) {
        return respond(writer, StatusCode::UPGRADE_REQUIRED, "Upgrade Required");
    }

    let headers = writer.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
    headers.insert(UPGRADE, HeaderValue::from_static("echo"));
    writer.write_header(StatusCode::SWITCHING_PROTOCOLS);

    let hijacked = match writer
        .hijacker()
        .ok_or(CaptureError::HijackUnsupported)
        .and_then(|hijacker| hijacker.hijack())
    {
        Ok(hijacked) => hijacked,
        Err(e) => {
            tracing::error!("Failed to hijack connection: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        let conn = match hijacked.await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!("Connection upgrade failed: {}", e);
                return;
            }
        };

        let (mut reader, mut writer) = tokio::io::split(conn);

        if let Err(e) = tokio::io::copy(&mut reader, &mut writer).await {
            tracing::debug!("Echo connection terminated: {}", e);
        }
    });
}
