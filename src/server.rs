use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::UPGRADE;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::handler::Handler;
use crate::hyper_writer::{HyperResponseWriter, ResponseBody};

/// Starts an HTTP server on `listen_addr` that answers every request with
/// `handler`
pub async fn serve<H: Handler>(listen_addr: &SocketAddr, handler: H) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("Server listening on: {}", listen_addr);

    serve_listener(listener, handler).await
}

/// Serves connections accepted from an already bound listener
pub async fn serve_listener<H: Handler>(listener: TcpListener, handler: H) -> anyhow::Result<()> {
    let handler = Arc::new(handler);

    loop {
        let (stream, addr) = listener.accept().await?;
        let handler = Arc::clone(&handler);

        tokio::spawn(async move {
            let svc = service_fn(move |request| dispatch(Arc::clone(&handler), request));

            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), svc)
                .with_upgrades()
                .await
            {
                tracing::error!(
                    addr = ?addr,
                    "Error occurred while serving HTTP connection: {}",
                    err
                );
            }

            tracing::debug!(addr = ?addr, "HTTP connection terminated");
        });
    }
}

async fn dispatch<H: Handler>(
    handler: Arc<H>,
    mut request: Request<Incoming>,
) -> Result<Response<ResponseBody>, hyper::Error> {
    let on_upgrade = request
        .headers()
        .contains_key(UPGRADE)
        .then(|| hyper::upgrade::on(&mut request));

    let (parts, body) = request.into_parts();
    let body: Bytes = body.collect().await?.to_bytes();
    let request = Request::from_parts(parts, body);

    let (mut writer, pending) = HyperResponseWriter::new(on_upgrade);

    // Writes block once the body queue is full, so keep handlers off the
    // reactor. The response head is available as soon as it is committed.
    tokio::task::spawn_blocking(move || {
        handler.serve(&mut writer, &request);
    });

    match pending.await {
        Ok(response) => Ok(response),
        Err(e) => {
            tracing::error!("Failed to produce a response: {}", e);

            let mut response = Response::new(ResponseBody::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;

            Ok(response)
        }
    }
}
