use bytes::Bytes;
use hyper::{body::Incoming, service::service_fn, Request, Response};
use hyper_util::rt::TokioIo;
use prometheus_client::registry::Registry;
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::watch};
use tracing::{debug, info, instrument, warn};

type Body = http_body_util::Full<Bytes>;

/// Serves liveness, readiness, and Prometheus metrics until `drain` is
/// signaled.
#[instrument(skip_all, fields(%addr))]
pub async fn serve(
    addr: SocketAddr,
    ready: watch::Receiver<bool>,
    registry: Registry,
    drain: drain::Watch,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP admin server listening");

    let registry = Arc::new(registry);
    tokio::pin! {
        let shutdown = drain.signaled();
    }
    loop {
        let (stream, _) = tokio::select! {
            biased;
            _ = &mut shutdown => return Ok(()),
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(%error, "Failed to accept connection");
                    continue;
                }
            },
        };

        let ready = ready.clone();
        let registry = registry.clone();
        let svc = service_fn(move |req: Request<Incoming>| {
            let rsp = handle(&ready, &registry, &req);
            async move { Ok::<_, Infallible>(rsp) }
        });
        tokio::spawn(async move {
            if let Err(error) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), svc)
                .await
            {
                debug!(%error, "Admin connection failed");
            }
        });
    }
}

fn handle<B>(
    ready: &watch::Receiver<bool>,
    registry: &Registry,
    req: &Request<B>,
) -> Response<Body> {
    if !matches!(*req.method(), http::Method::GET | http::Method::HEAD) {
        return text(http::StatusCode::METHOD_NOT_ALLOWED, "");
    }
    match req.uri().path() {
        "/live" => text(http::StatusCode::OK, "live\n"),
        "/ready" if *ready.borrow() => text(http::StatusCode::OK, "ready\n"),
        "/ready" => text(http::StatusCode::INTERNAL_SERVER_ERROR, "not ready\n"),
        "/metrics" => metrics(registry),
        _ => text(http::StatusCode::NOT_FOUND, ""),
    }
}

fn metrics(registry: &Registry) -> Response<Body> {
    let mut buf = String::new();
    if let Err(error) = prometheus_client::encoding::text::encode(&mut buf, registry) {
        warn!(%error, "Failed to encode metrics");
        return text(http::StatusCode::INTERNAL_SERVER_ERROR, "");
    }
    Response::builder()
        .status(http::StatusCode::OK)
        .header(
            http::header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )
        .body(Body::from(buf))
        .expect("metrics response must be valid")
}

fn text(status: http::StatusCode, body: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain")
        .body(Body::from(body))
        .expect("text response must be valid")
}
