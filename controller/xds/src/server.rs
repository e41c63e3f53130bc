use crate::{
    discovery::{DiscoveryRequest, ResourceType},
    metrics::DiscoveryMetrics,
    Error, ResourceCache,
};
use bytes::{Buf, Bytes};
use futures::future;
use http_body_util::BodyExt;
use hyper::{Request, Response};
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, time};
use tracing::{debug, info, info_span, trace, warn, Instrument};

type Body = http_body_util::Full<Bytes>;

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(15);

/// Answers proxy discovery requests and developer snapshot queries from a
/// [`ResourceCache`].
///
/// A request whose `version_info` matches the served version is held until
/// the bundle changes or the poll timeout elapses, in which case it is
/// answered with `304 Not Modified`.
#[derive(Clone, Debug)]
pub struct DiscoveryService {
    cache: ResourceCache,
    poll_timeout: Duration,
    metrics: Arc<DiscoveryMetrics>,
}

// === impl DiscoveryService ===

impl DiscoveryService {
    pub fn new(cache: ResourceCache, metrics: DiscoveryMetrics) -> Self {
        Self {
            cache,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            metrics: Arc::new(metrics),
        }
    }

    pub fn with_poll_timeout(self, poll_timeout: Duration) -> Self {
        Self {
            poll_timeout,
            ..self
        }
    }

    async fn discover(
        self,
        rtype: ResourceType,
        req: DiscoveryRequest,
    ) -> Result<Response<Body>, Error> {
        let key = req.node.group_key().to_string();

        // Subscribe before reading so an install between the two is not missed.
        let mut updates = self.cache.updates();
        let mut bundle = self.cache.get_snapshot(&key);
        if !req.version_info.is_empty() && req.version_info == bundle.version {
            let timeout = time::sleep(self.poll_timeout);
            tokio::pin!(timeout);
            loop {
                tokio::select! {
                    _ = &mut timeout => {
                        trace!(%key, version = %req.version_info, "Poll timed out");
                        self.metrics.observe(rtype.as_str(), "not_modified");
                        return Ok(empty(http::StatusCode::NOT_MODIFIED));
                    }
                    res = updates.changed() => {
                        if res.is_err() {
                            self.metrics.observe(rtype.as_str(), "not_modified");
                            return Ok(empty(http::StatusCode::NOT_MODIFIED));
                        }
                        bundle = self.cache.get_snapshot(&key);
                        if bundle.version != req.version_info {
                            break;
                        }
                    }
                }
            }
        }

        let outcome = if self.cache.contains(&key) {
            "ok"
        } else {
            "fallback"
        };
        debug!(
            %key,
            node = %req.node.id,
            resource = rtype.as_str(),
            version = %bundle.version,
            outcome,
            "Serving discovery response"
        );
        self.metrics.observe(rtype.as_str(), outcome);
        json_response(&rtype.respond(&bundle, &req.resource_names)?)
    }

    fn snapshots(&self, path: &str) -> Result<Response<Body>, Error> {
        match path.trim_start_matches('/').split_once('/') {
            None => json_response(&self.cache.keys()),
            Some((_, key)) if self.cache.contains(key) => {
                json_response(&*self.cache.get_snapshot(key))
            }
            Some(_) => Ok(empty(http::StatusCode::NOT_FOUND)),
        }
    }
}

impl<B> tower::Service<Request<B>> for DiscoveryService
where
    B: hyper::body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        trace!(method = %req.method(), path = %req.uri().path());
        let path = req.uri().path().to_string();

        if req.method() == http::Method::GET
            && (path == "/snapshots" || path.starts_with("/snapshots/"))
        {
            return Box::pin(future::ready(self.snapshots(&path)));
        }

        let Some(rtype) = ResourceType::from_path(&path) else {
            return Box::pin(future::ok(empty(http::StatusCode::NOT_FOUND)));
        };
        if req.method() != http::Method::POST {
            return Box::pin(future::ok(empty(http::StatusCode::METHOD_NOT_ALLOWED)));
        }

        let svc = self.clone();
        Box::pin(async move {
            let bytes = req
                .into_body()
                .collect()
                .await
                .map_err(|e| Error::Body(e.into()))?
                .to_bytes();
            let dreq: DiscoveryRequest = match serde_json::from_reader(bytes.reader()) {
                Ok(dreq) => dreq,
                Err(error) => {
                    warn!(%error, "Failed to parse discovery request");
                    svc.metrics.observe(rtype.as_str(), "invalid");
                    return Ok(Response::builder()
                        .status(http::StatusCode::BAD_REQUEST)
                        .header(http::header::CONTENT_TYPE, "text/plain")
                        .body(Body::from(format!("invalid discovery request: {error}\n")))
                        .expect("bad request response must be valid"));
                }
            };
            svc.discover(rtype, dreq).await
        })
    }
}

fn json_response<T: Serialize + ?Sized>(value: &T) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("json response must be valid"))
}

fn empty(status: http::StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::default())
        .expect("empty response must be valid")
}

/// Serves `service` over HTTP/1 on `addr` until `drain` is signaled. Open
/// connections are closed gracefully.
pub async fn serve(
    addr: SocketAddr,
    service: DiscoveryService,
    drain: drain::Watch,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "Discovery server listening");

    tokio::pin! {
        let shutdown = drain.clone().signaled();
    }
    loop {
        let (stream, client) = tokio::select! {
            biased;
            _ = &mut shutdown => {
                debug!("Discovery server shutting down");
                return Ok(());
            }
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(%error, "Failed to accept connection");
                    continue;
                }
            },
        };

        let svc = TowerToHyperService::new(service.clone());
        let drain = drain.clone();
        tokio::spawn(
            async move {
                let conn = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc);
                tokio::pin!(conn);
                tokio::select! {
                    res = &mut conn => {
                        if let Err(error) = res {
                            debug!(%error, "Connection failed");
                        }
                    }
                    release = drain.signaled() => {
                        conn.as_mut().graceful_shutdown();
                        if let Err(error) = conn.await {
                            debug!(%error, "Connection failed during shutdown");
                        }
                        drop(release);
                    }
                }
            }
            .instrument(info_span!("conn", %client)),
        );
    }
}

#[cfg(test)]
mod tests;
