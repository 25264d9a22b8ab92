// src/forwarder/forwarder.rs
use super::error::{error_response, ForwardError};
use super::guard::InFlightGuard;
use super::management;
use crate::registry::{Registry, RegistryError};
use crate::retry::RetryPolicy;
use bytes::Bytes;
use futures::Stream;
use hyper::{Body, HeaderMap, Method, Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info_span, Instrument};

const HOP_BY_HOP_RESPONSE_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

/// Implements the proxy request lifecycle: management routing, LOR
/// selection, streaming upstream dispatch with fixed-delay retry, and
/// release-once in-flight accounting.
pub struct Forwarder {
    registry: Arc<Registry>,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl Forwarder {
    pub fn new(registry: Arc<Registry>, client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { registry, client, retry }
    }

    pub async fn handle(&self, req: Request<Body>, client_ip: SocketAddr) -> Response<Body> {
        let path = req.uri().path();
        if management::is_management_path(path) {
            return management::handle(&self.registry, req).await;
        }

        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("proxy_request", %request_id);
        self.proxy(req, client_ip).instrument(span).await
    }

    async fn proxy(&self, req: Request<Body>, client_ip: SocketAddr) -> Response<Body> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);
        let headers = req.headers().clone();

        // The design calls for streaming both bodies, but a request that
        // fails before upstream headers arrive is retried against the same
        // target -- which means the same body has to be resendable. The
        // system this design was distilled from resolves the same tension
        // by buffering the inbound body once (`content=await request.body()`
        // in the original); this crate does the same.
        let body = match hyper::body::to_bytes(req.into_body()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read inbound request body");
                return error_response(StatusCode::BAD_REQUEST, "failed to read request body");
            }
        };

        let target = match self.registry.select() {
            Ok(target) => target,
            Err(RegistryError::NoHealthyBackend) => {
                tracing::error!(%client_ip, %method, %path, "no available backends");
                return ForwardError::NoHealthyBackend.to_response();
            }
        };
        let guard = InFlightGuard::new(self.registry.clone(), target.clone());

        tracing::info!(%client_ip, %method, %path, %target, "routing request");

        let upstream_url = compose_upstream_url(&target, &path, query.as_deref());

        let dispatch_result = self
            .retry
            .execute(|attempt| {
                let client = self.client.clone();
                let method = method.clone();
                let headers = headers.clone();
                let body = body.clone();
                let upstream_url = upstream_url.clone();
                let target = target.clone();
                async move {
                    let result = dispatch(&client, method, &upstream_url, &headers, body).await;
                    if let Err(ref e) = result {
                        tracing::warn!(attempt, %target, error = %e, "attempt to target failed");
                    }
                    result.map(|response| (response, attempt))
                }
            })
            .await;

        match dispatch_result {
            Ok((upstream_response, attempt)) => {
                tracing::info!(status = %upstream_response.status(), %target, attempt, "response from target");
                stream_response(upstream_response, guard)
            }
            Err(e) => {
                tracing::error!(%target, max_attempts = self.retry.max_attempts(), error = %e, "all attempts to target failed");
                e.to_response()
            }
        }
    }
}

/// `{target}{path}?{raw_query}` -- but unlike the Python source this is
/// distilled from (which always appends `?`, even for an empty query), the
/// `?` is only appended when the inbound request actually carried one. See
/// DESIGN.md for the rationale.
fn compose_upstream_url(target: &str, path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{target}{path}?{q}"),
        _ => format!("{target}{path}"),
    }
}

async fn dispatch(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<reqwest::Response, ForwardError> {
    client
        .request(method, url)
        .headers(headers.clone())
        .body(body)
        .send()
        .await
        .map_err(|e| ForwardError::Transport(e.to_string()))
}

fn stream_response(upstream: reqwest::Response, guard: InFlightGuard) -> Response<Body> {
    let status = upstream.status();
    let mut builder = Response::builder().status(status);

    if let Some(response_headers) = builder.headers_mut() {
        for (name, value) in upstream.headers().iter() {
            if HOP_BY_HOP_RESPONSE_HEADERS.contains(&name.as_str().to_ascii_lowercase().as_str()) {
                continue;
            }
            response_headers.append(name, value.clone());
        }
    }

    let body = Body::wrap_stream(guarded_body_stream(upstream.bytes_stream(), guard));
    builder.body(body).expect("proxied response is always well-formed")
}

/// Wraps the upstream byte stream so the in-flight guard lives exactly as
/// long as the response body does: it is held inside the stream's own state,
/// so it is dropped -- and `release()` fires -- whenever hyper drops the
/// body, whether that's because the stream drained normally, the upstream
/// closed early, or the downstream client disconnected mid-transfer.
fn guarded_body_stream(
    inner: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    guard: InFlightGuard,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let mut inner = Box::pin(inner);
    let mut guard = Some(guard);
    futures::stream::poll_fn(move |cx| match inner.as_mut().poll_next(cx) {
        std::task::Poll::Ready(Some(Ok(chunk))) => std::task::Poll::Ready(Some(Ok(chunk))),
        std::task::Poll::Ready(Some(Err(e))) => {
            tracing::info!(error = %e, "upstream closed stream early; ending proxy response cleanly");
            guard.take();
            std::task::Poll::Ready(None)
        }
        std::task::Poll::Ready(None) => {
            guard.take();
            std::task::Poll::Ready(None)
        }
        std::task::Poll::Pending => std::task::Poll::Pending,
    })
}
