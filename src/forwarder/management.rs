// src/forwarder/management.rs
use crate::registry::Registry;
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

/// `/servers` (with any trailing segment) and `/queue-lengths` are the
/// balancer's own surface. Everything else is proxy-eligible.
pub fn is_management_path(path: &str) -> bool {
    path == "/queue-lengths" || path == "/servers" || path.starts_with("/servers/")
}

#[derive(Deserialize)]
struct ServerRequest {
    url: String,
}

#[derive(Serialize)]
struct ServersResponse {
    servers: Vec<String>,
}

#[derive(Serialize)]
struct QueueLengthsResponse {
    queue_lengths: std::collections::HashMap<String, u32>,
    health: std::collections::HashMap<String, bool>,
}

pub async fn handle(registry: &Registry, req: Request<Body>) -> Response<Body> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    if path == "/queue-lengths" {
        return if method == Method::GET {
            let snapshot = registry.list();
            json_response(
                StatusCode::OK,
                &QueueLengthsResponse {
                    queue_lengths: snapshot.in_flight,
                    health: snapshot.healthy,
                },
            )
        } else {
            json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        };
    }

    match method {
        Method::GET => {
            let snapshot = registry.list();
            json_response(StatusCode::OK, &ServersResponse { servers: snapshot.servers })
        }
        Method::POST => {
            let Some(payload) = parse_server_request(req).await else {
                return json_error(StatusCode::BAD_REQUEST, "expected {\"url\": \"<origin>\"}");
            };
            let servers = registry.add(payload.url).await;
            json_response(StatusCode::OK, &ServersResponse { servers })
        }
        Method::DELETE => {
            let Some(payload) = parse_server_request(req).await else {
                return json_error(StatusCode::BAD_REQUEST, "expected {\"url\": \"<origin>\"}");
            };
            let servers = registry.remove(&payload.url).await;
            json_response(StatusCode::OK, &ServersResponse { servers })
        }
        _ => json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
    }
}

async fn parse_server_request(req: Request<Body>) -> Option<ServerRequest> {
    let bytes = hyper::body::to_bytes(req.into_body()).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let payload = serde_json::to_vec(body).expect("management response bodies always serialize");
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(payload))
        .expect("management response is always well-formed")
}

fn json_error(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, &serde_json::json!({ "error": message }))
}
