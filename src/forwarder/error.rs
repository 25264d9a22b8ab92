// src/forwarder/error.rs
use hyper::{Body, Response, StatusCode};
use thiserror::Error;

/// Errors that prevent a proxied request from being served. Both variants
/// are mapped straight to an HTTP status and a short body -- neither ever
/// propagates past the Forwarder.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("no healthy backend available")]
    NoHealthyBackend,

    #[error("{0}")]
    Transport(String),
}

impl ForwardError {
    pub fn to_response(&self) -> Response<Body> {
        match self {
            ForwardError::NoHealthyBackend => {
                error_response(StatusCode::SERVICE_UNAVAILABLE, "No available backends")
            }
            ForwardError::Transport(message) => error_response(StatusCode::BAD_GATEWAY, message),
        }
    }
}

pub fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Body::from(message.to_string()))
        .expect("static error response is always well-formed")
}
