// src/server/handler.rs
use hyper::{Body, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::Service;

use crate::forwarder::Forwarder;

/// Lets [`super::ServerBuilder`] stay generic over its handler type while
/// still being able to tell each per-connection clone which peer it is
/// serving -- `listener.accept()` only yields the remote address at the
/// connection layer, below whatever `Service` ends up handling the request.
pub trait PeerAware {
    fn for_peer(&self, peer: SocketAddr) -> Self;
}

#[derive(Clone)]
pub struct RequestHandler {
    forwarder: Arc<Forwarder>,
    peer: SocketAddr,
}

impl RequestHandler {
    pub fn new(forwarder: Arc<Forwarder>) -> Self {
        Self {
            forwarder,
            peer: SocketAddr::from(([0, 0, 0, 0], 0)),
        }
    }
}

impl PeerAware for RequestHandler {
    fn for_peer(&self, peer: SocketAddr) -> Self {
        Self {
            forwarder: self.forwarder.clone(),
            peer,
        }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let forwarder = self.forwarder.clone();
        let peer = self.peer;
        Box::pin(async move { Ok(forwarder.handle(req, peer).await) })
    }
}
