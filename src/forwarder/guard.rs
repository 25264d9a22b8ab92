// src/forwarder/guard.rs
use crate::registry::Registry;
use std::sync::Arc;

/// Scoped cleanup that decrements a backend's `in_flight` count on
/// destruction rather than at an explicit return site.
///
/// This is deliberately the *only* place `Registry::release` is called from
/// the request path. Every exit from a proxied request -- success, a 502/503
/// response, client cancellation, or a panic unwinding through the handler
/// task -- drops this guard exactly once, which is what the design calls the
/// single most bug-prone contract in the system: branching `release()` calls
/// at each return site is how double-releases and leaked counts happen.
pub struct InFlightGuard {
    registry: Arc<Registry>,
    target: String,
}

impl InFlightGuard {
    pub fn new(registry: Arc<Registry>, target: String) -> Self {
        Self { registry, target }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(&self.target);
    }
}
