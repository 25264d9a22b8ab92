// src/registry/backend.rs
use std::collections::HashMap;
use thiserror::Error;

/// Runtime state the Registry tracks for one backend. Never constructed
/// directly by callers -- `in_flight` is only ever mutated by
/// [`super::Registry::select`] and [`super::Registry::release`], `healthy`
/// only by [`super::Registry::set_health`].
#[derive(Debug, Default)]
pub(super) struct BackendState {
    pub in_flight: u32,
    pub healthy: bool,
}

/// A point-in-time view of one backend, as handed back to management API
/// callers. Not the Registry's internal representation -- just a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub url: String,
    pub in_flight: u32,
    pub healthy: bool,
}

/// The current roster plus per-backend runtime state, as returned by
/// `Registry::list` and rendered by the `/queue-lengths` management
/// endpoint.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub servers: Vec<String>,
    pub in_flight: HashMap<String, u32>,
    pub healthy: HashMap<String, bool>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no healthy backend available")]
    NoHealthyBackend,
}
