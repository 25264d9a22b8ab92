// src/registry/mod.rs
mod backend;

pub use backend::{Backend, RegistryError, RegistrySnapshot};

use crate::persistence::Persister;
use backend::BackendState;
use std::collections::HashMap;
use std::sync::Mutex;

/// Sole authority over the backend set and its runtime state.
///
/// All reads and writes to the url list, the per-url state map, `in_flight`,
/// and `healthy` go through the single [`Mutex`] below. The lock is a plain
/// `std::sync::Mutex`, not an async one and not sharded across fields: every
/// operation here is pure in-memory bookkeeping, so the lock is never held
/// across an `.await` and `select`/`release` never need to be async
/// themselves. Persistence is triggered from `add`/`remove` *after* the lock
/// is released, so a slow or failing disk write can never stall a request
/// that is merely trying to select or release a backend.
pub struct Registry {
    inner: Mutex<Inner>,
    persister: Persister,
}

struct Inner {
    /// Insertion order. This list, not the map, is the tie-break order for
    /// `select` and the order persisted to disk.
    order: Vec<String>,
    backends: HashMap<String, BackendState>,
}

impl Registry {
    /// Build a registry already populated with `initial` (e.g. the roster
    /// `Persister::load` returned at startup). Every backend starts
    /// `healthy = false`, `in_flight = 0`, matching the lifecycle rule that
    /// only the Health Prober may ever mark a backend healthy.
    pub fn new(persister: Persister, initial: Vec<String>) -> Self {
        let mut order = Vec::with_capacity(initial.len());
        let mut backends = HashMap::with_capacity(initial.len());
        for url in initial {
            if !backends.contains_key(&url) {
                order.push(url.clone());
                backends.insert(url, BackendState::default());
            }
        }
        Self {
            inner: Mutex::new(Inner { order, backends }),
            persister,
        }
    }

    /// Idempotent add. Returns the resulting roster either way.
    pub async fn add(&self, url: String) -> Vec<String> {
        let roster = {
            let mut inner = self.inner.lock().expect("registry lock poisoned");
            if !inner.backends.contains_key(&url) {
                inner.order.push(url.clone());
                inner.backends.insert(url, BackendState::default());
            }
            inner.order.clone()
        };
        self.persister.save(&roster).await;
        roster
    }

    /// Idempotent remove. In-flight requests against a removed backend keep
    /// running; their eventual `release` finds nothing and is a no-op.
    pub async fn remove(&self, url: &str) -> Vec<String> {
        let roster = {
            let mut inner = self.inner.lock().expect("registry lock poisoned");
            if inner.backends.remove(url).is_some() {
                inner.order.retain(|u| u != url);
            }
            inner.order.clone()
        };
        self.persister.save(&roster).await;
        roster
    }

    /// The current roster plus a snapshot of each backend's runtime state.
    pub fn list(&self) -> RegistrySnapshot {
        let inner = self.inner.lock().expect("registry lock poisoned");
        let mut in_flight = HashMap::with_capacity(inner.order.len());
        let mut healthy = HashMap::with_capacity(inner.order.len());
        for url in &inner.order {
            let state = &inner.backends[url];
            in_flight.insert(url.clone(), state.in_flight);
            healthy.insert(url.clone(), state.healthy);
        }
        RegistrySnapshot {
            servers: inner.order.clone(),
            in_flight,
            healthy,
        }
    }

    /// Just the url list, insertion-ordered. Used by the Health Prober to
    /// take its per-cycle snapshot without caring about runtime state.
    pub fn urls(&self) -> Vec<String> {
        self.inner.lock().expect("registry lock poisoned").order.clone()
    }

    /// Least-outstanding-requests selection: the healthy backend with the
    /// smallest `in_flight`, earliest-inserted wins ties. Atomically bumps
    /// the winner's `in_flight` before returning it, per the design's
    /// counting discipline -- the increment and the decision to select must
    /// happen under the same lock acquisition or two requests could race
    /// onto what looks like the same minimum.
    pub fn select(&self) -> Result<String, RegistryError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let winner = inner
            .order
            .iter()
            .filter(|url| inner.backends[*url].healthy)
            .min_by_key(|url| inner.backends[*url].in_flight)
            .cloned();

        match winner {
            Some(url) => {
                inner.backends.get_mut(&url).unwrap().in_flight += 1;
                Ok(url)
            }
            None => Err(RegistryError::NoHealthyBackend),
        }
    }

    /// Decrement `in_flight` for `url`. Silently does nothing if the backend
    /// was removed mid-request or its count is already at zero -- this must
    /// never panic or error, since it runs from cleanup paths including
    /// client cancellation.
    pub fn release(&self, url: &str) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if let Some(state) = inner.backends.get_mut(url) {
            if state.in_flight > 0 {
                state.in_flight -= 1;
            }
        }
    }

    /// Update a backend's health flag. No-op if `url` is absent, which
    /// naturally handles a backend removed between the Prober's snapshot and
    /// the completion of its probe.
    pub fn set_health(&self, url: &str, healthy: bool) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if let Some(state) = inner.backends.get_mut(url) {
            state.healthy = healthy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Persister;

    fn registry() -> Registry {
        let path = std::env::temp_dir().join(format!(
            "lor-balancer-registry-test-{}-{}.json",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        Registry::new(Persister::new(path), Vec::new())
    }

    #[tokio::test]
    async fn add_is_idempotent_and_preserves_insertion_order() {
        let registry = registry();
        registry.add("http://a".into()).await;
        registry.add("http://b".into()).await;
        let roster = registry.add("http://a".into()).await;
        assert_eq!(roster, vec!["http://a", "http://b"]);
    }

    #[tokio::test]
    async fn remove_of_absent_url_is_a_no_op() {
        let registry = registry();
        registry.add("http://a".into()).await;
        let roster = registry.remove("http://nonexistent").await;
        assert_eq!(roster, vec!["http://a"]);
    }

    #[tokio::test]
    async fn select_fails_with_no_healthy_backend_on_an_empty_registry() {
        let registry = registry();
        assert_eq!(registry.select(), Err(RegistryError::NoHealthyBackend));
    }

    #[tokio::test]
    async fn select_skips_unhealthy_backends() {
        let registry = registry();
        registry.add("http://a".into()).await;
        registry.add("http://b".into()).await;
        registry.set_health("http://b", true);

        assert_eq!(registry.select().unwrap(), "http://b");
    }

    #[tokio::test]
    async fn select_prefers_fewest_in_flight_with_earliest_insertion_tiebreak() {
        let registry = registry();
        registry.add("http://a".into()).await;
        registry.add("http://b".into()).await;
        registry.set_health("http://a", true);
        registry.set_health("http://b", true);

        // Tie at in_flight=0: earliest inserted (a) wins.
        assert_eq!(registry.select().unwrap(), "http://a");

        // a now has in_flight=1, b has in_flight=0: b wins.
        assert_eq!(registry.select().unwrap(), "http://b");

        // Both at in_flight=1: earliest inserted (a) wins again.
        assert_eq!(registry.select().unwrap(), "http://a");
    }

    #[tokio::test]
    async fn release_decrements_and_never_underflows() {
        let registry = registry();
        registry.add("http://a".into()).await;
        registry.set_health("http://a", true);

        registry.select().unwrap();
        registry.release("http://a");
        registry.release("http://a"); // extra release: must not panic or go negative

        let snapshot = registry.list();
        assert_eq!(snapshot.in_flight["http://a"], 0);
    }

    #[tokio::test]
    async fn release_after_removal_is_a_silent_no_op() {
        let registry = registry();
        registry.add("http://a".into()).await;
        registry.set_health("http://a", true);
        registry.select().unwrap();

        registry.remove("http://a").await;
        registry.release("http://a"); // must not panic
    }

    #[tokio::test]
    async fn set_health_on_absent_url_is_a_no_op() {
        let registry = registry();
        registry.set_health("http://ghost", true); // must not panic
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::persistence::Persister;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Select,
        Release(usize),
    }

    fn op_strategy(n_backends: usize) -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Select),
            1 => (0..n_backends).prop_map(Op::Release),
        ]
    }

    proptest! {
        // P1: in_flight(url) always equals the number of selects that have
        // not yet been matched by a release, and every count lands back at
        // zero once every outstanding selection has been released.
        #[test]
        fn selected_minus_released_matches_in_flight(
            ops in prop::collection::vec(op_strategy(3), 0..200)
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let path = std::env::temp_dir().join(format!(
                    "lor-balancer-prop-test-{}-{}.json",
                    std::process::id(),
                    uuid::Uuid::new_v4()
                ));
                let registry = Registry::new(Persister::new(path), Vec::new());
                let urls = ["http://a", "http://b", "http://c"];
                for url in urls {
                    registry.add(url.to_string()).await;
                    registry.set_health(url, true);
                }

                let mut selected: Vec<String> = Vec::new();
                for op in ops {
                    match op {
                        Op::Select => {
                            if let Ok(url) = registry.select() {
                                selected.push(url);
                            }
                        }
                        Op::Release(idx) => {
                            if !selected.is_empty() {
                                let url = selected.remove(idx % selected.len());
                                registry.release(&url);
                            }
                        }
                    }
                }

                let snapshot = registry.list();
                for url in urls {
                    let expected = selected.iter().filter(|u| u.as_str() == url).count() as u32;
                    prop_assert_eq!(snapshot.in_flight[url], expected);
                }

                // Draining every outstanding selection brings every backend to zero.
                for url in selected {
                    registry.release(&url);
                }
                let drained = registry.list();
                for url in urls {
                    prop_assert_eq!(drained.in_flight[url], 0);
                }
                Ok(())
            })
            .unwrap();
        }

        // P2: select() always returns a healthy backend with the minimum
        // in_flight among healthy backends.
        #[test]
        fn select_always_returns_the_minimum_in_flight_healthy_backend(
            n_selects in 0usize..50,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let path = std::env::temp_dir().join(format!(
                    "lor-balancer-prop-test-min-{}-{}.json",
                    std::process::id(),
                    uuid::Uuid::new_v4()
                ));
                let registry = Registry::new(Persister::new(path), Vec::new());
                let urls = ["http://a", "http://b", "http://c"];
                for url in urls {
                    registry.add(url.to_string()).await;
                    registry.set_health(url, true);
                }

                for _ in 0..n_selects {
                    let before = registry.list();
                    let min_before = urls
                        .iter()
                        .map(|u| before.in_flight[*u])
                        .min()
                        .unwrap();

                    let chosen = registry.select().unwrap();
                    prop_assert_eq!(before.in_flight[chosen.as_str()], min_before);
                }
                Ok(())
            })
            .unwrap();
        }
    }
}
