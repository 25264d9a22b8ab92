// src/health/checker.rs
use crate::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Periodic liveness sampling over the Registry's current backend set.
///
/// One probe cycle snapshots the url list, fires a `GET {url}/connection-test`
/// at every backend concurrently (but never two probes for the same backend
/// overlapping, since each cycle only spawns one probe per url and the next
/// cycle does not start until this one has finished), and writes the result
/// back through `Registry::set_health`. The Prober never reads or mutates
/// `in_flight`.
pub struct HealthProber {
    registry: Arc<Registry>,
    client: reqwest::Client,
    interval: Duration,
    timeout: Duration,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl HealthProber {
    pub fn new(
        registry: Arc<Registry>,
        client: reqwest::Client,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        Self {
            registry,
            client,
            interval,
            timeout,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Run the probe loop until `shutdown` is called. Intended to be spawned
    /// as its own long-lived task.
    pub async fn run(self: Arc<Self>) {
        info!(interval = ?self.interval, timeout = ?self.timeout, "starting health prober");
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            self.probe_cycle().await;

            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("health prober shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Cooperative cancellation. Any probes already in flight are left to
    /// finish or hit their own timeout; their results are discarded rather
    /// than awaited.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn probe_cycle(&self) {
        let urls = self.registry.urls();
        if urls.is_empty() {
            return;
        }

        let probes = urls.into_iter().map(|url| {
            let client = self.client.clone();
            let timeout = self.timeout;
            async move {
                let healthy = probe_one(&client, &url, timeout).await;
                (url, healthy)
            }
        });

        let results = futures::future::join_all(probes).await;

        let mut healthy_count = 0;
        for (url, healthy) in &results {
            if *healthy {
                healthy_count += 1;
            }
            self.registry.set_health(url, *healthy);
        }

        debug!(
            healthy = healthy_count,
            total = results.len(),
            "probe cycle complete"
        );
    }
}

async fn probe_one(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let probe_url = format!("{url}/connection-test");
    match tokio::time::timeout(timeout, client.get(&probe_url).send()).await {
        Ok(Ok(response)) => {
            let ok = response.status() == reqwest::StatusCode::OK;
            if !ok {
                debug!(url, status = %response.status(), "health probe returned non-200");
            }
            ok
        }
        Ok(Err(error)) => {
            debug!(url, %error, "health probe transport error");
            false
        }
        Err(_) => {
            debug!(url, "health probe timed out");
            false
        }
    }
}
