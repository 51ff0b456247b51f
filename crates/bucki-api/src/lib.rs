//! bucki-api: HTTP surface of the Bucki exporter.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Status page listing configured targets |
//! | GET | `{metrics_path}` | Runs one poll cycle, then Prometheus exposition |

pub mod handlers;
pub mod pages;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::routing::get;
use tokio::sync::Mutex;
use tracing::debug;

use bucki_core::ExporterConfig;
use bucki_health::{Aggregator, PollError, Poller, Probe};
use bucki_metrics::{MetricStore, Reconciler, render_counter, render_gauge, render_prometheus};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

struct Inner<P> {
    config: ExporterConfig,
    aggregator: Aggregator<P>,
    /// Held for a whole cycle, so cycles never overlap.
    reconciler: Mutex<Reconciler>,
    store: MetricStore,
    scrapes: AtomicU64,
    started_at: f64,
}

/// Shared state for the exporter handlers.
pub struct ExporterState<P = Poller> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for ExporterState<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ExporterState<Poller> {
    /// State backed by the real HTTP poller.
    pub fn with_poller(config: ExporterConfig) -> Result<Self, PollError> {
        Ok(Self::new(config, Poller::new()?))
    }
}

impl<P: Probe> ExporterState<P> {
    pub fn new(config: ExporterConfig, probe: P) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Self {
            inner: Arc::new(Inner {
                config,
                aggregator: Aggregator::new(probe),
                reconciler: Mutex::new(Reconciler::new()),
                store: MetricStore::new(),
                scrapes: AtomicU64::new(0),
                started_at,
            }),
        }
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &MetricStore {
        &self.inner.store
    }

    pub fn scrapes(&self) -> u64 {
        self.inner.scrapes.load(Ordering::Relaxed)
    }

    /// Handle one scrape request: count it, run a cycle, render.
    pub async fn scrape(&self) -> String {
        self.inner.scrapes.fetch_add(1, Ordering::Relaxed);
        self.run_cycle().await;
        self.render().await
    }

    /// Poll every target and reconcile the results into the store.
    ///
    /// Returns the number of effective store writes.
    pub async fn run_cycle(&self) -> usize {
        let mut reconciler = self.inner.reconciler.lock().await;
        let config = &self.inner.config;
        let observations = self
            .inner
            .aggregator
            .run_cycle(&config.targets, config.client_timeout)
            .await;
        let applied = reconciler
            .run(observations.into_values(), &self.inner.store)
            .await;
        debug!(targets = config.targets.len(), applied, "scrape cycle complete");
        applied
    }

    /// Render the current store plus the exporter's own series.
    pub async fn render(&self) -> String {
        let snapshot = self.inner.store.snapshot().await;
        let mut out = render_prometheus(&snapshot);

        render_counter(
            &mut out,
            "bucki_scrape_count",
            "Total number bucki exporter scraped",
            self.scrapes() as f64,
        );

        if !self.inner.config.only_bucki_metrics {
            let version = [VERSION.to_string()];
            render_gauge(
                &mut out,
                "bucki_exporter_build_info",
                "Version of the bucki exporter, always (1)",
                &["version"],
                [(version.as_slice(), 1.0)],
            );
            let no_labels: [String; 0] = [];
            render_gauge(
                &mut out,
                "process_start_time_seconds",
                "Start time of the process since unix epoch in seconds",
                &[],
                [(no_labels.as_slice(), self.inner.started_at)],
            );
        }
        out
    }
}

/// Build the exporter router (status page + metrics).
pub fn build_router<P: Probe>(state: ExporterState<P>) -> Router {
    let metrics_path = state.config().metrics_path.clone();
    Router::new()
        .route("/", get(pages::index::<P>))
        .route(&metrics_path, get(handlers::metrics::<P>))
        .with_state(state)
}
