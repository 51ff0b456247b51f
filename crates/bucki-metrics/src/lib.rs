//! bucki-metrics: metric state for the Bucki exporter.
//!
//! Holds the published gauge series, reconciles each cycle's observations
//! against the previously published state, and renders the Prometheus text
//! exposition format.
//!
//! # Architecture
//!
//! ```text
//! Reconciler (HealthPoint per target name)
//!   ├── request_ops()  → per-request series, every cycle
//!   ├── reconcile()    → diff of check series against the HealthPoint
//!   └── run()          → MetricStore::apply() under one write lock, then commit
//!
//! MetricStore
//!   ├── set() / retract() / apply()
//!   └── snapshot() → render_prometheus() for the scrape endpoint
//! ```

pub mod family;
pub mod prometheus;
pub mod reconciler;
pub mod store;

pub use family::Gauge;
pub use prometheus::{render_counter, render_gauge, render_prometheus};
pub use reconciler::{CheckPoint, HealthPoint, Reconciler, reconcile, request_ops};
pub use store::{MetricOp, MetricStore, SeriesKey};
