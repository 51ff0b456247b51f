//! In-memory gauge store.
//!
//! Series are keyed by gauge family plus label values. A retracted series
//! disappears from the exposition entirely, which is not the same as being
//! set to zero. Writes from one cycle are applied under a single write lock,
//! so a concurrent reader sees either the state before or after the cycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::family::Gauge;

/// A gauge family plus one tuple of label values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub gauge: Gauge,
    pub labels: Vec<String>,
}

impl SeriesKey {
    pub fn new<I, S>(gauge: Gauge, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        debug_assert_eq!(
            labels.len(),
            gauge.labels().len(),
            "label arity mismatch for {}",
            gauge.name()
        );
        Self { gauge, labels }
    }
}

/// One mutation of the store.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOp {
    Upsert(SeriesKey, f64),
    Retract(SeriesKey),
}

impl MetricOp {
    pub fn key(&self) -> &SeriesKey {
        match self {
            MetricOp::Upsert(key, _) | MetricOp::Retract(key) => key,
        }
    }

    pub fn is_retract(&self) -> bool {
        matches!(self, MetricOp::Retract(_))
    }
}

/// Process-wide set of published gauge series. Clones share state.
#[derive(Clone, Default)]
pub struct MetricStore {
    series: Arc<RwLock<BTreeMap<SeriesKey, f64>>>,
    /// Count of effective writes (upserts plus retractions that removed a series).
    mutations: Arc<AtomicU64>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: SeriesKey, value: f64) {
        self.series.write().await.insert(key, value);
        self.mutations.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove a series. Returns whether it existed.
    pub async fn retract(&self, key: &SeriesKey) -> bool {
        let removed = self.series.write().await.remove(key).is_some();
        if removed {
            self.mutations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Apply a batch of ops atomically with respect to readers.
    ///
    /// Returns the number of effective writes.
    pub async fn apply(&self, ops: &[MetricOp]) -> usize {
        if ops.is_empty() {
            return 0;
        }
        let mut series = self.series.write().await;
        let mut applied = 0;
        for op in ops {
            match op {
                MetricOp::Upsert(key, value) => {
                    series.insert(key.clone(), *value);
                    applied += 1;
                }
                MetricOp::Retract(key) => {
                    if series.remove(key).is_some() {
                        applied += 1;
                    }
                }
            }
        }
        self.mutations.fetch_add(applied as u64, Ordering::Relaxed);
        applied
    }

    pub async fn get(&self, key: &SeriesKey) -> Option<f64> {
        self.series.read().await.get(key).copied()
    }

    pub async fn contains_all<'a, I>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = &'a SeriesKey>,
    {
        let series = self.series.read().await;
        keys.into_iter().all(|key| series.contains_key(key))
    }

    /// All series ordered by family, then label values.
    pub async fn snapshot(&self) -> Vec<(SeriesKey, f64)> {
        self.series
            .read()
            .await
            .iter()
            .map(|(key, value)| (key.clone(), *value))
            .collect()
    }

    /// Series of one family, ordered by label values.
    pub async fn family(&self, gauge: Gauge) -> Vec<(Vec<String>, f64)> {
        self.series
            .read()
            .await
            .iter()
            .filter(|(key, _)| key.gauge == gauge)
            .map(|(key, value)| (key.labels.clone(), *value))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.series.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.series.read().await.is_empty()
    }

    pub fn mutations(&self) -> u64 {
        self.mutations.load(Ordering::Relaxed)
    }
}
