//! Per-target reconciliation of check series.
//!
//! Each target has a [`HealthPoint`]: the exact set of check series (and
//! their values) currently published for it. A new observation is diffed
//! against it to produce the retractions and upserts that move the store
//! from the old state to the new one. The HealthPoint is then replaced
//! wholesale by the shape of the observation, never merged.
//!
//! Data fields are diffed on name *and* classification, so a field that
//! flips between numeric and textual is retracted under its old family and
//! published under the new one. Textual fields carry their value as a label,
//! so a changed value is a retraction of the old pair plus a new upsert.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use bucki_core::{DataValue, HealthStatus, Observation};

use crate::family::Gauge;
use crate::store::{MetricOp, MetricStore, SeriesKey};

/// Check series published for one check.
#[derive(Debug, Clone, Default)]
pub struct CheckPoint {
    pub status: HealthStatus,
    pub numeric: BTreeMap<String, f64>,
    pub textual: BTreeMap<String, String>,
}

/// Numeric values compare bitwise, so a `NaN` field equals itself.
impl PartialEq for CheckPoint {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status
            && self.textual == other.textual
            && self.numeric.len() == other.numeric.len()
            && self
                .numeric
                .iter()
                .zip(&other.numeric)
                .all(|((a, x), (b, y))| a == b && x.to_bits() == y.to_bits())
    }
}

impl CheckPoint {
    fn status_key(url: &str, name: &str, check: &str) -> SeriesKey {
        SeriesKey::new(Gauge::CheckState, [url, name, check])
    }

    fn numeric_key(url: &str, name: &str, check: &str, field: &str) -> SeriesKey {
        SeriesKey::new(Gauge::CheckDataNumber, [url, name, check, field])
    }

    fn textual_key(url: &str, name: &str, check: &str, field: &str, value: &str) -> SeriesKey {
        SeriesKey::new(Gauge::CheckDataString, [url, name, check, field, value])
    }

    fn series_keys(&self, url: &str, name: &str, check: &str) -> Vec<SeriesKey> {
        let mut keys = vec![Self::status_key(url, name, check)];
        keys.extend(
            self.numeric
                .keys()
                .map(|field| Self::numeric_key(url, name, check, field)),
        );
        keys.extend(
            self.textual
                .iter()
                .map(|(field, value)| Self::textual_key(url, name, check, field, value)),
        );
        keys
    }

    fn upserts(&self, url: &str, name: &str, check: &str, ops: &mut Vec<MetricOp>) {
        ops.push(MetricOp::Upsert(
            Self::status_key(url, name, check),
            self.status.gauge_value(),
        ));
        for (field, value) in &self.numeric {
            ops.push(MetricOp::Upsert(
                Self::numeric_key(url, name, check, field),
                *value,
            ));
        }
        for (field, value) in &self.textual {
            ops.push(MetricOp::Upsert(
                Self::textual_key(url, name, check, field, value),
                1.0,
            ));
        }
    }
}

/// Committed state of one target: exactly what the store holds for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthPoint {
    pub name: String,
    pub address: String,
    pub reachable: bool,
    pub checks: BTreeMap<String, CheckPoint>,
}

impl HealthPoint {
    /// Shape of an observation. Unreachable observations publish no checks.
    pub fn from_observation(observation: &Observation) -> Self {
        let checks = if observation.reachable {
            observation
                .checks
                .iter()
                .map(|(check, result)| {
                    let mut point = CheckPoint {
                        status: result.status,
                        ..CheckPoint::default()
                    };
                    for (field, value) in &result.data {
                        match value {
                            DataValue::Numeric(n) => {
                                point.numeric.insert(field.clone(), *n);
                            }
                            DataValue::Textual(t) => {
                                point.textual.insert(field.clone(), t.clone());
                            }
                        }
                    }
                    (check.clone(), point)
                })
                .collect()
        } else {
            BTreeMap::new()
        };

        Self {
            name: observation.name.clone(),
            address: observation.address.clone(),
            reachable: observation.reachable,
            checks,
        }
    }

    /// Every check series this point claims is published.
    pub fn series_keys(&self) -> Vec<SeriesKey> {
        self.checks
            .iter()
            .flat_map(|(check, point)| point.series_keys(&self.address, &self.name, check))
            .collect()
    }

    fn retract_all(&self, ops: &mut Vec<MetricOp>) {
        ops.extend(self.series_keys().into_iter().map(MetricOp::Retract));
    }

    fn upsert_all(&self, ops: &mut Vec<MetricOp>) {
        for (check, point) in &self.checks {
            point.upserts(&self.address, &self.name, check, ops);
        }
    }
}

/// Per-request series for one observation, written every cycle.
///
/// Unreachable targets get `success=0`, overall state 0, and their
/// response-code series retracted.
pub fn request_ops(observation: &Observation) -> Vec<MetricOp> {
    let labels = [observation.address.as_str(), observation.name.as_str()];
    let key = |gauge| SeriesKey::new(gauge, labels);

    let success = if observation.reachable { 1.0 } else { 0.0 };
    let overall = if observation.reachable {
        observation.overall_status.gauge_value()
    } else {
        0.0
    };
    let response_code = match observation.http_status_code {
        Some(code) if observation.reachable => {
            MetricOp::Upsert(key(Gauge::HttpResponseCode), f64::from(code))
        }
        _ => MetricOp::Retract(key(Gauge::HttpResponseCode)),
    };

    vec![
        MetricOp::Upsert(key(Gauge::HttpSuccess), success),
        MetricOp::Upsert(key(Gauge::HttpDuration), observation.duration_millis),
        response_code,
        MetricOp::Upsert(key(Gauge::OverallState), overall),
    ]
}

/// Diff an observation against the previous HealthPoint of the same target.
///
/// Returns the HealthPoint to commit and the check-series ops. An observation
/// identical in shape and values to `previous` yields no ops.
pub fn reconcile(
    previous: Option<&HealthPoint>,
    observation: &Observation,
) -> (HealthPoint, Vec<MetricOp>) {
    let next = HealthPoint::from_observation(observation);
    let mut ops = Vec::new();

    match previous {
        None => next.upsert_all(&mut ops),
        Some(prev) if *prev == next => {}
        Some(prev) if prev.reachable && !next.reachable => prev.retract_all(&mut ops),
        Some(prev) if prev.address != next.address => {
            prev.retract_all(&mut ops);
            next.upsert_all(&mut ops);
        }
        Some(prev) => {
            let (url, name) = (prev.address.as_str(), prev.name.as_str());
            for (check, old) in &prev.checks {
                let Some(new) = next.checks.get(check) else {
                    ops.extend(
                        old.series_keys(url, name, check)
                            .into_iter()
                            .map(MetricOp::Retract),
                    );
                    continue;
                };
                for field in old.numeric.keys() {
                    if !new.numeric.contains_key(field) {
                        ops.push(MetricOp::Retract(CheckPoint::numeric_key(
                            url, name, check, field,
                        )));
                    }
                }
                for (field, value) in &old.textual {
                    if new.textual.get(field) != Some(value) {
                        ops.push(MetricOp::Retract(CheckPoint::textual_key(
                            url, name, check, field, value,
                        )));
                    }
                }
            }
            next.upsert_all(&mut ops);
        }
    }

    (next, ops)
}

/// Owns the HealthPoint table across cycles.
#[derive(Debug, Default)]
pub struct Reconciler {
    points: HashMap<String, HealthPoint>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn point(&self, name: &str) -> Option<&HealthPoint> {
        self.points.get(name)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Reconcile one cycle of observations into `store`.
    ///
    /// All ops of the cycle are applied in one batch, then every target's
    /// HealthPoint is committed. Returns the number of effective writes.
    pub async fn run<I>(&mut self, observations: I, store: &MetricStore) -> usize
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut ops = Vec::new();
        let mut commits = Vec::new();
        let mut changed = 0;

        for observation in observations {
            let mut previous = self.points.get(&observation.name);
            if let Some(prev) = previous
                && !store.contains_all(&prev.series_keys()).await
            {
                warn!(
                    name = %observation.name,
                    "published series out of sync with committed state, treating as first sighting"
                );
                // Whatever is left of the old shape goes before republishing.
                ops.extend(prev.series_keys().into_iter().map(MetricOp::Retract));
                previous = None;
            }

            ops.extend(request_ops(&observation));
            let (next, diff) = reconcile(previous, &observation);
            if !diff.is_empty() {
                changed += 1;
                debug!(
                    name = %observation.name,
                    upserts = diff.iter().filter(|op| !op.is_retract()).count(),
                    retractions = diff.iter().filter(|op| op.is_retract()).count(),
                    "target state changed"
                );
            }
            ops.extend(diff);
            commits.push((observation.name, next));
        }

        let applied = store.apply(&ops).await;
        for (name, point) in commits {
            self.points.insert(name, point);
        }

        debug!(changed, ops = ops.len(), applied, "cycle reconciled");
        applied
    }
}
