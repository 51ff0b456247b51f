//! Shared types used across Bucki crates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One configured health-check endpoint.
///
/// Targets are identified by `name`; the reconciler keys its state on it,
/// never on `address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub address: String,
}

impl Target {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Status token reported by a health endpoint, either overall or per check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HealthStatus {
    Up,
    Down,
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Map a wire token to a status. Only the exact tokens `UP` and `DOWN`
    /// are recognised.
    pub fn parse(token: &str) -> Self {
        match token {
            "UP" => HealthStatus::Up,
            "DOWN" => HealthStatus::Down,
            _ => HealthStatus::Unknown,
        }
    }

    /// Gauge value published for this status: UP=1, DOWN=0, anything else=3.
    pub fn gauge_value(self) -> f64 {
        match self {
            HealthStatus::Up => 1.0,
            HealthStatus::Down => 0.0,
            HealthStatus::Unknown => 3.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Up => "UP",
            HealthStatus::Down => "DOWN",
            HealthStatus::Unknown => "UNKNOWN",
        }
    }
}

/// A check data entry, classified once when the report is observed.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// The raw string parsed as a floating-point number.
    Numeric(f64),
    /// Anything that does not parse; published as a label value.
    Textual(String),
}

impl DataValue {
    pub fn classify(raw: &str) -> Self {
        match raw.parse::<f64>() {
            Ok(value) => DataValue::Numeric(value),
            Err(_) => DataValue::Textual(raw.to_string()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataValue::Numeric(_))
    }
}

/// Result of one named check inside a health report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckResult {
    pub status: HealthStatus,
    pub data: BTreeMap<String, DataValue>,
}

impl CheckResult {
    pub fn new(status: HealthStatus) -> Self {
        Self {
            status,
            data: BTreeMap::new(),
        }
    }

    /// Add a raw data entry, classifying it as numeric or textual.
    pub fn with_data(mut self, field: impl Into<String>, raw: &str) -> Self {
        self.data.insert(field.into(), DataValue::classify(raw));
        self
    }
}

/// Normalized result of polling one target once.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub name: String,
    pub address: String,
    /// False when the transport failed or timed out. The fields below are
    /// only meaningful when this is true.
    pub reachable: bool,
    pub http_status_code: Option<u16>,
    /// Elapsed time from first network activity to the full response.
    /// For unreachable targets, the time until the failure.
    pub duration_millis: f64,
    pub overall_status: HealthStatus,
    pub checks: BTreeMap<String, CheckResult>,
}

impl Observation {
    /// A transport-level failure for `target`.
    pub fn unreachable(target: &Target, duration_millis: f64) -> Self {
        Self {
            name: target.name.clone(),
            address: target.address.clone(),
            reachable: false,
            http_status_code: None,
            duration_millis,
            overall_status: HealthStatus::Unknown,
            checks: BTreeMap::new(),
        }
    }

    /// A completed exchange whose body has not (yet) been parsed.
    pub fn reachable(target: &Target, http_status_code: u16, duration_millis: f64) -> Self {
        Self {
            name: target.name.clone(),
            address: target.address.clone(),
            reachable: true,
            http_status_code: Some(http_status_code),
            duration_millis,
            overall_status: HealthStatus::Unknown,
            checks: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: HealthStatus) -> Self {
        self.overall_status = status;
        self
    }

    pub fn with_check(mut self, name: impl Into<String>, check: CheckResult) -> Self {
        self.checks.insert(name.into(), check);
        self
    }
}
