//! Health report wire format.
//!
//! ```json
//! {"status": "UP", "checks": [{"name": "db", "status": "UP", "data": {"pool": "12"}}]}
//! ```
//!
//! `data` may be omitted; when present all of its values must be strings.

use std::collections::BTreeMap;

use serde::Deserialize;

use bucki_core::{CheckResult, DataValue, HealthStatus, Observation};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub checks: Vec<ReportedCheck>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportedCheck {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl HealthReport {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Fill the status and checks of a reachable observation.
    ///
    /// A check name reported twice keeps the last entry.
    pub fn apply(self, mut observation: Observation) -> Observation {
        observation.overall_status = HealthStatus::parse(&self.status);
        for check in self.checks {
            let data = check
                .data
                .iter()
                .map(|(field, raw)| (field.clone(), DataValue::classify(raw)))
                .collect();
            observation.checks.insert(
                check.name,
                CheckResult {
                    status: HealthStatus::parse(&check.status),
                    data,
                },
            );
        }
        observation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucki_core::Target;

    fn base() -> Observation {
        Observation::reachable(&Target::new("svc", "http://svc/health"), 200, 1.0)
    }

    #[test]
    fn parse_full_report() {
        let body = br#"{"status":"UP","checks":[{"name":"db","status":"UP","data":{"pool":"12","vendor":"pg"}}]}"#;
        let obs = HealthReport::parse(body).unwrap().apply(base());

        assert_eq!(obs.overall_status, HealthStatus::Up);
        let db = &obs.checks["db"];
        assert_eq!(db.status, HealthStatus::Up);
        assert_eq!(db.data["pool"], DataValue::Numeric(12.0));
        assert_eq!(db.data["vendor"], DataValue::Textual("pg".to_string()));
    }

    #[test]
    fn data_is_optional() {
        let body = br#"{"status":"DOWN","checks":[{"name":"disk","status":"DOWN"}]}"#;
        let obs = HealthReport::parse(body).unwrap().apply(base());
        assert_eq!(obs.overall_status, HealthStatus::Down);
        assert!(obs.checks["disk"].data.is_empty());
    }

    #[test]
    fn unknown_status_tokens() {
        let body = br#"{"status":"DEGRADED","checks":[{"name":"x","status":"maybe"}]}"#;
        let obs = HealthReport::parse(body).unwrap().apply(base());
        assert_eq!(obs.overall_status, HealthStatus::Unknown);
        assert_eq!(obs.checks["x"].status, HealthStatus::Unknown);
    }

    #[test]
    fn schema_mismatches_are_errors() {
        let bodies: [&[u8]; 5] = [
            b"not json",
            br#"{"checks":[]}"#,
            br#"{"status":"UP"}"#,
            br#"{"status":"UP","checks":[{"status":"UP"}]}"#,
            br#"{"status":"UP","checks":[{"name":"db","status":"UP","data":{"pool":12}}]}"#,
        ];
        for body in bodies {
            assert!(
                HealthReport::parse(body).is_err(),
                "{} should not parse",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn duplicate_check_name_keeps_last() {
        let body = br#"{"status":"UP","checks":[{"name":"db","status":"DOWN"},{"name":"db","status":"UP"}]}"#;
        let obs = HealthReport::parse(body).unwrap().apply(base());
        assert_eq!(obs.checks.len(), 1);
        assert_eq!(obs.checks["db"].status, HealthStatus::Up);
    }
}
