//! Gauge families published for health targets.

/// Every gauge family the exporter publishes per target.
///
/// Variant order is exposition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Gauge {
    HttpSuccess,
    HttpDuration,
    HttpResponseCode,
    OverallState,
    CheckState,
    CheckDataNumber,
    CheckDataString,
}

impl Gauge {
    pub const ALL: [Gauge; 7] = [
        Gauge::HttpSuccess,
        Gauge::HttpDuration,
        Gauge::HttpResponseCode,
        Gauge::OverallState,
        Gauge::CheckState,
        Gauge::CheckDataNumber,
        Gauge::CheckDataString,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Gauge::HttpSuccess => "bucki_http_success",
            Gauge::HttpDuration => "bucki_http_duration",
            Gauge::HttpResponseCode => "bucki_http_response_code",
            Gauge::OverallState => "bucki_overall_state",
            Gauge::CheckState => "bucki_check_state",
            Gauge::CheckDataNumber => "bucki_check_data_number",
            Gauge::CheckDataString => "bucki_check_data_string",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Gauge::HttpSuccess => "Current request succeeded (1) or not (0)",
            Gauge::HttpDuration => "Duration of http request in ms",
            Gauge::HttpResponseCode => "Response code of http request",
            Gauge::OverallState => "Microprofile health overall status UP (1) or DOWN (0) else (3)",
            Gauge::CheckState => "Microprofile health check status UP (1) or DOWN (0) else (3)",
            Gauge::CheckDataNumber => "Microprofile health check data as gauge (if it is a number)",
            Gauge::CheckDataString => {
                "Microprofile health check data value as label (if it is a string, always (1))"
            }
        }
    }

    /// Label names, in the order label values are stored.
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Gauge::HttpSuccess
            | Gauge::HttpDuration
            | Gauge::HttpResponseCode
            | Gauge::OverallState => &["url", "name"],
            Gauge::CheckState => &["url", "name", "check"],
            Gauge::CheckDataNumber => &["url", "name", "check", "data"],
            Gauge::CheckDataString => &["url", "name", "check", "data", "value"],
        }
    }
}
