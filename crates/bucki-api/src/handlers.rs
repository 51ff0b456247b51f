//! Scrape endpoint.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;

use bucki_health::Probe;

use crate::ExporterState;

/// Prometheus text exposition format, version 0.0.4.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET {metrics_path}
///
/// Every request runs a full poll cycle before rendering.
pub async fn metrics<P: Probe>(State(state): State<ExporterState<P>>) -> impl IntoResponse {
    let body = state.scrape().await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        body,
    )
}
