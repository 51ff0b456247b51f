//! Status page.

use askama::Template;
use axum::extract::State;
use axum::response::Html;

use bucki_core::Target;
use bucki_health::Probe;

use crate::{ExporterState, VERSION};

fn render<T: Template>(tmpl: T) -> Html<String> {
    Html(tmpl.render().unwrap_or_else(|e| {
        format!("<pre>Template error: {e}</pre>")
    }))
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    version: &'static str,
    metrics_path: String,
    targets: Vec<Target>,
}

/// GET /
pub async fn index<P: Probe>(State(state): State<ExporterState<P>>) -> Html<String> {
    let config = state.config();
    render(IndexTemplate {
        version: VERSION,
        metrics_path: config.metrics_path.clone(),
        targets: config.targets.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_lists_targets() {
        let html = render(IndexTemplate {
            version: "1.2.3",
            metrics_path: "/metrics".to_string(),
            targets: vec![
                Target::new("orders", "http://orders:8080/health"),
                Target::new("billing", "https://billing/health"),
            ],
        })
        .0;

        assert!(html.contains("Version 1.2.3"));
        assert!(html.contains(r#"href="/metrics""#));
        assert!(html.contains("orders: <a href=\"http://orders:8080/health\">"));
        assert!(html.contains("billing: <a href=\"https://billing/health\">"));
    }

    #[test]
    fn target_names_are_escaped() {
        let html = render(IndexTemplate {
            version: VERSION,
            metrics_path: "/metrics".to_string(),
            targets: vec![Target::new("<b>x</b>", "http://x/health")],
        })
        .0;

        assert!(!html.contains("<b>x</b>"));
    }
}
