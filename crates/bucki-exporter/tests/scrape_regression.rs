//! End-to-end scrape tests.
//!
//! Starts real health endpoints on loopback, loads a targets file and drives
//! the exporter router the way Prometheus would.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use tower::ServiceExt;

use bucki_api::{ExporterState, build_router};
use bucki_core::{ExporterConfig, Target};

/// A health endpoint whose body the test can swap between scrapes.
#[derive(Clone)]
struct Endpoint {
    body: Arc<Mutex<String>>,
}

impl Endpoint {
    fn set(&self, body: &str) {
        *self.body.lock().unwrap() = body.to_string();
    }
}

async fn spawn_endpoint(initial: &str) -> (Endpoint, SocketAddr) {
    let endpoint = Endpoint {
        body: Arc::new(Mutex::new(initial.to_string())),
    };
    let router = Router::new()
        .route(
            "/health",
            get(|State(ep): State<Endpoint>| async move { ep.body.lock().unwrap().clone() }),
        )
        .with_state(endpoint.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (endpoint, addr)
}

/// A loopback port with nothing listening on it.
async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn config(targets: Vec<Target>) -> ExporterConfig {
    ExporterConfig {
        client_timeout: Duration::from_secs(2),
        targets,
        ..ExporterConfig::default()
    }
}

async fn get_text(router: &Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn series(body: &str, prefix: &str) -> Vec<String> {
    body.lines()
        .filter(|l| !l.starts_with('#') && l.starts_with(prefix))
        .map(str::to_string)
        .collect()
}

const HEALTHY: &str = r#"{"status":"UP","checks":[
    {"name":"db","status":"UP","data":{"connections":"7","vendor":"postgres"}},
    {"name":"disk","status":"UP","data":{"free":"1024"}}
]}"#;

#[tokio::test]
async fn scrape_reports_live_endpoint() {
    let (_ep, addr) = spawn_endpoint(HEALTHY).await;
    let url = format!("http://{addr}/health");
    let state = ExporterState::with_poller(config(vec![Target::new("orders", &url)])).unwrap();
    let router = build_router(state);

    let (status, body) = get_text(&router, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let labels = format!(r#"url="{url}",name="orders""#);
    assert!(body.contains(&format!("bucki_http_success{{{labels}}} 1\n")));
    assert!(body.contains(&format!("bucki_http_response_code{{{labels}}} 200\n")));
    assert!(body.contains(&format!("bucki_overall_state{{{labels}}} 1\n")));
    assert!(body.contains(&format!(r#"bucki_check_state{{{labels},check="disk"}} 1"#)));
    assert!(body.contains(&format!(
        r#"bucki_check_data_number{{{labels},check="db",data="connections"}} 7"#
    )));
    assert!(body.contains(&format!(
        r#"bucki_check_data_string{{{labels},check="db",data="vendor",value="postgres"}} 1"#
    )));
    assert_eq!(series(&body, "bucki_http_duration{").len(), 1);
}

#[tokio::test]
async fn changes_between_scrapes_retract_stale_series() {
    let (ep, addr) = spawn_endpoint(HEALTHY).await;
    let url = format!("http://{addr}/health");
    let router = build_router(
        ExporterState::with_poller(config(vec![Target::new("orders", &url)])).unwrap(),
    );
    get_text(&router, "/metrics").await;

    // disk check disappears, vendor changes, connections turns textual.
    ep.set(
        r#"{"status":"DOWN","checks":[
            {"name":"db","status":"DOWN","data":{"connections":"n/a","vendor":"mysql"}}
        ]}"#,
    );
    let (_, body) = get_text(&router, "/metrics").await;

    assert!(!body.contains(r#"check="disk""#));
    assert!(!body.contains(r#"value="postgres""#));
    assert!(body.contains(r#"data="vendor",value="mysql"} 1"#));
    assert!(body.contains(r#"data="connections",value="n/a"} 1"#));
    assert!(series(&body, "bucki_check_data_number{").is_empty());
    assert!(series(&body, "bucki_check_state{").iter().all(|l| l.ends_with(" 0")));
    assert!(series(&body, "bucki_overall_state{").iter().all(|l| l.ends_with(" 0")));
}

#[tokio::test]
async fn unreachable_target_does_not_affect_others() {
    let (_ep, addr) = spawn_endpoint(HEALTHY).await;
    let dead = closed_port().await;
    let router = build_router(
        ExporterState::with_poller(config(vec![
            Target::new("orders", format!("http://{addr}/health")),
            Target::new("gone", format!("http://{dead}/health")),
        ]))
        .unwrap(),
    );

    let (_, body) = get_text(&router, "/metrics").await;

    let gone = format!(r#"url="http://{dead}/health",name="gone""#);
    assert!(body.contains(&format!("bucki_http_success{{{gone}}} 0\n")));
    assert!(body.contains(&format!("bucki_overall_state{{{gone}}} 0\n")));
    assert!(!body.contains(&format!("bucki_http_response_code{{{gone}}}")));
    assert!(!body.contains(&format!(r#"{gone},check="#)));
    assert_eq!(series(&body, "bucki_check_state{").len(), 2);
}

#[tokio::test]
async fn scrape_count_increments() {
    let router = build_router(ExporterState::with_poller(config(Vec::new())).unwrap());

    for expected in 1..=3 {
        let (_, body) = get_text(&router, "/metrics").await;
        assert!(body.contains(&format!("bucki_scrape_count {expected}\n")));
    }
}

#[tokio::test]
async fn only_bucki_metrics_drops_process_series() {
    let mut cfg = config(Vec::new());
    cfg.only_bucki_metrics = true;
    let router = build_router(ExporterState::with_poller(cfg).unwrap());

    let (_, body) = get_text(&router, "/metrics").await;

    assert!(body.contains("# TYPE bucki_http_success gauge"));
    assert!(!body.contains("process_start_time_seconds"));
    assert!(!body.contains("bucki_exporter_build_info"));
}

#[tokio::test]
async fn index_page_lists_configured_targets() {
    let router = build_router(
        ExporterState::with_poller(config(vec![
            Target::new("orders", "http://orders:8080/health"),
            Target::new("billing", "http://billing:8080/health"),
        ]))
        .unwrap(),
    );

    let (status, body) = get_text(&router, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("orders"));
    assert!(body.contains("http://billing:8080/health"));
    assert!(body.contains(r#"href="/metrics""#));
}

#[tokio::test]
async fn targets_file_drives_scrape() {
    let (_ep, addr) = spawn_endpoint(HEALTHY).await;
    let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
    write!(
        file,
        "metricspath: /probe\nclienttimeout: 2\nurls:\n  - name: orders\n    address: http://{addr}/health\n"
    )
    .unwrap();

    let cfg = ExporterConfig::default().load(file.path()).unwrap();
    let router = build_router(ExporterState::with_poller(cfg).unwrap());

    let (status, body) = get_text(&router, "/probe").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#"name="orders""#));

    let (status, _) = get_text(&router, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
