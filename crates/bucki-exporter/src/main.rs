//! bucki-exporter: polls MicroProfile-style health endpoints and exposes
//! the results as Prometheus gauges.
//!
//! Every scrape of the metrics path polls all configured targets
//! concurrently, reconciles the results into the gauge store and renders it.
//!
//! # Usage
//!
//! ```text
//! bucki-exporter --config.path configs/bucki.yml --web.listen-address :9889
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use bucki_api::{ExporterState, build_router};
use bucki_core::ExporterConfig;
use bucki_core::config::{
    DEFAULT_CLIENT_TIMEOUT_SECS, DEFAULT_CONFIG_PATH, DEFAULT_LISTEN_ADDRESS, DEFAULT_METRICS_PATH,
};

#[derive(Parser, Debug)]
#[command(name = "bucki-exporter", version, about = "Prometheus exporter for health endpoints")]
struct Cli {
    /// Address to listen on for the status page and telemetry.
    #[arg(long = "web.listen-address", default_value = DEFAULT_LISTEN_ADDRESS)]
    listen_address: String,

    /// Path under which to expose metrics.
    #[arg(long = "web.metrics-path", default_value = DEFAULT_METRICS_PATH)]
    metrics_path: String,

    /// Per-request timeout in seconds.
    #[arg(long = "client.timeout", default_value_t = DEFAULT_CLIENT_TIMEOUT_SECS)]
    client_timeout: u64,

    /// Targets file (YAML, or TOML with a `.toml` extension).
    #[arg(long = "config.path", default_value = DEFAULT_CONFIG_PATH)]
    config_path: PathBuf,

    /// Only expose bucki metrics, without build info and process series.
    #[arg(long = "only.bucki-metrics")]
    only_bucki_metrics: bool,

    /// Log output format.
    #[arg(long = "log.format", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    /// Configuration from flags alone, before the targets file is applied.
    fn base_config(&self) -> ExporterConfig {
        ExporterConfig {
            listen_address: self.listen_address.clone(),
            metrics_path: self.metrics_path.clone(),
            client_timeout: Duration::from_secs(self.client_timeout),
            only_bucki_metrics: self.only_bucki_metrics,
            targets: Vec::new(),
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,bucki=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = cli
        .base_config()
        .load(&cli.config_path)
        .with_context(|| format!("loading config from {}", cli.config_path.display()))?;
    let addr = config.socket_addr()?;

    info!(
        version = bucki_api::VERSION,
        targets = config.targets.len(),
        timeout_secs = config.client_timeout.as_secs(),
        metrics_path = %config.metrics_path,
        "bucki exporter starting"
    );

    let state = ExporterState::with_poller(config).context("initializing HTTP client")?;
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("bucki exporter stopped");
    Ok(())
}
