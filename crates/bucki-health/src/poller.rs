//! Single-target poll: one GET against a health endpoint.
//!
//! The exchange is driven directly on a hyper HTTP/1 connection so the
//! resolve and connect phases can be timestamped. Duration runs from the
//! start of the last DNS resolution (when one happens) or else from
//! connection establishment, to the last byte of the body.
//!
//! Redirects are followed for up to [`MAX_HOPS`] requests. Userinfo in a
//! target address is sent as HTTP Basic credentials.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{AUTHORIZATION, HOST, LOCATION, USER_AGENT as USER_AGENT_HEADER};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Empty, Limited};
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};
use url::Url;

use bucki_core::{Observation, Target};

use crate::report::HealthReport;

/// User-Agent sent with every poll.
pub const USER_AGENT: &str = "bucki-exporter";

/// Requests made per poll, the first one included, before a redirect chain
/// is abandoned.
pub const MAX_HOPS: usize = 10;

/// Largest health report body read from a target.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Reasons a poll can fail at the transport level.
///
/// These never leave the poller: they are logged and turned into an
/// unreachable observation, except for [`PollError::Body`], which leaves the
/// target reachable without a report.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("invalid target address: {0}")]
    InvalidAddress(String),

    #[error("invalid redirect location: {0}")]
    InvalidRedirect(String),

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("dns resolution failed: {0}")]
    Resolve(#[source] std::io::Error),

    #[error("no addresses resolved for {0}")]
    NoAddress(String),

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("invalid tls server name: {0}")]
    ServerName(String),

    #[error("tls handshake failed: {0}")]
    Tls(#[source] std::io::Error),

    #[error("tls configuration error: {0}")]
    TlsConfig(#[from] rustls::Error),

    #[error("http handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("failed to build request: {0}")]
    Build(#[from] http::Error),

    #[error("request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("failed to read body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Timestamps collected while an exchange runs.
#[derive(Debug, Clone, Copy)]
struct Timings {
    dns_start: Option<Instant>,
    connected: Instant,
    done: Instant,
}

impl Timings {
    fn duration_millis(&self) -> f64 {
        let start = self.dns_start.unwrap_or(self.connected);
        millis(self.done.saturating_duration_since(start))
    }
}

/// A completed HTTP exchange.
#[derive(Debug)]
struct Exchange {
    status: u16,
    /// Set when the response is a redirect this poller follows.
    location: Option<String>,
    body: Result<Bytes, PollError>,
    timings: Timings,
}

/// Where and how to connect for a target address.
#[derive(Debug, PartialEq)]
struct Endpoint {
    tls: bool,
    host: String,
    port: u16,
    authority: String,
    path: String,
    /// `Authorization` header value built from the URL userinfo.
    credentials: Option<String>,
}

impl Endpoint {
    fn from_url(url: &Url) -> Result<Self, PollError> {
        let invalid = || PollError::InvalidAddress(url.to_string());
        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            _ => return Err(invalid()),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(invalid)?;
        let port = url.port_or_known_default().ok_or_else(invalid)?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        Ok(Self {
            tls,
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
            authority,
            path,
            credentials: basic_credentials(url),
        })
    }

    fn same_origin(&self, other: &Endpoint) -> bool {
        self.tls == other.tls && self.host == other.host && self.port == other.port
    }
}

/// Basic credentials for the userinfo of `url`, if it carries any.
fn basic_credentials(url: &Url) -> Option<String> {
    if url.username().is_empty() && url.password().is_none() {
        return None;
    }
    let decode = |raw: &str| percent_decode_str(raw).decode_utf8_lossy().into_owned();
    let user = decode(url.username());
    let password = url.password().map(decode).unwrap_or_default();
    Some(format!("Basic {}", STANDARD.encode(format!("{user}:{password}"))))
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Polls health endpoints. Cheap to share behind an `Arc`.
#[derive(Clone)]
pub struct Poller {
    tls: TlsConnector,
}

impl Poller {
    /// Create a poller that verifies TLS peers against the Mozilla root store.
    pub fn new() -> Result<Self, PollError> {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self::with_tls_config(Arc::new(config)))
    }

    /// Create a poller from a pre-built `rustls` client configuration.
    pub fn with_tls_config(config: Arc<ClientConfig>) -> Self {
        Self {
            tls: TlsConnector::from(config),
        }
    }

    /// Poll `target` once, bounding the whole exchange by `timeout`.
    ///
    /// Never fails: transport errors and timeouts yield an unreachable
    /// observation, unreadable or unparsable bodies a reachable one with
    /// `UNKNOWN` status.
    pub async fn poll(&self, target: &Target, timeout: Duration) -> Observation {
        let started = Instant::now();

        let exchange = match tokio::time::timeout(timeout, self.fetch(target)).await {
            Ok(Ok(exchange)) => exchange,
            Ok(Err(e)) => {
                warn!(name = %target.name, url = %target.address, error = %e, "target unreachable");
                return Observation::unreachable(target, millis(started.elapsed()));
            }
            Err(_) => {
                warn!(
                    name = %target.name,
                    url = %target.address,
                    timeout_ms = timeout.as_millis() as u64,
                    "poll timed out"
                );
                return Observation::unreachable(target, millis(started.elapsed()));
            }
        };

        let duration_millis = exchange.timings.duration_millis();
        let observation = Observation::reachable(target, exchange.status, duration_millis);

        let body = match exchange.body {
            Ok(body) => body,
            Err(e) => {
                warn!(name = %target.name, url = %target.address, error = %e, "unreadable health report");
                return observation;
            }
        };
        debug!(
            name = %target.name,
            status = exchange.status,
            duration_ms = duration_millis,
            bytes = body.len(),
            "poll completed"
        );

        match HealthReport::parse(&body) {
            Ok(report) => report.apply(observation),
            Err(e) => {
                warn!(name = %target.name, url = %target.address, error = %e, "unparsable health report");
                observation
            }
        }
    }

    /// Run the exchange for `target`, following redirects.
    async fn fetch(&self, target: &Target) -> Result<Exchange, PollError> {
        let mut url = Url::parse(&target.address)
            .map_err(|_| PollError::InvalidAddress(target.address.clone()))?;
        let mut previous: Option<Endpoint> = None;
        let mut dns_start = None;

        for _ in 0..MAX_HOPS {
            let mut endpoint = Endpoint::from_url(&url)?;
            // Credentials carry over to redirects within the same origin only.
            if let Some(prev) = &previous
                && endpoint.credentials.is_none()
                && prev.same_origin(&endpoint)
            {
                endpoint.credentials = prev.credentials.clone();
            }

            let exchange = self.exchange(&endpoint, &mut dns_start).await?;
            let Some(location) = exchange.location.clone() else {
                return Ok(exchange);
            };
            url = url
                .join(&location)
                .map_err(|_| PollError::InvalidRedirect(location.clone()))?;
            debug!(name = %target.name, status = exchange.status, location = %url, "following redirect");
            previous = Some(endpoint);
        }
        Err(PollError::TooManyRedirects(MAX_HOPS))
    }

    /// One request against one endpoint on a fresh connection.
    async fn exchange(
        &self,
        endpoint: &Endpoint,
        dns_start: &mut Option<Instant>,
    ) -> Result<Exchange, PollError> {
        let addrs: Vec<SocketAddr> = match endpoint.host.parse::<IpAddr>() {
            Ok(ip) => vec![SocketAddr::new(ip, endpoint.port)],
            Err(_) => {
                *dns_start = Some(Instant::now());
                tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
                    .await
                    .map_err(PollError::Resolve)?
                    .collect()
            }
        };
        if addrs.is_empty() {
            return Err(PollError::NoAddress(endpoint.host.clone()));
        }

        let stream = TcpStream::connect(addrs.as_slice())
            .await
            .map_err(PollError::Connect)?;

        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(endpoint.path.as_str())
            .header(HOST, endpoint.authority.as_str())
            .header(USER_AGENT_HEADER, USER_AGENT);
        if let Some(credentials) = &endpoint.credentials {
            builder = builder.header(AUTHORIZATION, credentials.as_str());
        }
        let req = builder.body(Empty::<Bytes>::new())?;

        if endpoint.tls {
            let server_name = ServerName::try_from(endpoint.host.as_str())
                .map_err(|_| PollError::ServerName(endpoint.host.clone()))?
                .to_owned();
            let stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(PollError::Tls)?;
            send(stream, req, *dns_start, Instant::now()).await
        } else {
            send(stream, req, *dns_start, Instant::now()).await
        }
    }
}

async fn send<S>(
    stream: S,
    req: Request<Empty<Bytes>>,
    dns_start: Option<Instant>,
    connected: Instant,
) -> Result<Exchange, PollError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(PollError::Handshake)?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "health connection closed with error");
        }
    });

    let resp = sender.send_request(req).await.map_err(PollError::Request)?;
    let status = resp.status();
    let location = if is_followed_redirect(status) {
        resp.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    } else {
        None
    };

    let body = if location.is_some() {
        Ok(Bytes::new())
    } else {
        Limited::new(resp.into_body(), MAX_BODY_BYTES)
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .map_err(PollError::Body)
    };

    Ok(Exchange {
        status: status.as_u16(),
        location,
        body,
        timings: Timings {
            dns_start,
            connected,
            done: Instant::now(),
        },
    })
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
