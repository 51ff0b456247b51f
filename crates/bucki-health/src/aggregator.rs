//! Per-cycle fan-out of polls with a fan-in barrier.
//!
//! One task is spawned per target. The cycle returns once exactly
//! `targets.len()` tasks have completed, or once the cycle guard expires,
//! whichever comes first. Targets without a result are reported unreachable.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, warn};

use bucki_core::{Observation, Target};

use crate::poller::Poller;

/// Multiple of the client timeout a whole cycle may take.
const GUARD_FACTOR: u32 = 3;

/// Slack added on top of the guard multiple.
const GUARD_SLACK: Duration = Duration::from_secs(1);

/// Upper bound on the wall time of one cycle for a given client timeout.
pub fn cycle_guard(timeout: Duration) -> Duration {
    timeout * GUARD_FACTOR + GUARD_SLACK
}

/// Something that can poll a single target.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, target: &Target, timeout: Duration) -> impl Future<Output = Observation> + Send;
}

impl Probe for Poller {
    fn probe(&self, target: &Target, timeout: Duration) -> impl Future<Output = Observation> + Send {
        self.poll(target, timeout)
    }
}

/// Runs one poll per target and gathers every result.
pub struct Aggregator<P = Poller> {
    probe: Arc<P>,
}

impl<P> Clone for Aggregator<P> {
    fn clone(&self) -> Self {
        Self {
            probe: Arc::clone(&self.probe),
        }
    }
}

impl<P: Probe> Aggregator<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe: Arc::new(probe),
        }
    }

    /// Poll every target concurrently and return one observation per name.
    ///
    /// Target names must be unique; configuration validation enforces it.
    pub async fn run_cycle(
        &self,
        targets: &[Target],
        timeout: Duration,
    ) -> HashMap<String, Observation> {
        let started = Instant::now();
        let mut tasks = JoinSet::new();

        for (index, target) in targets.iter().enumerate() {
            let probe = Arc::clone(&self.probe);
            let target = target.clone();
            tasks.spawn(async move { (index, probe.probe(&target, timeout).await) });
        }

        let mut results: Vec<Option<Observation>> = vec![None; targets.len()];
        let mut completed = 0;
        let deadline = tokio::time::Instant::now() + cycle_guard(timeout);

        while completed < targets.len() {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((index, observation)))) => {
                    results[index] = Some(observation);
                    completed += 1;
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "poll task failed");
                    completed += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = targets.len() - completed,
                        guard_ms = cycle_guard(timeout).as_millis() as u64,
                        "cycle guard expired, aborting outstanding polls"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let observations: HashMap<String, Observation> = targets
            .iter()
            .zip(results)
            .map(|(target, observation)| {
                let observation =
                    observation.unwrap_or_else(|| Observation::unreachable(target, elapsed_ms));
                (target.name.clone(), observation)
            })
            .collect();

        debug!(
            targets = targets.len(),
            reachable = observations.values().filter(|o| o.reachable).count(),
            elapsed_ms,
            "poll cycle finished"
        );
        observations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use bucki_core::HealthStatus;
    use std::net::SocketAddr;

    async fn serve() -> SocketAddr {
        let router = Router::new()
            .route("/health", get(|| async { r#"{"status":"UP","checks":[]}"# }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    r#"{"status":"UP","checks":[]}"#
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    /// Never completes; only the cycle guard can end it.
    struct Hang;

    impl Probe for Hang {
        fn probe(&self, _target: &Target, _timeout: Duration) -> impl Future<Output = Observation> + Send {
            std::future::pending()
        }
    }

    /// Panics for one specific target, answers UP for the rest.
    struct Flaky;

    impl Probe for Flaky {
        fn probe(&self, target: &Target, _timeout: Duration) -> impl Future<Output = Observation> + Send {
            let target = target.clone();
            async move {
                if target.name == "boom" {
                    panic!("probe exploded");
                }
                Observation::reachable(&target, 200, 1.0).with_status(HealthStatus::Up)
            }
        }
    }

    #[test]
    fn guard_is_a_small_multiple_of_timeout() {
        assert_eq!(cycle_guard(Duration::from_secs(5)), Duration::from_secs(16));
    }

    #[tokio::test]
    async fn empty_target_list_returns_immediately() {
        let aggregator = Aggregator::new(Hang);
        let results = aggregator.run_cycle(&[], Duration::from_secs(5)).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn one_slow_target_does_not_hold_back_others() {
        let addr = serve().await;
        let closed = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let targets = vec![
            Target::new("fast", format!("http://{addr}/health")),
            Target::new("slow", format!("http://{addr}/slow")),
            Target::new("closed", format!("http://{closed}/health")),
        ];
        let timeout = Duration::from_millis(300);

        let started = Instant::now();
        let results = Aggregator::new(Poller::new().unwrap())
            .run_cycle(&targets, timeout)
            .await;
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 3);
        assert!(results["fast"].reachable);
        assert!(!results["slow"].reachable);
        assert!(!results["closed"].reachable);
        // Roughly one timeout, not one per target.
        assert!(elapsed < timeout * 2 + Duration::from_millis(500), "cycle took {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn guard_marks_hung_targets_unreachable() {
        let targets = vec![Target::new("a", "http://a/health"), Target::new("b", "http://b/health")];

        let results = Aggregator::new(Hang)
            .run_cycle(&targets, Duration::from_millis(100))
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.values().all(|o| !o.reachable));
    }

    #[tokio::test]
    async fn panicking_probe_counts_as_completion() {
        let targets = vec![
            Target::new("ok", "http://ok/health"),
            Target::new("boom", "http://boom/health"),
        ];

        let results = Aggregator::new(Flaky)
            .run_cycle(&targets, Duration::from_secs(1))
            .await;

        assert_eq!(results.len(), 2);
        assert!(results["ok"].reachable);
        assert!(!results["boom"].reachable);
    }
}
