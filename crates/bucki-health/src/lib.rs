//! bucki-health: polling of microprofile health endpoints.
//!
//! Fetches each target's health report over HTTP(S), normalizes it into an
//! [`Observation`](bucki_core::Observation), and fans polls out across all
//! targets of a scrape cycle.
//!
//! # Architecture
//!
//! ```text
//! Aggregator::run_cycle(targets)
//!   ├── one task per target
//!   │   └── Poller::poll() → Observation
//!   │       ├── resolve (DNS timestamp) → connect (+TLS) → GET, following redirects
//!   │       └── report::parse() → overall status + checks
//!   └── barrier: exactly len(targets) completions, bounded by the cycle guard
//! ```
//!
//! Transport failures and timeouts are not errors to the caller; they come
//! back as unreachable observations. Bodies that are not a valid health
//! report degrade to `UNKNOWN` with no checks.

pub mod aggregator;
pub mod poller;
pub mod report;

pub use aggregator::{Aggregator, Probe, cycle_guard};
pub use poller::{MAX_BODY_BYTES, MAX_HOPS, PollError, Poller, USER_AGENT};
pub use report::HealthReport;
