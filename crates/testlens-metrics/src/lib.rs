// SPDX-License-Identifier: MIT OR Apache-2.0
//! testlens-metrics
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Per-test outcome metrics: a counter of results and a histogram of
//! durations, both labelled `(suite, aut, test_run_id, test_class, test_name,
//! status)`, a lazily started pull-model exposition endpoint, and a one-shot
//! push of the whole registry to a push gateway.
//!
//! Everything reachable from [`MetricsRecorder`]'s non-`try_` methods is
//! best-effort: failures are logged and swallowed so instrumentation can never
//! fail a test run.

/// Pull-model exposition endpoint.
pub mod endpoint;
/// Push-gateway export.
pub mod push;
/// Counter and histogram bookkeeping.
pub mod recorder;
/// Aggregated views over recorded series.
pub mod summary;

pub use endpoint::ExpositionEndpoint;
pub use push::{GroupingKey, MIN_PUSH_TIMEOUT, PushGateway};
pub use recorder::{MetricsRecorder, ResultLabels};
pub use summary::{ResultSample, RunSummary};

use std::net::SocketAddr;

/// Metric name of the outcome counter.
pub const RESULT_COUNTER: &str = "test_result_total";

/// Metric name of the duration histogram.
pub const DURATION_HISTOGRAM: &str = "test_duration_seconds";

/// Label names, in series order.
pub const LABEL_NAMES: [&str; 6] = [
    "suite",
    "aut",
    "test_run_id",
    "test_class",
    "test_name",
    "status",
];

/// Label value substituted for blank inputs.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Errors raised by the fallible (`try_*`) metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// A collector could not be created or registered.
    #[error("metrics registry error: {0}")]
    Registry(#[from] prometheus::Error),

    /// The registry could not be rendered in text format.
    #[error("failed to encode metrics: {reason}")]
    Encode {
        /// Encoder error detail.
        reason: String,
    },

    /// The configured bind address does not parse.
    #[error("invalid metrics bind address '{addr}'")]
    InvalidBind {
        /// Configured value.
        addr: String,
    },

    /// Binding the exposition endpoint failed (e.g. port in use).
    #[error("failed to bind metrics endpoint on {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Spawning the endpoint's server thread failed.
    #[error("failed to spawn metrics server thread: {0}")]
    Spawn(std::io::Error),

    /// The push gateway URL could not be built.
    #[error("invalid push gateway url '{url}'")]
    InvalidGatewayUrl {
        /// Offending base URL.
        url: String,
    },

    /// The push request failed in transport.
    #[error("push to {url} failed: {reason}")]
    Push {
        /// Target URL.
        url: String,
        /// Transport error detail.
        reason: String,
    },

    /// The push gateway answered with a non-success status.
    #[error("push gateway at {url} rejected the push with status {status}")]
    PushRejected {
        /// Target URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
}
