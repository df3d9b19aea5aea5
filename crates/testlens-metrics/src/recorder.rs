// SPDX-License-Identifier: MIT OR Apache-2.0
//! The metrics recorder: owns the registry, the instruments, the exposition
//! endpoint, and the push-gateway client.

use crate::endpoint::ExpositionEndpoint;
use crate::push::{GroupingKey, MIN_PUSH_TIMEOUT, PushGateway};
use crate::summary::{ResultSample, collect_samples};
use crate::{DURATION_HISTOGRAM, LABEL_NAMES, MetricsError, RESULT_COUNTER, UNKNOWN_LABEL};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::time::Duration;
use testlens_config::MetricsConfig;
use testlens_core::StatusLabel;
use tracing::{debug, error, info, warn};

/// Histogram buckets in seconds, sized for API tests rather than RPCs.
const DURATION_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];

/// The label tuple identifying one result series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultLabels<'a> {
    /// Suite name.
    pub suite: &'a str,
    /// Application under test.
    pub aut: &'a str,
    /// Test run id.
    pub test_run_id: &'a str,
    /// Declaring class (or module) of the test.
    pub test_class: &'a str,
    /// Test method name.
    pub test_name: &'a str,
    /// Outcome label.
    pub status: StatusLabel,
}

impl<'a> ResultLabels<'a> {
    /// Label values in [`LABEL_NAMES`] order, with blanks replaced by
    /// [`UNKNOWN_LABEL`].
    fn values(&self) -> [&'a str; 6] {
        let or_unknown = |v: &'a str| if v.trim().is_empty() { UNKNOWN_LABEL } else { v };
        [
            or_unknown(self.suite),
            or_unknown(self.aut),
            or_unknown(self.test_run_id),
            or_unknown(self.test_class),
            or_unknown(self.test_name),
            self.status.as_str(),
        ]
    }
}

/// Records test results and exports them.
///
/// Constructed once per process and shared by reference (usually behind an
/// `Arc`); every method takes `&self` and is safe to call from many threads.
pub struct MetricsRecorder {
    registry: Registry,
    results: IntCounterVec,
    durations: HistogramVec,
    endpoint: ExpositionEndpoint,
    gateway: PushGateway,
    enabled: bool,
}

impl MetricsRecorder {
    /// Build a recorder with its own registry.
    pub fn new(config: &MetricsConfig) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let results = IntCounterVec::new(
            Opts::new(RESULT_COUNTER, "Total number of test results by status."),
            &LABEL_NAMES,
        )?;
        let durations = HistogramVec::new(
            HistogramOpts::new(DURATION_HISTOGRAM, "Test execution duration in seconds.")
                .buckets(DURATION_BUCKETS.to_vec()),
            &LABEL_NAMES,
        )?;
        registry.register(Box::new(results.clone()))?;
        registry.register(Box::new(durations.clone()))?;
        register_process_collector(&registry);

        let push_timeout = Duration::from_secs(config.push_timeout_secs);
        if push_timeout < MIN_PUSH_TIMEOUT {
            warn!(
                configured_secs = config.push_timeout_secs,
                "push timeout below minimum, using {}s",
                MIN_PUSH_TIMEOUT.as_secs()
            );
        }

        Ok(Self {
            registry,
            results,
            durations,
            endpoint: ExpositionEndpoint::new(config.bind.clone()),
            gateway: PushGateway::new(
                config.pushgateway_url(),
                config.job_name.clone(),
                push_timeout,
            ),
            enabled: config.enabled,
        })
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether recording is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // -- Endpoint ---------------------------------------------------------

    /// Start the exposition endpoint unless it is already running.
    ///
    /// Idempotent and thread-safe. A startup failure (port in use, bad
    /// address) is logged and swallowed; recording keeps working in-process.
    pub fn ensure_started(&self) {
        if !self.enabled {
            return;
        }
        match self.endpoint.ensure_started(&self.registry) {
            Ok(true) => {
                if let Some(addr) = self.endpoint.local_addr() {
                    info!(addr = %addr, "metrics endpoint started");
                }
            }
            Ok(false) => {}
            Err(e) => error!(error = %e, "failed to start metrics endpoint"),
        }
    }

    /// Fallible variant of [`Self::ensure_started`]. Returns `true` when this
    /// call bound the endpoint.
    pub fn try_ensure_started(&self) -> Result<bool, MetricsError> {
        self.endpoint.ensure_started(&self.registry)
    }

    /// Address the endpoint is serving on, if it is running.
    pub fn endpoint_addr(&self) -> Option<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Stop the exposition endpoint. It is not restarted by later
    /// [`Self::ensure_started`] calls.
    pub fn shutdown_endpoint(&self) {
        self.endpoint.shutdown();
    }

    // -- Recording --------------------------------------------------------

    /// Increment the outcome counter and observe the duration for `labels`.
    ///
    /// Never fails: a label error is logged and the observation dropped.
    pub fn record_result(&self, labels: &ResultLabels<'_>, duration_seconds: f64) {
        if !self.enabled {
            return;
        }
        let values = labels.values();
        debug!(
            suite = values[0],
            aut = values[1],
            test_run_id = values[2],
            test_class = values[3],
            test_name = values[4],
            status = values[5],
            duration_seconds,
            "recording test result"
        );
        match self.results.get_metric_with_label_values(&values) {
            Ok(counter) => counter.inc(),
            Err(e) => warn!(error = %e, "dropping result counter increment"),
        }
        let observed = if duration_seconds.is_finite() && duration_seconds >= 0.0 {
            duration_seconds
        } else {
            0.0
        };
        match self.durations.get_metric_with_label_values(&values) {
            Ok(histogram) => histogram.observe(observed),
            Err(e) => warn!(error = %e, "dropping duration observation"),
        }
    }

    // -- Export -----------------------------------------------------------

    /// Render the registry in Prometheus text format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        encode_registry(&self.registry)
    }

    /// Per-series samples of the result counter and duration histogram.
    pub fn samples(&self) -> Vec<ResultSample> {
        collect_samples(&self.registry.gather())
    }

    /// Push the whole registry to the gateway under `key`.
    ///
    /// Advisory: transport failures and rejections are logged, never returned.
    pub fn push_to_gateway(&self, key: &GroupingKey) {
        if !self.enabled {
            return;
        }
        match self.try_push_to_gateway(key) {
            Ok(()) => info!(
                test_run_id = %key.test_run_id,
                aut = %key.aut,
                suite = %key.suite,
                "metrics pushed to gateway"
            ),
            Err(e) => error!(error = %e, "failed to push metrics to gateway"),
        }
    }

    /// Fallible variant of [`Self::push_to_gateway`].
    pub fn try_push_to_gateway(&self, key: &GroupingKey) -> Result<(), MetricsError> {
        let body = self.encode_text()?;
        self.gateway.push(key, body)
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("enabled", &self.enabled)
            .field("endpoint", &self.endpoint.local_addr())
            .field("gateway", &self.gateway)
            .finish()
    }
}

/// Render `registry` in Prometheus text format.
pub(crate) fn encode_registry(registry: &Registry) -> Result<String, MetricsError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| MetricsError::Encode {
            reason: e.to_string(),
        })?;
    String::from_utf8(buffer).map_err(|e| MetricsError::Encode {
        reason: e.to_string(),
    })
}

#[cfg(target_os = "linux")]
fn register_process_collector(registry: &Registry) {
    let collector = prometheus::process_collector::ProcessCollector::for_self();
    if let Err(e) = registry.register(Box::new(collector)) {
        warn!(error = %e, "process metrics unavailable");
    }
}

#[cfg(not(target_os = "linux"))]
fn register_process_collector(_registry: &Registry) {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> MetricsRecorder {
        let config = MetricsConfig {
            bind: "127.0.0.1:0".into(),
            ..MetricsConfig::default()
        };
        MetricsRecorder::new(&config).unwrap()
    }

    fn labels(status: StatusLabel) -> ResultLabels<'static> {
        ResultLabels {
            suite: "Smoke",
            aut: "unknown",
            test_run_id: "unknown",
            test_class: "UsersTest",
            test_name: "verifyUser",
            status,
        }
    }

    #[test]
    fn zero_push_timeout_is_clamped() {
        let recorder = MetricsRecorder::new(&MetricsConfig {
            bind: "127.0.0.1:0".into(),
            push_timeout_secs: 0,
            ..MetricsConfig::default()
        })
        .unwrap();
        assert_eq!(recorder.gateway.timeout(), MIN_PUSH_TIMEOUT);
    }

    #[test]
    fn blank_label_values_become_unknown() {
        let l = ResultLabels {
            suite: "",
            aut: "  ",
            test_run_id: "run-1",
            test_class: "C",
            test_name: "t",
            status: StatusLabel::Pass,
        };
        assert_eq!(l.values(), ["unknown", "unknown", "run-1", "C", "t", "pass"]);
    }

    #[test]
    fn record_increments_counter_and_observes_duration() {
        let r = recorder();
        r.record_result(&labels(StatusLabel::Pass), 0.5);
        r.record_result(&labels(StatusLabel::Pass), 0.25);
        let samples = r.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].count, 2);
        assert!((samples[0].duration_sum - 0.75).abs() < 1e-9);
        assert_eq!(samples[0].status, "pass");
    }

    #[test]
    fn statuses_are_separate_series() {
        let r = recorder();
        r.record_result(&labels(StatusLabel::Pass), 0.1);
        r.record_result(&labels(StatusLabel::Fail), 0.1);
        r.record_result(&labels(StatusLabel::Skipped), 0.0);
        assert_eq!(r.samples().len(), 3);
    }

    #[test]
    fn negative_or_nan_duration_is_clamped() {
        let r = recorder();
        r.record_result(&labels(StatusLabel::Unknown), f64::NAN);
        r.record_result(&labels(StatusLabel::Unknown), -3.0);
        let s = &r.samples()[0];
        assert_eq!(s.count, 2);
        assert_eq!(s.duration_sum, 0.0);
    }

    #[test]
    fn disabled_recorder_records_nothing() {
        let config = MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        };
        let r = MetricsRecorder::new(&config).unwrap();
        r.record_result(&labels(StatusLabel::Pass), 1.0);
        r.ensure_started();
        assert!(r.samples().is_empty());
        assert!(r.endpoint_addr().is_none());
    }

    #[test]
    fn text_encoding_contains_metric_names() {
        let r = recorder();
        r.record_result(&labels(StatusLabel::Fail), 1.5);
        let text = r.encode_text().unwrap();
        assert!(text.contains("# TYPE test_result_total counter"));
        assert!(text.contains("# TYPE test_duration_seconds histogram"));
        assert!(text.contains("test_name=\"verifyUser\""));
    }

    #[test]
    fn recorders_do_not_share_registries() {
        let a = recorder();
        let b = recorder();
        a.record_result(&labels(StatusLabel::Pass), 0.1);
        assert_eq!(a.samples().len(), 1);
        assert!(b.samples().is_empty());
    }
}
