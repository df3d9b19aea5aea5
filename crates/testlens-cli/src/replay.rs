// SPDX-License-Identifier: MIT OR Apache-2.0
//! Replaying a recorded JSON-lines event stream through the correlator.
//!
//! Each non-blank line is one event:
//!
//! ```text
//! {"event":"suite_start","suite":"Smoke","attributes":{"aut":"petstore"}}
//! {"event":"test_start","id":"1","suite":"Smoke","class":"UsersTest","method":"verifyUser"}
//! {"event":"test_finish","id":"1","status":"success","start_ms":1000,"end_ms":1500}
//! {"event":"suite_finish","suite":"Smoke"}
//! ```
//!
//! Lines starting with `#` are comments.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use testlens_core::{TestFailure, TestOutcome, TestStatus};
use testlens_listener::{
    InvocationContext, InvocationListener, LifecycleCorrelator, SuiteInfo, SuiteListener,
    TestMethod,
};
use testlens_metrics::RunSummary;
use tracing::warn;

/// One recorded framework callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplayEvent {
    /// A suite started.
    SuiteStart {
        /// Suite name.
        suite: String,
        /// Suite attributes.
        #[serde(default)]
        attributes: BTreeMap<String, String>,
        /// Suite parameters.
        #[serde(default)]
        parameters: BTreeMap<String, String>,
    },
    /// An invocation started.
    TestStart {
        /// Invocation id, matched by the finish event.
        id: String,
        /// Suite name.
        suite: String,
        /// Declaring class.
        class: String,
        /// Method name.
        method: String,
        /// Description.
        #[serde(default)]
        description: String,
        /// `false` for configuration methods.
        #[serde(default = "default_true")]
        test: bool,
    },
    /// An invocation finished.
    TestFinish {
        /// Invocation id.
        id: String,
        /// Framework status; unrecognised values count as unknown.
        status: String,
        /// Start, epoch milliseconds.
        start_ms: u64,
        /// End, epoch milliseconds.
        end_ms: u64,
        /// Failure cause.
        #[serde(default)]
        failure: Option<TestFailure>,
    },
    /// A suite finished.
    SuiteFinish {
        /// Suite name.
        suite: String,
    },
}

fn default_true() -> bool {
    true
}

/// Errors reading an event stream.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// The stream could not be read.
    #[error("failed to read events: {0}")]
    Io(#[from] std::io::Error),

    /// A line is not a valid event.
    #[error("line {line}: {reason}")]
    Parse {
        /// One-based line number.
        line: usize,
        /// Parser error detail.
        reason: String,
    },
}

/// Parse a JSON-lines event stream.
pub fn parse_events(reader: impl BufRead) -> Result<Vec<ReplayEvent>, ReplayError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(trimmed).map_err(|e| ReplayError::Parse {
            line: index + 1,
            reason: e.to_string(),
        })?;
        events.push(event);
    }
    Ok(events)
}

/// What a replay did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplayReport {
    /// Suites started.
    pub suites: usize,
    /// Invocations that reached `test_finish`.
    pub completed: usize,
    /// Invocations that never finished and were ended as interrupted.
    pub interrupted: usize,
    /// `test_finish` events without a matching `test_start`.
    pub unmatched: usize,
    /// Suites still running at the end of the stream, finished by the replay.
    pub unfinished_suites: Vec<String>,
    /// Totals from the metrics recorder.
    pub summary: RunSummary,
}

/// Drive `correlator` with `events` in order.
pub fn replay(
    correlator: &LifecycleCorrelator,
    events: impl IntoIterator<Item = ReplayEvent>,
) -> ReplayReport {
    let mut report = ReplayReport::default();
    let mut suites: BTreeMap<String, SuiteInfo> = BTreeMap::new();
    let mut open: HashMap<String, (TestMethod, Option<InvocationContext>)> = HashMap::new();

    for event in events {
        match event {
            ReplayEvent::SuiteStart {
                suite,
                attributes,
                parameters,
            } => {
                let info = SuiteInfo {
                    name: suite.clone(),
                    attributes,
                    parameters,
                };
                correlator.on_start(&info);
                suites.insert(suite, info);
                report.suites += 1;
            }
            ReplayEvent::TestStart {
                id,
                suite,
                class,
                method,
                description,
                test,
            } => {
                let mut handle = TestMethod::new(suite, class, method).with_description(description);
                if !test {
                    handle = handle.configuration();
                }
                let context = correlator.before_invocation(&handle);
                if let Some((stale, _)) = open.insert(id.clone(), (handle, context)) {
                    warn!(id = %id, method = %stale.method, "invocation id reused before it finished");
                    report.interrupted += 1;
                }
            }
            ReplayEvent::TestFinish {
                id,
                status,
                start_ms,
                end_ms,
                failure,
            } => {
                let Some((handle, context)) = open.remove(&id) else {
                    warn!(id = %id, "finish without a matching start");
                    report.unmatched += 1;
                    continue;
                };
                let status = status.parse().unwrap_or(TestStatus::Unknown);
                let mut outcome = TestOutcome::new(status, start_ms, end_ms);
                if let Some(failure) = failure {
                    outcome = outcome.with_failure(failure);
                }
                correlator.after_invocation(&handle, context, &outcome);
                report.completed += 1;
            }
            ReplayEvent::SuiteFinish { suite } => {
                let info = suites.remove(&suite).unwrap_or_else(|| SuiteInfo::new(suite));
                correlator.on_finish(&info);
            }
        }
    }

    for (id, (handle, _context)) in open.drain() {
        warn!(id = %id, suite = %handle.suite, method = %handle.method, "invocation never finished");
        report.interrupted += 1;
    }
    for (name, info) in suites {
        warn!(suite = %name, "suite never finished");
        correlator.on_finish(&info);
        report.unfinished_suites.push(name);
    }

    report.summary = RunSummary::from_samples(&correlator.metrics().samples());
    report
}
