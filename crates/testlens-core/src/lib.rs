// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared types for testlens: test statuses, the closed status-label mapping,
//! invocation outcomes, and HTTP response summaries.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// TestStatus
// ---------------------------------------------------------------------------

/// Status of a test invocation as reported by the test framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// The test passed.
    Success,
    /// The test failed.
    Failure,
    /// The test was skipped.
    Skip,
    /// The test started but has not reported a result.
    Started,
    /// The framework interrupted the test before it completed.
    Interrupted,
    /// Any framework-internal state testlens does not model.
    Unknown,
}

impl TestStatus {
    /// Every variant, in declaration order.
    pub const ALL: [TestStatus; 6] = [
        Self::Success,
        Self::Failure,
        Self::Skip,
        Self::Started,
        Self::Interrupted,
        Self::Unknown,
    ];

    /// The metrics/span label for this status.
    pub const fn label(self) -> StatusLabel {
        match self {
            Self::Success => StatusLabel::Pass,
            Self::Failure => StatusLabel::Fail,
            Self::Skip => StatusLabel::Skipped,
            Self::Started | Self::Interrupted | Self::Unknown => StatusLabel::Unknown,
        }
    }
}

impl FromStr for TestStatus {
    type Err = std::convert::Infallible;

    /// Lenient parse: accepts common spellings case-insensitively and maps
    /// anything unrecognised to [`TestStatus::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_lowercase().as_str() {
            "success" | "pass" | "passed" | "ok" => Self::Success,
            "failure" | "fail" | "failed" | "error" => Self::Failure,
            "skip" | "skipped" | "ignored" => Self::Skip,
            "started" | "running" => Self::Started,
            "interrupted" | "aborted" | "cancelled" => Self::Interrupted,
            _ => Self::Unknown,
        };
        Ok(status)
    }
}

// ---------------------------------------------------------------------------
// StatusLabel
// ---------------------------------------------------------------------------

/// Closed set of status label values attached to spans and metric series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    /// `"pass"`
    Pass,
    /// `"fail"`
    Fail,
    /// `"skipped"`
    Skipped,
    /// `"unknown"`
    Unknown,
}

impl StatusLabel {
    /// Stable label value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        }
    }
}

impl From<TestStatus> for StatusLabel {
    fn from(status: TestStatus) -> Self {
        status.label()
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The cause of a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TestFailure {
    /// Error type, e.g. `AssertionError` or `reqwest::Error`.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl TestFailure {
    /// Create a failure cause.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Capture any error value, using its type name as the kind.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        Self::new(std::any::type_name::<E>(), err.to_string())
    }
}

/// Everything the framework reports once an invocation completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Final status.
    pub status: TestStatus,
    /// Failure cause, if one was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<TestFailure>,
    /// Start timestamp in epoch milliseconds.
    pub start_millis: u64,
    /// End timestamp in epoch milliseconds.
    pub end_millis: u64,
}

impl TestOutcome {
    /// Outcome without a failure cause.
    pub fn new(status: TestStatus, start_millis: u64, end_millis: u64) -> Self {
        Self {
            status,
            failure: None,
            start_millis,
            end_millis,
        }
    }

    /// Attach a failure cause.
    pub fn with_failure(mut self, failure: TestFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Elapsed milliseconds; zero when the clock went backwards.
    pub fn elapsed_millis(&self) -> u64 {
        self.end_millis.saturating_sub(self.start_millis)
    }

    /// Elapsed seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.elapsed_millis() as f64 / 1000.0
    }

    /// Label for [`Self::status`].
    pub fn label(&self) -> StatusLabel {
        self.status.label()
    }
}

// ---------------------------------------------------------------------------
// ResponseSummary
// ---------------------------------------------------------------------------

/// What a request step reports about the response it received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSummary {
    /// HTTP status code.
    pub status_code: u16,
    /// Time from request start to response.
    pub elapsed: Duration,
}

impl ResponseSummary {
    /// Create a summary.
    pub fn new(status_code: u16, elapsed: Duration) -> Self {
        Self {
            status_code,
            elapsed,
        }
    }

    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
