// SPDX-License-Identifier: MIT OR Apache-2.0
//! testlens-trace
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The span hierarchy of a test run: one span per suite, one child span per
//! test invocation, and short-lived step spans (arrange, request, assert)
//! beneath each test. Suite spans are kept in a concurrent map keyed by suite
//! name so that suites running side by side never share a parent.
//!
//! Suite spans are trace roots. Test spans are `Send` and carry no thread
//! scope of their own; step spans are current on the calling thread for the
//! duration of their body.
//!
//! Every span is ended exactly once. Test and step spans end on drop, so an
//! early return, an error or a panic still ends the span.

/// Tracer provider construction and shutdown.
pub mod pipeline;
/// Suite and test spans.
pub mod spans;
/// Step spans beneath a test span.
pub mod step;

pub use pipeline::TracerPipeline;
pub use spans::{SpanManager, TestSpan, TestSpanInfo};
pub use step::{StepKind, StepSpan};

/// Span attribute keys.
pub mod attr {
    /// Suite name, on suite and test spans.
    pub const SUITE_NAME: &str = "suite.name";
    /// Set to `finished` when a suite span is closed.
    pub const SUITE_STATUS: &str = "suite.status";
    /// Test method name.
    pub const TEST_NAME: &str = "test.name";
    /// Declaring class of the test.
    pub const TEST_CLASS: &str = "test.class";
    /// Test description, empty when none was given.
    pub const TEST_DESCRIPTION: &str = "test.description";
    /// Resolved test run id of the enclosing suite.
    pub const TEST_RUN_ID: &str = "test.run_id";
    /// Status label of the finished test.
    pub const TEST_STATUS: &str = "test.status";
    /// Elapsed milliseconds reported by the framework.
    pub const TEST_DURATION_MS: &str = "test.duration_ms";
    /// Step kind on step spans.
    pub const TEST_STEP: &str = "test.step";
    /// Exception type on `exception` events.
    pub const EXCEPTION_TYPE: &str = "exception.type";
    /// Exception message on `exception` events.
    pub const EXCEPTION_MESSAGE: &str = "exception.message";
    /// Response status code on request steps.
    pub const HTTP_RESPONSE_STATUS_CODE: &str = "http.response.status_code";
    /// Response time on request steps.
    pub const HTTP_ELAPSED_MS: &str = "http.elapsed_ms";
}

/// Span event names.
pub mod event {
    /// A recorded failure.
    pub const EXCEPTION: &str = "exception";
    /// Emitted on every completed test span.
    pub const TEST_COMPLETED: &str = "Test execution completed";
    /// Emitted when a test span is ended without a completion.
    pub const INVOCATION_INTERRUPTED: &str = "invocation interrupted";
    /// Emitted by [`crate::StepSpan::record_response`].
    pub const RESPONSE_RECEIVED: &str = "response received";
}

/// Errors raised while building the tracer pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// The runtime driving the gRPC exporter could not be built.
    #[error("failed to build exporter runtime: {0}")]
    Runtime(std::io::Error),

    /// The OTLP exporter could not be built.
    #[error("failed to build span exporter: {reason}")]
    Exporter {
        /// Exporter build error detail.
        reason: String,
    },
}
