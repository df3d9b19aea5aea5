// SPDX-License-Identifier: MIT OR Apache-2.0
//! Suite and test spans.

use crate::pipeline::TracerPipeline;
use crate::{attr, event};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::{Context, ContextGuard, KeyValue};
use opentelemetry_sdk::trace::SdkTracer;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use testlens_core::TestOutcome;
use tracing::{debug, warn};

/// Owns the suite-name to suite-span map and creates every span of a run.
///
/// All methods take `&self`; the map is guarded internally so callers on any
/// thread may open, look up and close suites concurrently.
pub struct SpanManager {
    pub(crate) tracer: SdkTracer,
    suites: Mutex<HashMap<String, Context>>,
}

impl SpanManager {
    /// Manager creating spans with `tracer`.
    pub fn new(tracer: SdkTracer) -> Self {
        Self {
            tracer,
            suites: Mutex::new(HashMap::new()),
        }
    }

    /// Manager using the pipeline's tracer.
    pub fn from_pipeline(pipeline: &TracerPipeline) -> Self {
        Self::new(pipeline.tracer())
    }

    fn suites(&self) -> MutexGuard<'_, HashMap<String, Context>> {
        self.suites.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the span for `suite` and register it.
    ///
    /// Suite spans are trace roots: whatever is current on the calling thread
    /// is ignored. Re-opening a suite that is still open ends the stale span
    /// first so it cannot leak.
    pub fn open_suite(&self, suite: &str) -> Context {
        let root = Context::new();
        let span = self
            .tracer
            .span_builder(format!("suite: {suite}"))
            .with_kind(SpanKind::Internal)
            .with_attributes([KeyValue::new(attr::SUITE_NAME, suite.to_string())])
            .start_with_context(&self.tracer, &root);
        let cx = root.with_span(span);

        let stale = self.suites().insert(suite.to_string(), cx.clone());
        if let Some(stale) = stale {
            warn!(suite = %suite, "suite opened twice, ending the earlier span");
            let span = stale.span();
            span.set_attribute(KeyValue::new(attr::SUITE_STATUS, "replaced"));
            span.end();
        }
        debug!(suite = %suite, "suite span opened");
        cx
    }

    /// End the span for `suite`. Returns `false` (and does nothing) when no
    /// span is open for it.
    pub fn close_suite(&self, suite: &str) -> bool {
        let Some(cx) = self.suites().remove(suite) else {
            debug!(suite = %suite, "no open span for suite");
            return false;
        };
        let span = cx.span();
        span.set_attribute(KeyValue::new(attr::SUITE_STATUS, "finished"));
        span.set_status(Status::Ok);
        span.end();
        debug!(suite = %suite, "suite span closed");
        true
    }

    /// Whether `suite` has an open span.
    pub fn is_open(&self, suite: &str) -> bool {
        self.suites().contains_key(suite)
    }

    /// Names of the suites with open spans, sorted.
    pub fn open_suites(&self) -> Vec<String> {
        let mut names: Vec<String> = self.suites().keys().cloned().collect();
        names.sort();
        names
    }

    /// Context carrying the open span of `suite`.
    pub fn suite_context(&self, suite: &str) -> Option<Context> {
        self.suites().get(suite).cloned()
    }

    /// Start a test span under the suite's span.
    ///
    /// When the suite has no open span the test span is parented to the
    /// thread's current context instead. The span is not made current; use
    /// [`TestSpan::attach`] for that.
    pub fn start_test(&self, info: &TestSpanInfo<'_>) -> TestSpan {
        let parent = self
            .suite_context(info.suite)
            .unwrap_or_else(Context::current);
        let name = format!("{}.{}", info.class, info.method);
        let span = self
            .tracer
            .span_builder(name.clone())
            .with_kind(SpanKind::Internal)
            .with_attributes([
                KeyValue::new(attr::TEST_NAME, info.method.to_string()),
                KeyValue::new(attr::TEST_CLASS, info.class.to_string()),
                KeyValue::new(attr::TEST_DESCRIPTION, info.description.to_string()),
                KeyValue::new(attr::TEST_RUN_ID, info.run_id.to_string()),
                KeyValue::new(attr::SUITE_NAME, info.suite.to_string()),
            ])
            .start_with_context(&self.tracer, &parent);
        TestSpan {
            cx: parent.with_span(span),
            name,
            finished: false,
        }
    }
}

impl Drop for SpanManager {
    fn drop(&mut self) {
        let leftover: Vec<(String, Context)> = self.suites().drain().collect();
        for (suite, cx) in leftover {
            warn!(suite = %suite, "suite span still open at teardown");
            let span = cx.span();
            span.set_attribute(KeyValue::new(attr::SUITE_STATUS, "abandoned"));
            span.end();
        }
    }
}

impl std::fmt::Debug for SpanManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanManager")
            .field("open_suites", &self.open_suites())
            .finish()
    }
}

/// What a test span is named and labelled with.
#[derive(Debug, Clone, Copy)]
pub struct TestSpanInfo<'a> {
    /// Suite the test belongs to.
    pub suite: &'a str,
    /// Declaring class.
    pub class: &'a str,
    /// Method name.
    pub method: &'a str,
    /// Description, empty when none.
    pub description: &'a str,
    /// Resolved run id of the suite.
    pub run_id: &'a str,
}

/// An open test span.
///
/// Finish it with [`TestSpan::finish`]. Dropping it unfinished ends the span
/// as interrupted. A `TestSpan` is `Send`: it may be started on one thread and
/// finished on another. Scopes are per thread, see [`TestSpan::attach`].
#[must_use = "an unfinished test span is recorded as interrupted"]
pub struct TestSpan {
    cx: Context,
    name: String,
    finished: bool,
}

impl TestSpan {
    /// `<class>.<method>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Context carrying this span, for parenting children.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// Make this span current on the calling thread until the guard drops.
    ///
    /// Spans started without an explicit parent while the guard is held
    /// become children of the test.
    pub fn attach(&self) -> ContextGuard {
        self.cx.clone().attach()
    }

    /// Record `outcome` and end the span.
    pub fn finish(mut self, outcome: &TestOutcome) {
        let span = self.cx.span();
        let label = outcome.label();
        span.set_attribute(KeyValue::new(attr::TEST_STATUS, label.as_str()));
        span.set_attribute(KeyValue::new(
            attr::TEST_DURATION_MS,
            i64::try_from(outcome.elapsed_millis()).unwrap_or(i64::MAX),
        ));
        match &outcome.failure {
            Some(failure) => {
                span.add_event(
                    event::EXCEPTION,
                    vec![
                        KeyValue::new(attr::EXCEPTION_TYPE, failure.kind.clone()),
                        KeyValue::new(attr::EXCEPTION_MESSAGE, failure.message.clone()),
                    ],
                );
                span.set_status(Status::error(failure.message.clone()));
            }
            None => span.set_status(Status::Ok),
        }
        span.add_event(
            event::TEST_COMPLETED,
            vec![KeyValue::new(attr::TEST_STATUS, label.as_str())],
        );
        span.end();
        self.finished = true;
    }
}

impl Drop for TestSpan {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(test = %self.name, "test span dropped without a result");
        let span = self.cx.span();
        span.set_attribute(KeyValue::new(attr::TEST_STATUS, "unknown"));
        span.add_event(event::INVOCATION_INTERRUPTED, Vec::new());
        span.set_status(Status::error(event::INVOCATION_INTERRUPTED));
        span.end();
    }
}

impl std::fmt::Debug for TestSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSpan")
            .field("name", &self.name)
            .field("finished", &self.finished)
            .finish()
    }
}
