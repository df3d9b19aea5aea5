// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::spans::{SpanManager, TestSpan};
use crate::{attr, event};
use opentelemetry::trace::{SpanKind, SpanRef, Status, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use std::fmt;
use testlens_core::ResponseSummary;

/// The phases of an API test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// Build fixtures, stubs and the request.
    Arrange,
    /// Send the request and wait for the response.
    Request,
    /// Check the response.
    Assert,
}

impl StepKind {
    /// Span name suffix.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arrange => "arrange",
            Self::Request => "request",
            Self::Assert => "assert",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to the running step, passed to the step body.
pub struct StepSpan {
    cx: Context,
    kind: StepKind,
}

impl StepSpan {
    fn span(&self) -> SpanRef<'_> {
        self.cx.span()
    }

    /// Which step this is.
    pub fn kind(&self) -> StepKind {
        self.kind
    }

    /// Context carrying this span.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// Attach the response status code and elapsed time.
    pub fn record_response(&self, response: &ResponseSummary) {
        let elapsed_ms = i64::try_from(response.elapsed.as_millis()).unwrap_or(i64::MAX);
        let span = self.span();
        span.set_attribute(KeyValue::new(
            attr::HTTP_RESPONSE_STATUS_CODE,
            i64::from(response.status_code),
        ));
        span.set_attribute(KeyValue::new(attr::HTTP_ELAPSED_MS, elapsed_ms));
        span.add_event(
            event::RESPONSE_RECEIVED,
            vec![KeyValue::new(
                attr::HTTP_RESPONSE_STATUS_CODE,
                i64::from(response.status_code),
            )],
        );
    }

    /// Add a free-form event.
    pub fn event(&self, name: impl Into<String>) {
        self.span().add_event(name.into(), Vec::new());
    }

    /// Set an extra attribute.
    pub fn set_attribute(&self, attribute: KeyValue) {
        self.span().set_attribute(attribute);
    }
}

// Ends the step span on every exit path, panics included.
struct EndOnDrop<'a>(&'a Context);

impl Drop for EndOnDrop<'_> {
    fn drop(&mut self) {
        let span = self.0.span();
        if std::thread::panicking() {
            span.set_status(Status::error("step panicked"));
        }
        span.end();
    }
}

impl SpanManager {
    /// Run `body` inside a `kind` step span beneath `test`.
    ///
    /// An `Err` is recorded on the step span as an `exception` event with an
    /// error status and returned unchanged; the test span's own status is left
    /// to the test's outcome.
    pub fn step<T, E, F>(&self, test: &TestSpan, kind: StepKind, body: F) -> Result<T, E>
    where
        E: fmt::Display,
        F: FnOnce(&StepSpan) -> Result<T, E>,
    {
        let span = self
            .tracer
            .span_builder(format!("{}/{}", test.name(), kind))
            .with_kind(SpanKind::Internal)
            .with_attributes([KeyValue::new(attr::TEST_STEP, kind.as_str())])
            .start_with_context(&self.tracer, test.context());
        let step = StepSpan {
            cx: test.context().with_span(span),
            kind,
        };
        let _scope = step.cx.clone().attach();
        let _end = EndOnDrop(&step.cx);

        let result = body(&step);
        match &result {
            Ok(_) => step.span().set_status(Status::Ok),
            Err(e) => {
                let message = e.to_string();
                step.span().add_event(
                    event::EXCEPTION,
                    vec![
                        KeyValue::new(attr::EXCEPTION_TYPE, std::any::type_name::<E>()),
                        KeyValue::new(attr::EXCEPTION_MESSAGE, message.clone()),
                    ],
                );
                step.span().set_status(Status::error(message));
            }
        }
        result
    }
}
