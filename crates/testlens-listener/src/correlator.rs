// SPDX-License-Identifier: MIT OR Apache-2.0
//! The lifecycle correlator.

use crate::handles::{MethodHandle, SuiteHandle, SuiteLookupAdapter};
use crate::{InvocationListener, ListenerError, SuiteListener};
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use testlens_config::{EnvSource, ProcessEnv, Properties, TelemetryConfig};
use testlens_core::TestOutcome;
use testlens_ident::{FallbackPolicy, Identifier, IdentifierSources, Origin, UNKNOWN};
use testlens_metrics::{GroupingKey, MetricsRecorder, ResultLabels};
use testlens_trace::{SpanManager, StepKind, StepSpan, TestSpan, TestSpanInfo, TracerPipeline};
use tracing::{debug, error, info, warn};

/// Identifiers resolved once at suite start and reused for every test in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteContext {
    /// Suite name.
    pub name: String,
    /// Application under test.
    pub aut: String,
    /// Run id used for spans and metric labels (`unknown` when unresolved).
    pub test_run_id: String,
    /// Run id used in the push-gateway grouping key (`local-run-<millis>`
    /// when unresolved).
    pub push_run_id: String,
}

impl SuiteContext {
    fn unresolved(name: &str) -> Self {
        Self {
            name: name.to_string(),
            aut: UNKNOWN.to_string(),
            test_run_id: UNKNOWN.to_string(),
            push_run_id: UNKNOWN.to_string(),
        }
    }
}

/// Carried from `before_invocation` to the matching `after_invocation`.
///
/// Holds the open test span; dropping the context without completing it ends
/// the span as interrupted.
#[derive(Debug)]
pub struct InvocationContext {
    span: TestSpan,
    suite: SuiteContext,
}

impl InvocationContext {
    /// The open test span.
    pub fn span(&self) -> &TestSpan {
        &self.span
    }

    /// Identifiers of the enclosing suite.
    pub fn suite(&self) -> &SuiteContext {
        &self.suite
    }
}

/// Drives spans and metrics from framework callbacks.
///
/// Telemetry is advisory: no error and no panic raised by the span manager,
/// the recorder or the pipeline escapes a callback. Each failure is logged.
///
/// Spans are flushed at every suite finish; the tracer provider and the
/// exposition endpoint are shut down once, by [`LifecycleCorrelator::shutdown`]
/// or when the correlator is dropped.
pub struct LifecycleCorrelator {
    spans: SpanManager,
    pipeline: Arc<TracerPipeline>,
    metrics: Arc<MetricsRecorder>,
    env: Box<dyn EnvSource>,
    properties: Properties,
    suites: Mutex<HashMap<String, SuiteContext>>,
}

impl LifecycleCorrelator {
    /// Correlator over an existing pipeline and recorder, reading the process
    /// environment and no properties.
    pub fn new(pipeline: Arc<TracerPipeline>, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            spans: SpanManager::from_pipeline(&pipeline),
            pipeline,
            metrics,
            env: Box::new(ProcessEnv),
            properties: Properties::new(),
            suites: Mutex::new(HashMap::new()),
        }
    }

    /// Build the pipeline and recorder from `config`. `properties` are merged
    /// over `config.properties`.
    pub fn install(config: &TelemetryConfig, properties: Properties) -> Result<Self, ListenerError> {
        let properties = config.properties.clone().merged(properties);
        let pipeline = Arc::new(TracerPipeline::install(&config.tracing, &properties)?);
        let metrics = Arc::new(MetricsRecorder::new(&config.metrics)?);
        Ok(Self::new(pipeline, metrics).with_properties(properties))
    }

    /// Replace the environment source.
    pub fn with_env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    /// Replace the process properties.
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// The span manager, for callers creating their own spans.
    pub fn spans(&self) -> &SpanManager {
        &self.spans
    }

    /// The metrics recorder.
    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// The tracer pipeline.
    pub fn pipeline(&self) -> &TracerPipeline {
        &self.pipeline
    }

    /// Resolved identifiers of a running suite.
    pub fn suite_context(&self, suite: &str) -> Option<SuiteContext> {
        self.suites().get(suite).cloned()
    }

    /// Names of running suites, sorted.
    pub fn running_suites(&self) -> Vec<String> {
        let mut names: Vec<String> = self.suites().keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a step of the invocation in its own child span. See
    /// [`SpanManager::step`].
    pub fn step<T, E, F>(&self, invocation: &InvocationContext, kind: StepKind, body: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnOnce(&StepSpan) -> Result<T, E>,
    {
        self.spans.step(&invocation.span, kind, body)
    }

    /// End the run: close the spans of suites that never finished, then shut
    /// down the tracer provider and the exposition endpoint.
    ///
    /// Returns `true` for the call that shut the provider down. Later calls
    /// and suite callbacks after it still run, but their spans are dropped.
    pub fn shutdown(&self) -> bool {
        self.guarded("shutdown", || {
            let leftover: Vec<String> = self.suites().drain().map(|(name, _)| name).collect();
            for name in leftover {
                warn!(suite = %name, "suite still running at shutdown");
                self.spans.close_suite(&name);
            }
            let performed = self.pipeline.shutdown();
            self.metrics.shutdown_endpoint();
            performed
        })
        .unwrap_or(false)
    }

    fn suites(&self) -> MutexGuard<'_, HashMap<String, SuiteContext>> {
        self.suites.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve_suite(&self, suite: &dyn SuiteHandle) -> SuiteContext {
        let sources = IdentifierSources::new(self.env.as_ref(), &self.properties);
        let lookup = SuiteLookupAdapter(suite);
        let aut = sources.resolve(Identifier::Aut, Some(&lookup), FallbackPolicy::Sentinel);
        let run = sources.resolve(Identifier::TestRunId, Some(&lookup), FallbackPolicy::Sentinel);
        let push_run_id = if run.origin == Origin::Fallback {
            testlens_ident::resolve(
                Identifier::TestRunId,
                Vec::new(),
                FallbackPolicy::UniqueRun {
                    now_millis: chrono::Utc::now().timestamp_millis(),
                },
            )
            .value
        } else {
            run.value.clone()
        };
        SuiteContext {
            name: suite.name().to_string(),
            aut: aut.value,
            test_run_id: run.value,
            push_run_id,
        }
    }

    /// Run `f`, converting a panic into a log line.
    fn guarded<T>(&self, callback: &'static str, f: impl FnOnce() -> T) -> Option<T> {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                error!(callback, error = %panic_message(payload.as_ref()), "telemetry callback panicked");
                None
            }
        }
    }
}

impl SuiteListener for LifecycleCorrelator {
    fn on_start(&self, suite: &dyn SuiteHandle) {
        self.guarded("on_start", || {
            let name = suite.name();
            let context = self.resolve_suite(suite);
            info!(
                suite = %name,
                aut = %context.aut,
                test_run_id = %context.test_run_id,
                "suite started"
            );
            self.suites().insert(name.to_string(), context);
            self.spans.open_suite(name);
            self.metrics.ensure_started();
        });
    }

    fn on_finish(&self, suite: &dyn SuiteHandle) {
        self.guarded("on_finish", || {
            let name = suite.name();
            let context = self.suites().remove(name);
            let closed = self.spans.close_suite(name);
            let Some(context) = context else {
                debug!(suite = %name, span_closed = closed, "finish for a suite that is not running");
                return;
            };
            self.pipeline.force_flush();
            let key = GroupingKey::new(&context.push_run_id, &context.aut, name);
            self.metrics.push_to_gateway(&key);
            info!(suite = %name, "suite finished");
        });
    }
}

impl InvocationListener for LifecycleCorrelator {
    fn before_invocation(&self, method: &dyn MethodHandle) -> Option<InvocationContext> {
        if !method.is_test() {
            return None;
        }
        self.guarded("before_invocation", || {
            let suite_name = method.suite_name();
            let suite = self
                .suite_context(suite_name)
                .unwrap_or_else(|| SuiteContext::unresolved(suite_name));
            let span = self.spans.start_test(&TestSpanInfo {
                suite: suite_name,
                class: method.class_name(),
                method: method.method_name(),
                description: method.description(),
                run_id: &suite.test_run_id,
            });
            InvocationContext { span, suite }
        })
    }

    fn after_invocation(
        &self,
        method: &dyn MethodHandle,
        context: Option<InvocationContext>,
        outcome: &TestOutcome,
    ) {
        if !method.is_test() {
            return;
        }
        self.guarded("after_invocation", move || {
            let suite = match context {
                Some(InvocationContext { span, suite }) => {
                    span.finish(outcome);
                    suite
                }
                None => self
                    .suite_context(method.suite_name())
                    .unwrap_or_else(|| SuiteContext::unresolved(method.suite_name())),
            };
            let status = outcome.label();
            let duration = outcome.duration_seconds();
            self.metrics.record_result(
                &ResultLabels {
                    suite: method.suite_name(),
                    aut: &suite.aut,
                    test_run_id: &suite.test_run_id,
                    test_class: method.class_name(),
                    test_name: method.method_name(),
                    status,
                },
                duration,
            );
            info!(
                suite = %method.suite_name(),
                class = %method.class_name(),
                test = %method.method_name(),
                status = %status,
                duration_seconds = duration,
                "test finished"
            );
        });
    }
}

impl Drop for LifecycleCorrelator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for LifecycleCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCorrelator")
            .field("running_suites", &self.running_suites())
            .field("pipeline", &self.pipeline)
            .field("metrics", &self.metrics)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
