// SPDX-License-Identifier: MIT OR Apache-2.0
//! testlens-listener
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The lifecycle correlator: the only component test frameworks call. It
//! receives suite start/finish and before/after-invocation callbacks and turns
//! them into a span hierarchy, per-test metrics and an end-of-suite push.
//!
//! The per-invocation state (the open test span and the suite's identifiers)
//! travels as a typed [`InvocationContext`] returned by
//! [`InvocationListener::before_invocation`] and handed back to
//! [`InvocationListener::after_invocation`].

/// The correlator.
pub mod correlator;
/// Suite and method handles.
pub mod handles;

pub use correlator::{InvocationContext, LifecycleCorrelator, SuiteContext};
pub use handles::{MethodHandle, SuiteHandle, SuiteInfo, TestMethod};

use testlens_core::TestOutcome;

/// Suite lifecycle callbacks.
pub trait SuiteListener {
    /// A suite is about to run its first test.
    fn on_start(&self, suite: &dyn SuiteHandle);
    /// A suite ran its last test.
    fn on_finish(&self, suite: &dyn SuiteHandle);
}

/// Per-invocation callbacks.
///
/// The two callbacks of a pair may arrive on different threads: the
/// [`InvocationContext`] is `Send`. The test span is not made current on any
/// thread; code that wants its own spans nested under the test attaches it for
/// the duration of the work with [`testlens_trace::TestSpan::attach`].
pub trait InvocationListener {
    /// A method is about to run. Returns the context to pass back to
    /// [`Self::after_invocation`], or `None` for ignored methods.
    fn before_invocation(&self, method: &dyn MethodHandle) -> Option<InvocationContext>;

    /// A method completed with `outcome`.
    fn after_invocation(
        &self,
        method: &dyn MethodHandle,
        context: Option<InvocationContext>,
        outcome: &TestOutcome,
    );
}

/// Errors raised while installing the correlator.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The tracer pipeline could not be built.
    #[error(transparent)]
    Trace(#[from] testlens_trace::TraceError),

    /// The metrics recorder could not be built.
    #[error(transparent)]
    Metrics(#[from] testlens_metrics::MetricsError),
}
