// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-crate property-based tests verifying invariants spanning multiple crates.

use std::sync::Arc;

use opentelemetry_sdk::trace::{InMemorySpanExporterBuilder, SdkTracerProvider};
use proptest::prelude::*;
use testlens_config::{MapEnv, MetricsConfig, Properties};
use testlens_core::{TestOutcome, TestStatus};
use testlens_ident::{FallbackPolicy, Identifier, IdentifierSources, Origin, UNKNOWN};
use testlens_listener::{
    InvocationListener, LifecycleCorrelator, SuiteInfo, SuiteListener, TestMethod,
};
use testlens_metrics::{MetricsRecorder, RunSummary};
use testlens_trace::TracerPipeline;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_status() -> impl Strategy<Value = TestStatus> {
    prop::sample::select(TestStatus::ALL.to_vec())
}

fn arb_value() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        Just(Some("   ".to_string())),
        "[a-z][a-z0-9-]{0,8}".prop_map(Some),
    ]
}

fn quiet_metrics() -> MetricsConfig {
    MetricsConfig {
        bind: "127.0.0.1:0".into(),
        pushgateway_address: "127.0.0.1:1".into(),
        push_timeout_secs: 1,
        ..MetricsConfig::default()
    }
}

fn correlator() -> LifecycleCorrelator {
    let exporter = InMemorySpanExporterBuilder::new().build();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter)
        .build();
    let pipeline = Arc::new(TracerPipeline::from_provider(provider, "properties"));
    let metrics = Arc::new(MetricsRecorder::new(&quiet_metrics()).unwrap());
    LifecycleCorrelator::new(pipeline, metrics).with_env(MapEnv::new())
}

// ---------------------------------------------------------------------------
// Status mapping
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn status_text_always_maps_to_a_label(raw in "\\PC{0,12}") {
        let status: TestStatus = raw.parse().unwrap();
        let label = status.label().as_str();
        prop_assert!(["pass", "fail", "skipped", "unknown"].contains(&label));
    }

    #[test]
    fn outcome_duration_is_never_negative(status in arb_status(), start in 0u64..10_000, end in 0u64..10_000) {
        let outcome = TestOutcome::new(status, start, end);
        prop_assert!(outcome.duration_seconds() >= 0.0);
        prop_assert_eq!(outcome.label(), status.label());
    }
}

// ---------------------------------------------------------------------------
// Identifier resolution
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn resolved_identifier_is_never_blank(
        env in arb_value(),
        prop in arb_value(),
        attr in arb_value(),
        param in arb_value(),
    ) {
        let mut env_source = MapEnv::new();
        if let Some(v) = &env {
            env_source = env_source.with("AUT", v.clone());
        }
        let mut properties = Properties::new();
        if let Some(v) = &prop {
            properties.set("aut", v.clone());
        }
        let mut suite = SuiteInfo::new("S");
        if let Some(v) = &attr {
            suite = suite.with_attribute("aut", v.clone());
        }
        if let Some(v) = &param {
            suite = suite.with_parameter("aut", v.clone());
        }

        let correlator = correlator()
            .with_env(env_source)
            .with_properties(properties);
        correlator.on_start(&suite);
        let ctx = correlator.suite_context("S").unwrap();
        correlator.on_finish(&suite);

        prop_assert!(!ctx.aut.trim().is_empty());
        let first = [env, prop, attr, param]
            .into_iter()
            .flatten()
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty());
        match first {
            Some(v) => prop_assert_eq!(ctx.aut, v),
            None => prop_assert_eq!(ctx.aut, UNKNOWN),
        }
    }

    #[test]
    fn env_wins_over_every_other_source(value in "[a-z]{1,8}", other in "[A-Z]{1,8}") {
        let env = MapEnv::new().with("TEST_RUN_ID", value.clone());
        let properties = Properties::new().with("test_run_id", other);
        let sources = IdentifierSources::new(&env, &properties);
        let resolved = sources.resolve(Identifier::TestRunId, None, FallbackPolicy::Sentinel);
        prop_assert_eq!(resolved.origin, Origin::Env);
        prop_assert_eq!(resolved.value, value);
    }
}

// ---------------------------------------------------------------------------
// Correlator accounting
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn every_finished_invocation_is_counted_once(
        statuses in prop::collection::vec(arb_status(), 1..12),
    ) {
        let correlator = correlator();
        let suite = SuiteInfo::new("Props");
        correlator.on_start(&suite);
        for (i, status) in statuses.iter().enumerate() {
            let test = TestMethod::new("Props", "Generated", format!("case{i}"));
            let cx = correlator.before_invocation(&test);
            correlator.after_invocation(&test, cx, &TestOutcome::new(*status, 0, 10));
        }
        correlator.on_finish(&suite);

        let summary = RunSummary::from_samples(&correlator.metrics().samples());
        prop_assert_eq!(summary.total, statuses.len() as u64);
        for label in ["pass", "fail", "skipped", "unknown"] {
            let expected = statuses.iter().filter(|s| s.label().as_str() == label).count() as u64;
            prop_assert_eq!(summary.count(label), expected);
        }
        prop_assert_eq!(summary.by_suite.get("Props").copied(), Some(statuses.len() as u64));
    }
}
