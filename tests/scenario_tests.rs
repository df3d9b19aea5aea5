// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end scenarios across config, correlator, spans, metrics and push.

use opentelemetry_sdk::trace::{InMemorySpanExporter, InMemorySpanExporterBuilder, SdkTracerProvider};
use std::sync::Arc;
use std::thread;
use testlens_config::{MapEnv, Properties, load_config, parse_toml, validate_config};
use testlens_core::{TestOutcome, TestStatus};
use testlens_listener::{
    InvocationListener, LifecycleCorrelator, SuiteInfo, SuiteListener, TestMethod,
};
use testlens_metrics::MetricsRecorder;
use testlens_trace::TracerPipeline;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn in_memory_pipeline() -> (Arc<TracerPipeline>, InMemorySpanExporter) {
    let exporter = InMemorySpanExporterBuilder::new()
        .keep_records_on_shutdown()
        .build();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    (
        Arc::new(TracerPipeline::from_provider(provider, "scenarios")),
        exporter,
    )
}

fn config_with_gateway(gateway: &str) -> testlens_config::TelemetryConfig {
    let env = MapEnv::new()
        .with("PUSHGATEWAY_ADDRESS", gateway)
        .with("TESTLENS_METRICS_BIND", "127.0.0.1:0");
    let mut config = load_config(None, &env).unwrap();
    config.metrics.push_timeout_secs = 2;
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn suite_finish_pushes_under_local_run_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_with_gateway(&server.uri());
    let (pipeline, exporter) = in_memory_pipeline();

    tokio::task::spawn_blocking(move || {
        let metrics = Arc::new(MetricsRecorder::new(&config.metrics).unwrap());
        let correlator = LifecycleCorrelator::new(pipeline, metrics)
            .with_env(MapEnv::new().with("AUT", "petstore"));
        let suite = SuiteInfo::new("Smoke");
        let test = TestMethod::new("Smoke", "UsersTest", "verifyUser");
        correlator.on_start(&suite);
        let cx = correlator.before_invocation(&test);
        correlator.after_invocation(&test, cx, &TestOutcome::new(TestStatus::Success, 1000, 1500));
        correlator.on_finish(&suite);
    })
    .await
    .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let push_path = requests[0].url.path().to_string();
    assert!(push_path.starts_with("/metrics/job/api_test_automation/test_run_id/local-run-"));
    assert!(push_path.ends_with("/aut/petstore/suite/Smoke"));
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("test_result_total"));
    assert!(body.contains("test_run_id=\"unknown\""));

    assert_eq!(exporter.get_finished_spans().unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn explicit_run_id_is_used_in_grouping_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(
            "/metrics/job/api_test_automation/test_run_id/nightly-12/aut/unknown/suite/Regression",
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_with_gateway(&server.uri());
    let (pipeline, _exporter) = in_memory_pipeline();
    tokio::task::spawn_blocking(move || {
        let metrics = Arc::new(MetricsRecorder::new(&config.metrics).unwrap());
        let correlator = LifecycleCorrelator::new(pipeline, metrics)
            .with_env(MapEnv::new())
            .with_properties(Properties::new().with("test_run_id", "nightly-12"));
        let suite = SuiteInfo::new("Regression");
        correlator.on_start(&suite);
        correlator.on_finish(&suite);
    })
    .await
    .unwrap();
}

#[test]
fn scrape_during_run_shows_results() {
    let (pipeline, _exporter) = in_memory_pipeline();
    let config = config_with_gateway("127.0.0.1:1");
    let metrics = Arc::new(MetricsRecorder::new(&config.metrics).unwrap());
    let correlator = LifecycleCorrelator::new(pipeline, Arc::clone(&metrics)).with_env(MapEnv::new());

    let suite = SuiteInfo::new("Smoke");
    correlator.on_start(&suite);
    let test = TestMethod::new("Smoke", "UsersTest", "verifyUser");
    let cx = correlator.before_invocation(&test);
    correlator.after_invocation(&test, cx, &TestOutcome::new(TestStatus::Success, 1000, 1500));

    let addr = metrics.endpoint_addr().unwrap();
    let body = reqwest::blocking::get(format!("http://{addr}/metrics"))
        .unwrap()
        .text()
        .unwrap();
    assert!(body.contains("suite=\"Smoke\""));
    assert!(body.contains("test_duration_seconds_sum"));
    correlator.on_finish(&suite);
}

#[test]
fn concurrent_suites_on_many_threads() {
    let (pipeline, exporter) = in_memory_pipeline();
    let config = config_with_gateway("127.0.0.1:1");
    let metrics = Arc::new(MetricsRecorder::new(&config.metrics).unwrap());
    let correlator = Arc::new(LifecycleCorrelator::new(pipeline, metrics).with_env(MapEnv::new()));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let correlator = Arc::clone(&correlator);
            thread::spawn(move || {
                let suite = SuiteInfo::new(format!("Suite{i}"));
                correlator.on_start(&suite);
                let workers: Vec<_> = (0..4)
                    .map(|t| {
                        let correlator = Arc::clone(&correlator);
                        let suite_name = suite.name.clone();
                        thread::spawn(move || {
                            let test = TestMethod::new(suite_name, "Parallel", format!("case{t}"));
                            let cx = correlator.before_invocation(&test);
                            correlator.after_invocation(
                                &test,
                                cx,
                                &TestOutcome::new(TestStatus::Success, 0, 100),
                            );
                        })
                    })
                    .collect();
                for w in workers {
                    w.join().unwrap();
                }
                correlator.on_finish(&suite);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(correlator.running_suites().is_empty());
    assert!(!correlator.pipeline().is_shut_down());
    let samples = correlator.metrics().samples();
    assert_eq!(samples.iter().map(|s| s.count).sum::<u64>(), 12);
    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 3 + 12);
    for span in spans.iter().filter(|s| s.name.starts_with("Parallel.")) {
        let parent = spans
            .iter()
            .find(|p| p.span_context.span_id() == span.parent_span_id)
            .unwrap();
        assert!(parent.name.starts_with("suite: Suite"));
    }
}

#[test]
fn suites_run_back_to_back_share_one_provider() {
    let (pipeline, exporter) = in_memory_pipeline();
    let config = config_with_gateway("127.0.0.1:1");
    let metrics = Arc::new(MetricsRecorder::new(&config.metrics).unwrap());
    let correlator = LifecycleCorrelator::new(Arc::clone(&pipeline), metrics).with_env(MapEnv::new());

    for name in ["Smoke", "Regression"] {
        let suite = SuiteInfo::new(name);
        let test = TestMethod::new(name, "UsersTest", "verifyUser");
        correlator.on_start(&suite);
        let cx = correlator.before_invocation(&test);
        correlator.after_invocation(&test, cx, &TestOutcome::new(TestStatus::Success, 0, 10));
        correlator.on_finish(&suite);
    }
    drop(correlator);

    assert!(pipeline.is_shut_down());
    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 4);
    assert!(spans.iter().any(|s| s.name == "suite: Regression"));
}

#[test]
fn shipped_example_config_is_valid() {
    let config = parse_toml(
        r#"
log_level = "info"

[metrics]
enabled = true
bind = "0.0.0.0:8081"
pushgateway_address = "pushgateway.ci:9091"
job_name = "api_test_automation"
push_timeout_secs = 10

[tracing]
enabled = true
endpoint = "http://otel-collector:4317"
protocol = "grpc"
service_name = "api-test-automation"
tracer_name = "api-tests"

[properties]
env = "staging"
aut = "petstore"
"#,
    )
    .unwrap();
    assert!(validate_config(&config).unwrap().is_empty());
}
