// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tracer provider construction and exactly-once shutdown.

use crate::TraceError;
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use std::sync::atomic::{AtomicBool, Ordering};
use testlens_config::{DEFAULT_ENVIRONMENT, DEFAULT_TRACER_NAME, Properties, TraceProtocol, TracingConfig};
use tracing::{debug, error, info};

/// Property consulted for the `environment` resource attribute.
pub const ENVIRONMENT_PROPERTY: &str = "env";

const OTLP_HTTP_TRACES_PATH: &str = "/v1/traces";

/// The process-wide tracer provider and the tracer handed to the span
/// manager.
///
/// Built once at process start and shared (usually behind an `Arc`).
/// [`TracerPipeline::shutdown`] flushes and shuts the provider down at most
/// once no matter how many callers race to it.
pub struct TracerPipeline {
    provider: SdkTracerProvider,
    tracer: SdkTracer,
    shut_down: AtomicBool,
    // Drives the gRPC exporter's connection; dropped after the provider.
    runtime: Option<tokio::runtime::Runtime>,
}

impl TracerPipeline {
    /// Build a provider with a batch span processor and an OTLP exporter.
    ///
    /// Returns [`TracerPipeline::disabled`] when `config.enabled` is false.
    pub fn install(config: &TracingConfig, properties: &Properties) -> Result<Self, TraceError> {
        if !config.enabled {
            debug!("span export disabled");
            return Ok(Self::disabled_named(&config.tracer_name));
        }

        let instance_id = uuid::Uuid::new_v4().to_string();
        let environment = properties
            .get_or(ENVIRONMENT_PROPERTY, DEFAULT_ENVIRONMENT)
            .to_string();
        let resource = Resource::builder()
            .with_service_name(config.service_name.clone())
            .with_attributes([
                KeyValue::new("service.instance.id", instance_id.clone()),
                KeyValue::new("environment", environment.clone()),
            ])
            .build();

        let (exporter, runtime) = match config.protocol {
            TraceProtocol::Grpc => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("testlens-otlp")
                    .enable_all()
                    .build()
                    .map_err(TraceError::Runtime)?;
                let exporter = {
                    let _entered = runtime.enter();
                    opentelemetry_otlp::SpanExporter::builder()
                        .with_tonic()
                        .with_endpoint(config.endpoint.clone())
                        .build()
                };
                (exporter, Some(runtime))
            }
            TraceProtocol::Http => {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .with_endpoint(http_traces_endpoint(&config.endpoint))
                    .build();
                (exporter, None)
            }
        };
        let exporter = exporter.map_err(|e| TraceError::Exporter {
            reason: e.to_string(),
        })?;

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build();
        info!(
            endpoint = %config.endpoint,
            protocol = ?config.protocol,
            service = %config.service_name,
            instance = %instance_id,
            environment = %environment,
            "tracer pipeline installed"
        );
        let mut pipeline = Self::from_provider(provider, &config.tracer_name);
        pipeline.runtime = runtime;
        Ok(pipeline)
    }

    /// Wrap an existing provider, e.g. one with an in-memory exporter.
    pub fn from_provider(provider: SdkTracerProvider, tracer_name: &str) -> Self {
        let tracer = provider.tracer(tracer_name.to_string());
        Self {
            provider,
            tracer,
            shut_down: AtomicBool::new(false),
            runtime: None,
        }
    }

    /// A provider without processors: spans are created but never exported.
    pub fn disabled() -> Self {
        Self::disabled_named(DEFAULT_TRACER_NAME)
    }

    fn disabled_named(tracer_name: &str) -> Self {
        Self::from_provider(SdkTracerProvider::builder().build(), tracer_name)
    }

    /// The tracer spans are created with.
    pub fn tracer(&self) -> SdkTracer {
        self.tracer.clone()
    }

    /// The underlying provider.
    pub fn provider(&self) -> &SdkTracerProvider {
        &self.provider
    }

    /// Whether [`Self::shutdown`] has already run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Flush pending spans without shutting down.
    pub fn force_flush(&self) {
        if let Err(e) = self.provider.force_flush() {
            error!(error = %e, "failed to flush spans");
        }
    }

    /// Flush and shut the provider down. Returns `true` for the call that
    /// performed the shutdown; every later call is a no-op returning `false`.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.provider.shutdown() {
            Ok(()) => debug!("tracer provider shut down"),
            Err(e) => error!(error = %e, "tracer provider shutdown failed"),
        }
        true
    }
}

impl Drop for TracerPipeline {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for TracerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracerPipeline")
            .field("shut_down", &self.is_shut_down())
            .field("grpc_runtime", &self.runtime.is_some())
            .finish()
    }
}

/// OTLP/HTTP needs the signal path; append it when the endpoint is a bare
/// collector address.
fn http_traces_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.ends_with(OTLP_HTTP_TRACES_PATH) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{OTLP_HTTP_TRACES_PATH}")
    }
}
