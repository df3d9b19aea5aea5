// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and environment overrides for testlens.
//!
//! This crate provides [`TelemetryConfig`] (the settings for the metrics
//! recorder, the tracer pipeline, and the process [`Properties`]) together
//! with helpers for loading from TOML files, applying environment overrides
//! through an [`EnvSource`], and producing advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Environment variable access.
pub mod env;
/// Process-scoped properties.
pub mod properties;

pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use properties::{Properties, PropertyParseError};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found or could not be read.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Both metrics and tracing are switched off; the listener records nothing.
    TelemetryDisabled,
    /// The push gateway address points at the local host.
    LocalPushGateway {
        /// Configured address.
        address: String,
    },
    /// No `env` property is set, so spans are tagged with the default.
    MissingEnvironment {
        /// Value that will be used instead.
        default: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::TelemetryDisabled => {
                f.write_str("metrics and tracing are both disabled")
            }
            ConfigWarning::LocalPushGateway { address } => {
                write!(f, "push gateway '{address}' is local; CI runs will not reach it")
            }
            ConfigWarning::MissingEnvironment { default } => {
                write!(f, "property 'env' is not set; spans are tagged '{default}'")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default bind address of the metrics exposition endpoint.
pub const DEFAULT_METRICS_BIND: &str = "0.0.0.0:8081";

/// Default push gateway address (`host:port`, no scheme).
pub const DEFAULT_PUSHGATEWAY_ADDRESS: &str = "localhost:9091";

/// Default push gateway job name.
pub const DEFAULT_JOB_NAME: &str = "api_test_automation";

/// Default OTLP collector endpoint.
pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Default `service.name` resource attribute.
pub const DEFAULT_SERVICE_NAME: &str = "api-test-automation";

/// Default instrumentation scope name of the tracer.
pub const DEFAULT_TRACER_NAME: &str = "api-tests";

/// Default `environment` resource attribute.
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Maximum push timeout in seconds.
const MAX_PUSH_TIMEOUT_SECS: u64 = 300;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level testlens configuration.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Metrics recorder settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Tracer pipeline settings.
    #[serde(default)]
    pub tracing: TracingConfig,

    /// Process properties consulted by the identifier resolver.
    #[serde(default)]
    pub properties: Properties,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".into()),
            metrics: MetricsConfig::default(),
            tracing: TracingConfig::default(),
            properties: Properties::default(),
        }
    }
}

/// Settings for the metrics exposition endpoint and the push gateway.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether test results are recorded at all.
    pub enabled: bool,
    /// Bind address of the pull-model exposition endpoint.
    pub bind: String,
    /// Push gateway address as `host:port`, optionally with a scheme.
    pub pushgateway_address: String,
    /// Job name used in the push URL.
    pub job_name: String,
    /// Timeout for one push, in seconds.
    pub push_timeout_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: DEFAULT_METRICS_BIND.into(),
            pushgateway_address: DEFAULT_PUSHGATEWAY_ADDRESS.into(),
            job_name: DEFAULT_JOB_NAME.into(),
            push_timeout_secs: 10,
        }
    }
}

/// Transport for span export.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TraceProtocol {
    /// OTLP over gRPC.
    #[default]
    Grpc,
    /// OTLP over HTTP with protobuf payloads.
    Http,
}

/// Settings for the tracer provider and its exporter.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct TracingConfig {
    /// Whether spans are exported.
    pub enabled: bool,
    /// Collector endpoint.
    pub endpoint: String,
    /// Export transport.
    pub protocol: TraceProtocol,
    /// `service.name` resource attribute.
    pub service_name: String,
    /// Instrumentation scope of the tracer handed to the span manager.
    pub tracer_name: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_OTLP_ENDPOINT.into(),
            protocol: TraceProtocol::Grpc,
            service_name: DEFAULT_SERVICE_NAME.into(),
            tracer_name: DEFAULT_TRACER_NAME.into(),
        }
    }
}

impl MetricsConfig {
    /// Base URL of the push gateway, adding `http://` when no scheme is given.
    pub fn pushgateway_url(&self) -> String {
        let addr = self.pushgateway_address.trim().trim_end_matches('/');
        if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`TelemetryConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`TelemetryConfig::default()`].
///
/// Environment overrides from `env` are applied on top in both cases.
pub fn load_config(path: Option<&Path>, env: &dyn EnvSource) -> Result<TelemetryConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => TelemetryConfig::default(),
    };
    apply_env_overrides(&mut config, env);
    Ok(config)
}

/// Parse a TOML string into a [`TelemetryConfig`].
pub fn parse_toml(content: &str) -> Result<TelemetryConfig, ConfigError> {
    toml::from_str::<TelemetryConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `PUSHGATEWAY_ADDRESS`
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`
/// - `TESTLENS_METRICS_BIND`
/// - `TESTLENS_LOG_LEVEL`
///
/// Blank values are ignored.
pub fn apply_env_overrides(config: &mut TelemetryConfig, env: &dyn EnvSource) {
    let non_blank = |key: &str| env.var(key).filter(|v| !v.trim().is_empty());

    if let Some(val) = non_blank("PUSHGATEWAY_ADDRESS") {
        config.metrics.pushgateway_address = val;
    }
    if let Some(val) = non_blank("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.tracing.endpoint = val;
    }
    if let Some(val) = non_blank("TESTLENS_METRICS_BIND") {
        config.metrics.bind = val;
    }
    if let Some(val) = non_blank("TESTLENS_LOG_LEVEL") {
        config.log_level = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (unparseable bind address, empty job name, out-of-range push
/// timeout, unknown log level, scheme-less collector endpoint) are returned as
/// a [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &TelemetryConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level {
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(format!("invalid log_level '{level}'"));
        }
    }

    let metrics = &config.metrics;
    if metrics.bind.parse::<SocketAddr>().is_err() {
        errors.push(format!("metrics.bind '{}' is not a socket address", metrics.bind));
    }
    if metrics.job_name.trim().is_empty() {
        errors.push("metrics.job_name must not be empty".into());
    }
    if metrics.pushgateway_address.trim().is_empty() {
        errors.push("metrics.pushgateway_address must not be empty".into());
    }
    if metrics.push_timeout_secs == 0 || metrics.push_timeout_secs > MAX_PUSH_TIMEOUT_SECS {
        errors.push(format!(
            "metrics.push_timeout_secs {} out of range (1..{MAX_PUSH_TIMEOUT_SECS})",
            metrics.push_timeout_secs
        ));
    }

    let tracing = &config.tracing;
    if !(tracing.endpoint.starts_with("http://") || tracing.endpoint.starts_with("https://")) {
        errors.push(format!(
            "tracing.endpoint '{}' must start with http:// or https://",
            tracing.endpoint
        ));
    }
    if tracing.service_name.trim().is_empty() {
        errors.push("tracing.service_name must not be empty".into());
    }

    if !metrics.enabled && !tracing.enabled {
        warnings.push(ConfigWarning::TelemetryDisabled);
    }
    let gateway = metrics.pushgateway_url();
    if metrics.enabled && (gateway.contains("://localhost") || gateway.contains("://127.0.0.1")) {
        warnings.push(ConfigWarning::LocalPushGateway {
            address: metrics.pushgateway_address.clone(),
        });
    }
    if config.properties.get("env").is_none() {
        warnings.push(ConfigWarning::MissingEnvironment {
            default: DEFAULT_ENVIRONMENT.into(),
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

/// JSON schema of [`TelemetryConfig`].
pub fn config_schema() -> schemars::Schema {
    schemars::schema_for!(TelemetryConfig)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
