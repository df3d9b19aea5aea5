// SPDX-License-Identifier: MIT OR Apache-2.0
//! Validation tests for `testlens-config`.

use testlens_config::{
    ConfigError, ConfigWarning, MapEnv, Properties, TelemetryConfig, load_config, parse_toml,
    validate_config,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Config that produces no warnings.
fn quiet_config() -> TelemetryConfig {
    let mut cfg = TelemetryConfig::default();
    cfg.metrics.pushgateway_address = "pushgateway.ci.internal:9091".into();
    cfg.properties = Properties::new().with("env", "ci");
    cfg
}

fn validation_reasons(err: ConfigError) -> Vec<String> {
    match err {
        ConfigError::ValidationError { reasons } => reasons,
        other => panic!("expected ValidationError, got {other:?}"),
    }
}

// ===========================================================================
// Valid configs
// ===========================================================================

#[test]
fn quiet_config_has_no_warnings() {
    let warnings = validate_config(&quiet_config()).unwrap();
    assert!(warnings.is_empty(), "expected zero warnings: {warnings:?}");
}

#[test]
fn all_log_levels_are_accepted() {
    for level in ["error", "warn", "info", "debug", "trace"] {
        let cfg = TelemetryConfig {
            log_level: Some(level.into()),
            ..quiet_config()
        };
        validate_config(&cfg).unwrap_or_else(|e| panic!("log_level '{level}' should be valid: {e}"));
    }
}

#[test]
fn ephemeral_port_bind_is_valid() {
    let mut cfg = quiet_config();
    cfg.metrics.bind = "127.0.0.1:0".into();
    validate_config(&cfg).unwrap();
}

// ===========================================================================
// Hard errors
// ===========================================================================

#[test]
fn bad_bind_address_is_rejected() {
    let mut cfg = quiet_config();
    cfg.metrics.bind = "localhost".into();
    let reasons = validation_reasons(validate_config(&cfg).unwrap_err());
    assert!(reasons.iter().any(|r| r.contains("metrics.bind")));
}

#[test]
fn empty_job_name_is_rejected() {
    let mut cfg = quiet_config();
    cfg.metrics.job_name = " ".into();
    let reasons = validation_reasons(validate_config(&cfg).unwrap_err());
    assert!(reasons.iter().any(|r| r.contains("job_name")));
}

#[test]
fn push_timeout_bounds() {
    for secs in [0, 301] {
        let mut cfg = quiet_config();
        cfg.metrics.push_timeout_secs = secs;
        let reasons = validation_reasons(validate_config(&cfg).unwrap_err());
        assert!(reasons.iter().any(|r| r.contains("push_timeout_secs")));
    }
}

#[test]
fn schemeless_endpoint_is_rejected() {
    let mut cfg = quiet_config();
    cfg.tracing.endpoint = "localhost:4317".into();
    let reasons = validation_reasons(validate_config(&cfg).unwrap_err());
    assert!(reasons.iter().any(|r| r.contains("tracing.endpoint")));
}

#[test]
fn multiple_errors_are_collected() {
    let mut cfg = quiet_config();
    cfg.log_level = Some("verbose".into());
    cfg.metrics.job_name = String::new();
    cfg.tracing.service_name = String::new();
    let reasons = validation_reasons(validate_config(&cfg).unwrap_err());
    assert_eq!(reasons.len(), 3, "{reasons:?}");
}

// ===========================================================================
// Warnings
// ===========================================================================

#[test]
fn disabled_telemetry_warns() {
    let mut cfg = quiet_config();
    cfg.metrics.enabled = false;
    cfg.tracing.enabled = false;
    let warnings = validate_config(&cfg).unwrap();
    assert_eq!(warnings, vec![ConfigWarning::TelemetryDisabled]);
}

#[test]
fn local_gateway_warns_with_address() {
    let cfg = TelemetryConfig {
        properties: Properties::new().with("env", "ci"),
        ..TelemetryConfig::default()
    };
    let warnings = validate_config(&cfg).unwrap();
    assert_eq!(
        warnings,
        vec![ConfigWarning::LocalPushGateway {
            address: "localhost:9091".into()
        }]
    );
    assert!(warnings[0].to_string().contains("localhost:9091"));
}

// ===========================================================================
// Loading
// ===========================================================================

#[test]
fn full_file_round_trips_through_loader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("testlens.toml");
    std::fs::write(
        &path,
        r#"
log_level = "debug"

[metrics]
enabled = true
bind = "127.0.0.1:18081"
pushgateway_address = "pgw:9091"
job_name = "smoke"
push_timeout_secs = 5

[tracing]
enabled = false
endpoint = "http://collector:4318"
protocol = "http"
service_name = "svc"
tracer_name = "t"

[properties]
aut = "petstore"
env = "qa"
"#,
    )
    .unwrap();

    let cfg = load_config(Some(&path), &MapEnv::new()).unwrap();
    assert_eq!(cfg.log_level.as_deref(), Some("debug"));
    assert_eq!(cfg.metrics.push_timeout_secs, 5);
    assert!(!cfg.tracing.enabled);
    assert_eq!(cfg.properties.get("aut"), Some("petstore"));
    assert_eq!(cfg, parse_toml(&std::fs::read_to_string(&path).unwrap()).unwrap());
}

#[test]
fn wrong_types_give_parse_error() {
    let err = parse_toml("[metrics]\npush_timeout_secs = \"ten\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}
