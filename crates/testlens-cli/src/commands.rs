// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command implementations, kept out of `main` so they can be tested without
//! spawning the binary.

use crate::replay::{ReplayReport, parse_events, replay};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use testlens_config::{
    ConfigWarning, EnvSource, Properties, TelemetryConfig, config_schema, load_config,
    validate_config,
};
use testlens_listener::LifecycleCorrelator;

/// Load the configuration file (or defaults) with environment overrides.
pub fn load(path: Option<&Path>, env: &dyn EnvSource) -> Result<TelemetryConfig> {
    let config = load_config(path, env).with_context(|| match path {
        Some(p) => format!("load config '{}'", p.display()),
        None => "load default config".to_string(),
    })?;
    Ok(config)
}

/// Validate `config`, returning its advisory warnings.
pub fn check_config(config: &TelemetryConfig) -> Result<Vec<ConfigWarning>> {
    validate_config(config).context("invalid configuration")
}

/// The JSON schema of the configuration file, pretty-printed.
pub fn schema_json() -> Result<String> {
    serde_json::to_string_pretty(&config_schema()).context("serialize schema")
}

/// Replay the events in `events_path` through a freshly installed correlator.
pub fn run_replay(
    config: &TelemetryConfig,
    properties: Properties,
    events_path: &Path,
    env: impl EnvSource + 'static,
) -> Result<ReplayReport> {
    check_config(config)?;
    let file = File::open(events_path)
        .with_context(|| format!("open events file '{}'", events_path.display()))?;
    let events = parse_events(BufReader::new(file))
        .with_context(|| format!("parse events file '{}'", events_path.display()))?;
    let correlator = LifecycleCorrelator::install(config, properties)
        .context("install telemetry")?
        .with_env(env);
    let report = replay(&correlator, events);
    correlator.shutdown();
    Ok(report)
}

/// Human-readable rendering of a replay report.
pub fn format_report(report: &ReplayReport) -> String {
    let mut out = format!(
        "replayed {} suite(s), {} completed, {} interrupted",
        report.suites, report.completed, report.interrupted
    );
    if report.unmatched > 0 {
        out.push_str(&format!(", {} unmatched finish event(s)", report.unmatched));
    }
    out.push('\n');
    if !report.unfinished_suites.is_empty() {
        out.push_str(&format!(
            "suites without a finish event: {}\n",
            report.unfinished_suites.join(", ")
        ));
    }
    out.push_str(&report.summary.to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use testlens_config::MapEnv;

    fn quiet_config() -> TelemetryConfig {
        let mut config = TelemetryConfig::default();
        config.tracing.enabled = false;
        config.metrics.bind = "127.0.0.1:0".into();
        config.metrics.pushgateway_address = "127.0.0.1:1".into();
        config.metrics.push_timeout_secs = 1;
        config
    }

    #[test]
    fn schema_mentions_sections() {
        let schema = schema_json().unwrap();
        assert!(schema.contains("metrics"));
        assert!(schema.contains("tracing"));
    }

    #[test]
    fn replay_counts_and_summarises() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"event":"suite_start","suite":"Smoke"}}"#).unwrap();
        writeln!(
            file,
            r#"{{"event":"test_start","id":"1","suite":"Smoke","class":"UsersTest","method":"verifyUser"}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"event":"test_finish","id":"1","status":"success","start_ms":1000,"end_ms":1500}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"event":"test_start","id":"2","suite":"Smoke","class":"UsersTest","method":"hangs"}}"#
        )
        .unwrap();
        writeln!(file, r#"{{"event":"test_finish","id":"9","status":"success","start_ms":0,"end_ms":1}}"#).unwrap();
        writeln!(file, r#"{{"event":"suite_finish","suite":"Smoke"}}"#).unwrap();

        let report = run_replay(&quiet_config(), Properties::new(), file.path(), MapEnv::new()).unwrap();
        assert_eq!(report.suites, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(report.interrupted, 1);
        assert_eq!(report.unmatched, 1);
        assert_eq!(report.summary.total, 1);
        assert_eq!(report.summary.count("pass"), 1);

        let text = format_report(&report);
        assert!(text.contains("1 completed, 1 interrupted"));
        assert!(text.contains("1 unmatched"));
    }

    #[test]
    fn missing_events_file_is_an_error() {
        let err = run_replay(
            &quiet_config(),
            Properties::new(),
            Path::new("/definitely/not/here.jsonl"),
            MapEnv::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("open events file"));
    }
}
