// SPDX-License-Identifier: MIT OR Apache-2.0
//! Push-gateway export.
//!
//! A push replaces nothing: it is a `POST` (the gateway's "add" semantics) of
//! the full registry under a grouping key of `test_run_id`, `aut` and `suite`.

use crate::{MetricsError, UNKNOWN_LABEL};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::time::Duration;

/// Grouping labels under which one suite's metrics are pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupingKey {
    /// Test run id.
    pub test_run_id: String,
    /// Application under test.
    pub aut: String,
    /// Suite name.
    pub suite: String,
}

impl GroupingKey {
    /// Build a key; blank values are replaced with `unknown`.
    pub fn new(
        test_run_id: impl Into<String>,
        aut: impl Into<String>,
        suite: impl Into<String>,
    ) -> Self {
        fn or_unknown(v: String) -> String {
            if v.trim().is_empty() {
                UNKNOWN_LABEL.to_string()
            } else {
                v
            }
        }
        Self {
            test_run_id: or_unknown(test_run_id.into()),
            aut: or_unknown(aut.into()),
            suite: or_unknown(suite.into()),
        }
    }

    /// Label pairs in URL order.
    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("test_run_id", &self.test_run_id),
            ("aut", &self.aut),
            ("suite", &self.suite),
        ]
    }
}

/// Shortest request timeout a push is allowed.
pub const MIN_PUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Client for one push gateway and job.
#[derive(Debug, Clone)]
pub struct PushGateway {
    base_url: String,
    job: String,
    timeout: Duration,
}

impl PushGateway {
    /// Gateway at `base_url` (scheme included) pushing under `job`.
    ///
    /// `timeout` is raised to [`MIN_PUSH_TIMEOUT`]; a zero timeout would fail
    /// every push.
    pub fn new(base_url: impl Into<String>, job: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            job: job.into(),
            timeout: timeout.max(MIN_PUSH_TIMEOUT),
        }
    }

    /// Request timeout applied to each push.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `{base}/metrics/job/{job}/test_run_id/{..}/aut/{..}/suite/{..}`.
    ///
    /// Values containing `/` are sent as `<label>@base64/<url-safe base64>`.
    pub fn push_url(&self, key: &GroupingKey) -> Result<Url, MetricsError> {
        let invalid = || MetricsError::InvalidGatewayUrl {
            url: self.base_url.clone(),
        };
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        let mut tail = vec!["metrics".to_string()];
        label_segments(&mut tail, "job", &self.job);
        for (name, value) in key.pairs() {
            label_segments(&mut tail, name, value);
        }
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(&tail);
        Ok(url)
    }

    /// POST `body` (text exposition format) to the gateway.
    pub fn push(&self, key: &GroupingKey, body: String) -> Result<(), MetricsError> {
        let url = self.push_url(key)?;
        let transport = |e: reqwest::Error| MetricsError::Push {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(transport)?;
        let response = client
            .post(url.clone())
            .header(CONTENT_TYPE, prometheus::TEXT_FORMAT)
            .body(body)
            .send()
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetricsError::PushRejected {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

fn label_segments(out: &mut Vec<String>, name: &str, value: &str) {
    if value.contains('/') {
        out.push(format!("{name}@base64"));
        out.push(URL_SAFE.encode(value));
    } else {
        out.push(name.to_string());
        out.push(value.to_string());
    }
}
