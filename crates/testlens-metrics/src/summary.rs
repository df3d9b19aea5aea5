// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::{DURATION_HISTOGRAM, RESULT_COUNTER};
use prometheus::proto::MetricFamily;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One result series: its labels, how many results it counted, and the
/// summed duration of those results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSample {
    /// `suite` label.
    pub suite: String,
    /// `aut` label.
    pub aut: String,
    /// `test_run_id` label.
    pub test_run_id: String,
    /// `test_class` label.
    pub test_class: String,
    /// `test_name` label.
    pub test_name: String,
    /// `status` label.
    pub status: String,
    /// Counter value.
    pub count: u64,
    /// Histogram sample sum, in seconds.
    pub duration_sum: f64,
}

type SeriesKey = [String; 6];

fn series_key(metric: &prometheus::proto::Metric) -> SeriesKey {
    let mut key: SeriesKey = Default::default();
    for pair in metric.get_label() {
        let slot = match pair.get_name() {
            "suite" => 0,
            "aut" => 1,
            "test_run_id" => 2,
            "test_class" => 3,
            "test_name" => 4,
            "status" => 5,
            _ => continue,
        };
        key[slot] = pair.get_value().to_string();
    }
    key
}

/// Join the counter and histogram families of a gather into samples, sorted
/// by label tuple.
pub(crate) fn collect_samples(families: &[MetricFamily]) -> Vec<ResultSample> {
    let mut sums: BTreeMap<SeriesKey, f64> = BTreeMap::new();
    let mut counts: BTreeMap<SeriesKey, u64> = BTreeMap::new();

    for family in families {
        match family.get_name() {
            RESULT_COUNTER => {
                for metric in family.get_metric() {
                    counts.insert(series_key(metric), metric.get_counter().get_value() as u64);
                }
            }
            DURATION_HISTOGRAM => {
                for metric in family.get_metric() {
                    sums.insert(series_key(metric), metric.get_histogram().get_sample_sum());
                }
            }
            _ => {}
        }
    }

    counts
        .into_iter()
        .map(|(key, count)| {
            let duration_sum = sums.get(&key).copied().unwrap_or(0.0);
            let [suite, aut, test_run_id, test_class, test_name, status] = key;
            ResultSample {
                suite,
                aut,
                test_run_id,
                test_class,
                test_name,
                status,
                count,
                duration_sum,
            }
        })
        .collect()
}

/// Totals over a set of samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Number of results recorded.
    pub total: u64,
    /// Results per status label.
    pub by_status: BTreeMap<String, u64>,
    /// Results per suite.
    pub by_suite: BTreeMap<String, u64>,
    /// Summed duration of every result, in seconds.
    pub duration_seconds: f64,
}

impl RunSummary {
    /// Aggregate `samples`.
    pub fn from_samples(samples: &[ResultSample]) -> Self {
        let mut summary = Self::default();
        for s in samples {
            summary.total += s.count;
            *summary.by_status.entry(s.status.clone()).or_default() += s.count;
            *summary.by_suite.entry(s.suite.clone()).or_default() += s.count;
            summary.duration_seconds += s.duration_sum;
        }
        summary
    }

    /// Results carrying `status`.
    pub fn count(&self, status: &str) -> u64 {
        self.by_status.get(status).copied().unwrap_or(0)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} tests: {} passed, {} failed, {} skipped, {} unknown ({:.3}s)",
            self.total,
            self.count("pass"),
            self.count("fail"),
            self.count("skipped"),
            self.count("unknown"),
            self.duration_seconds
        )?;
        for (suite, n) in &self.by_suite {
            writeln!(f, "  {suite}: {n}")?;
        }
        Ok(())
    }
}
