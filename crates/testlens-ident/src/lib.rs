// SPDX-License-Identifier: MIT OR Apache-2.0
//! Correlation identifier resolution.
//!
//! Two values tie every span and metric series of a run together: the name of
//! the application under test (`aut`) and the test run id (`test_run_id`).
//! Each is looked up through an ordered chain of [`Candidate`]s (environment
//! variable, process property, suite attribute, suite parameter) and the
//! first non-blank value wins. When nothing yields a value a deterministic
//! [`FallbackPolicy`] applies.
//!
//! [`resolve`] is pure: callers gather candidates up front (see
//! [`IdentifierSources`]) and pass the clock reading in, so resolution can be
//! tested without touching the process environment.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::Serialize;
use std::fmt;
use testlens_config::{EnvSource, Properties};
use tracing::debug;

/// Sentinel used when an identifier cannot be resolved.
pub const UNKNOWN: &str = "unknown";

/// Prefix of synthesized run ids.
pub const LOCAL_RUN_PREFIX: &str = "local-run-";

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// The correlation identifiers testlens knows how to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Identifier {
    /// Application-under-test name.
    Aut,
    /// Test run id.
    TestRunId,
}

impl Identifier {
    /// Environment variable consulted first.
    pub const fn env_key(self) -> &'static str {
        match self {
            Self::Aut => "AUT",
            Self::TestRunId => "TEST_RUN_ID",
        }
    }

    /// Key used for process properties, suite attributes and suite parameters.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Aut => "aut",
            Self::TestRunId => "test_run_id",
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Process environment variable.
    Env,
    /// Process property.
    Property,
    /// Suite-scoped attribute.
    SuiteAttribute,
    /// Suite-scoped parameter.
    SuiteParameter,
    /// No source had a value; the fallback policy produced it.
    Fallback,
}

/// One possible source for an identifier value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Source kind.
    pub origin: Origin,
    /// Raw value, if the source had one.
    pub value: Option<String>,
}

impl Candidate {
    /// Create a candidate.
    pub fn new(origin: Origin, value: Option<impl Into<String>>) -> Self {
        Self {
            origin,
            value: value.map(Into::into),
        }
    }

    /// Trimmed value when present and not whitespace-only.
    fn usable(&self) -> Option<&str> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// What to return when no candidate yields a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Return [`UNKNOWN`].
    Sentinel,
    /// For [`Identifier::TestRunId`], synthesize `local-run-<now_millis>` so
    /// repeated local runs do not collide in an aggregation store. Other
    /// identifiers still fall back to [`UNKNOWN`].
    UniqueRun {
        /// Current wall-clock time in epoch milliseconds.
        now_millis: i64,
    },
}

/// A resolved identifier value and its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    /// The value; never empty.
    pub value: String,
    /// Where it came from.
    pub origin: Origin,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve `id` from `candidates`, in order, applying `fallback` when none
/// yields a non-blank value.
pub fn resolve<I>(id: Identifier, candidates: I, fallback: FallbackPolicy) -> Resolved
where
    I: IntoIterator<Item = Candidate>,
{
    for candidate in candidates {
        if let Some(value) = candidate.usable() {
            return Resolved {
                value: value.to_string(),
                origin: candidate.origin,
            };
        }
    }
    let value = match (id, fallback) {
        (Identifier::TestRunId, FallbackPolicy::UniqueRun { now_millis }) => {
            format!("{LOCAL_RUN_PREFIX}{now_millis}")
        }
        _ => UNKNOWN.to_string(),
    };
    Resolved {
        value,
        origin: Origin::Fallback,
    }
}

/// Suite-scoped lookups consulted after the process-wide sources.
pub trait SuiteLookup {
    /// Suite attribute set by the surrounding framework or by earlier hooks.
    fn attribute(&self, key: &str) -> Option<String>;
    /// Suite parameter declared in the suite definition.
    fn parameter(&self, key: &str) -> Option<String>;
}

/// Gathers candidates from the environment, the process properties and,
/// optionally, a suite.
///
/// The canonical order is: environment (`AUT` / `TEST_RUN_ID`), process
/// property, suite attribute, suite parameter.
pub struct IdentifierSources<'a> {
    env: &'a dyn EnvSource,
    properties: &'a Properties,
}

impl<'a> IdentifierSources<'a> {
    /// Create a source set.
    pub fn new(env: &'a dyn EnvSource, properties: &'a Properties) -> Self {
        Self { env, properties }
    }

    /// The ordered candidate list for `id`.
    pub fn candidates(&self, id: Identifier, suite: Option<&dyn SuiteLookup>) -> Vec<Candidate> {
        let key = id.key();
        let mut out = vec![
            Candidate::new(Origin::Env, self.env.var(id.env_key())),
            Candidate::new(Origin::Property, self.properties.get(key)),
        ];
        if let Some(suite) = suite {
            out.push(Candidate::new(Origin::SuiteAttribute, suite.attribute(key)));
            out.push(Candidate::new(Origin::SuiteParameter, suite.parameter(key)));
        }
        out
    }

    /// Gather candidates and resolve.
    pub fn resolve(
        &self,
        id: Identifier,
        suite: Option<&dyn SuiteLookup>,
        fallback: FallbackPolicy,
    ) -> Resolved {
        let resolved = resolve(id, self.candidates(id, suite), fallback);
        debug!(identifier = %id, value = %resolved.value, origin = ?resolved.origin, "identifier resolved");
        resolved
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
