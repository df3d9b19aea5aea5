// SPDX-License-Identifier: MIT OR Apache-2.0
//! The shapes test frameworks hand to the correlator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use testlens_ident::SuiteLookup;

/// A suite as seen by suite-lifecycle callbacks.
pub trait SuiteHandle {
    /// Display name; unique among concurrently running suites.
    fn name(&self) -> &str;
    /// Suite attribute set by the framework or earlier hooks.
    fn attribute(&self, key: &str) -> Option<String>;
    /// Parameter declared in the suite definition.
    fn parameter(&self, key: &str) -> Option<String>;
}

/// A method as seen by invocation callbacks.
pub trait MethodHandle {
    /// Name of the suite the invocation runs in.
    fn suite_name(&self) -> &str;
    /// Simple name of the declaring class (or module).
    fn class_name(&self) -> &str;
    /// Method name.
    fn method_name(&self) -> &str;
    /// Description, empty when none.
    fn description(&self) -> &str;
    /// `false` for setup and teardown methods, which the correlator ignores.
    fn is_test(&self) -> bool;
}

/// Adapts a [`SuiteHandle`] to the identifier resolver's lookup seam.
pub(crate) struct SuiteLookupAdapter<'a>(pub(crate) &'a dyn SuiteHandle);

impl SuiteLookup for SuiteLookupAdapter<'_> {
    fn attribute(&self, key: &str) -> Option<String> {
        self.0.attribute(key)
    }

    fn parameter(&self, key: &str) -> Option<String> {
        self.0.parameter(key)
    }
}

/// An owned [`SuiteHandle`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteInfo {
    /// Suite name.
    pub name: String,
    /// Suite attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Suite parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl SuiteInfo {
    /// Suite with no attributes or parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

impl SuiteHandle for SuiteInfo {
    fn name(&self) -> &str {
        &self.name
    }

    fn attribute(&self, key: &str) -> Option<String> {
        self.attributes.get(key).cloned()
    }

    fn parameter(&self, key: &str) -> Option<String> {
        self.parameters.get(key).cloned()
    }
}

/// An owned [`MethodHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMethod {
    /// Suite name.
    pub suite: String,
    /// Declaring class.
    pub class: String,
    /// Method name.
    pub method: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Whether this is a test (as opposed to a configuration method).
    #[serde(default = "default_true")]
    pub test: bool,
}

fn default_true() -> bool {
    true
}

impl TestMethod {
    /// A test method.
    pub fn new(
        suite: impl Into<String>,
        class: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            suite: suite.into(),
            class: class.into(),
            method: method.into(),
            description: String::new(),
            test: true,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark as a configuration (non-test) method.
    pub fn configuration(mut self) -> Self {
        self.test = false;
        self
    }
}

impl MethodHandle for TestMethod {
    fn suite_name(&self) -> &str {
        &self.suite
    }

    fn class_name(&self) -> &str {
        &self.class
    }

    fn method_name(&self) -> &str {
        &self.method
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_test(&self) -> bool {
        self.test
    }
}
