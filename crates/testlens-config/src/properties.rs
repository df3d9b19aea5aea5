// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-scoped key/value properties (`-D key=value`).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered string properties supplied at process start.
///
/// Filled from the `[properties]` table of the config file and from repeated
/// `-D key=value` command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

/// A `key=value` argument that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyParseError {
    /// The offending argument.
    pub raw: String,
}

impl fmt::Display for PropertyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected key=value, got '{}'", self.raw)
    }
}

impl std::error::Error for PropertyParseError {}

impl Properties {
    /// Empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a property.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a property.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Look up a property, falling back to `default` when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no properties are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a single `key=value` argument. The key is trimmed and must be
    /// non-empty; the value is kept verbatim and may be empty.
    pub fn parse_pair(raw: &str) -> Result<(String, String), PropertyParseError> {
        let (key, value) = raw.split_once('=').ok_or_else(|| PropertyParseError {
            raw: raw.to_string(),
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(PropertyParseError {
                raw: raw.to_string(),
            });
        }
        Ok((key.to_string(), value.to_string()))
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merged(mut self, other: Properties) -> Properties {
        self.0.extend(other.0);
        self
    }
}

impl FromIterator<(String, String)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pair_splits_on_first_equals() {
        let (k, v) = Properties::parse_pair("url=http://x?a=b").unwrap();
        assert_eq!(k, "url");
        assert_eq!(v, "http://x?a=b");
    }

    #[test]
    fn parse_pair_allows_empty_value() {
        let (k, v) = Properties::parse_pair("aut=").unwrap();
        assert_eq!(k, "aut");
        assert_eq!(v, "");
    }

    #[test]
    fn parse_pair_rejects_missing_equals_and_empty_key() {
        assert!(Properties::parse_pair("aut").is_err());
        assert!(Properties::parse_pair(" =x").is_err());
    }

    #[test]
    fn merged_prefers_overlay() {
        let base = Properties::new().with("env", "dev").with("aut", "a");
        let overlay = Properties::new().with("env", "qa");
        let merged = base.merged(overlay);
        assert_eq!(merged.get("env"), Some("qa"));
        assert_eq!(merged.get("aut"), Some("a"));
    }

    #[test]
    fn get_or_falls_back() {
        let props = Properties::new();
        assert_eq!(props.get_or("env", "dev"), "dev");
    }
}
