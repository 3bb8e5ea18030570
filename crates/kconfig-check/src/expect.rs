use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::parse::{ConfigValue, ParsedConfig};

/// Explicit `CONFIG_X -> value` assertions against a `.config`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigExpectations {
    values: BTreeMap<String, String>,
}

impl ConfigExpectations {
    /// Parses a JSON object whose values are all strings, e.g.
    /// `{"CONFIG_A": "y", "CONFIG_B": ""}`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(obj) = value else {
            return Err(Error::msg(format!(
                "invalid expectations (expected a JSON object): {raw}"
            )));
        };

        let mut values = BTreeMap::new();
        for (key, v) in obj {
            let Some(s) = v.as_str() else {
                return Err(Error::msg(format!(
                    "invalid expectation for '{key}' (expected string, got {v})"
                )));
            };
            values.insert(key, s.to_string());
        }
        Ok(Self { values })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectationFailure {
    pub key: String,
    pub expected: String,
    pub actual: ConfigValue,
}

impl ExpectationFailure {
    pub fn render(&self) -> String {
        format!(
            "ERROR: {}: actual '{}', expected '{}' in {}\n\n",
            self.key,
            self.actual.value,
            self.expected,
            self.actual.source.display()
        )
    }
}

/// Returns every expectation the parsed `.config` does not meet. Options the
/// `.config` does not mention are compared as unset.
pub fn check_expectations(
    actual: &ParsedConfig,
    dot_config: &Path,
    expectations: &ConfigExpectations,
) -> Vec<ExpectationFailure> {
    let missing = ConfigValue::unset(dot_config);
    let failures: Vec<ExpectationFailure> = expectations
        .iter()
        .filter_map(|(key, expected)| {
            let got = actual.get(key).unwrap_or(&missing);
            (got.value != expected).then(|| ExpectationFailure {
                key: key.to_string(),
                expected: expected.to_string(),
                actual: got.clone(),
            })
        })
        .collect();

    tracing::info!(
        dot_config = %dot_config.display(),
        expectations = expectations.len(),
        failures = failures.len(),
        "config expectations checked"
    );
    failures
}
