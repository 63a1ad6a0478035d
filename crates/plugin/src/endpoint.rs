// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Endpoint configuration documents handed to plugins.

use serde_json::{Map, Value};
use thiserror::Error;

/// Problems reading a value out of an endpoint document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("endpoint is not valid JSON: {0}")]
    Malformed(String),

    #[error("endpoint must be a JSON object")]
    NotAnObject,

    #[error("'{0}' is required")]
    Missing(String),

    #[error("'{key}' must be a {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// A parsed endpoint document (always a JSON object).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Endpoint {
    values: Map<String, Value>,
}

impl Endpoint {
    pub fn parse(json: &str) -> Result<Self, EndpointError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| EndpointError::Malformed(e.to_string()))?;
        match value {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(EndpointError::NotAnObject),
        }
    }

    /// A required, non-empty string value.
    pub fn string_value(&self, key: &str) -> Result<String, EndpointError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Err(EndpointError::Missing(key.to_string())),
            Some(Value::String(s)) if s.is_empty() => Err(EndpointError::Missing(key.to_string())),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(EndpointError::WrongType { key: key.to_string(), expected: "string" }),
        }
    }

    /// An optional string value, falling back to `default` when absent or empty.
    pub fn string_value_default(&self, key: &str, default: &str) -> Result<String, EndpointError> {
        match self.string_value(key) {
            Err(EndpointError::Missing(_)) => Ok(default.to_string()),
            other => other,
        }
    }

    /// An optional boolean value, falling back to `default` when absent.
    pub fn bool_value_default(&self, key: &str, default: bool) -> Result<bool, EndpointError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(EndpointError::WrongType { key: key.to_string(), expected: "boolean" }),
        }
    }

    /// Check every required string key, collecting all problems.
    pub fn require(&self, keys: &[&str]) -> Result<(), Vec<EndpointError>> {
        let problems: Vec<_> =
            keys.iter().filter_map(|key| self.string_value(key).err()).collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;
