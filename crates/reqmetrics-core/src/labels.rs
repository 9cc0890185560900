//! Label derivation for request metrics.
//!
//! Rules:
//! - A label whose value cannot be derived (absent, null, empty string) is
//!   omitted, never stored empty.
//! - `application` is required; its absence is a configuration error.
//! - Configuration is read per call so overrides apply to the next event.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::ConfigSource;
use crate::error::{ReqMetricsError, Result};
use crate::event::Payload;

pub const DEFAULT_APPLICATION_KEY: &str = "APPLICATION_NAME";
pub const DEFAULT_ENVIRONMENT_KEY: &str = "RAILS_ENV";
pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const DEFAULT_FORMAT: &str = "html";

/// The fixed tag key set shared by every request metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LabelKey {
    Application,
    Environment,
    Controller,
    Action,
    Status,
    Format,
    Method,
}

impl LabelKey {
    /// Declaration order of the tags.
    pub const ALL: [LabelKey; 7] = [
        LabelKey::Application,
        LabelKey::Environment,
        LabelKey::Controller,
        LabelKey::Action,
        LabelKey::Status,
        LabelKey::Format,
        LabelKey::Method,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LabelKey::Application => "application",
            LabelKey::Environment => "environment",
            LabelKey::Controller => "controller",
            LabelKey::Action => "action",
            LabelKey::Status => "status",
            LabelKey::Format => "format",
            LabelKey::Method => "method",
        }
    }
}

/// Compact label mapping: only keys with a derived value are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LabelSet {
    values: BTreeMap<LabelKey, String>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert when `value` is present; `None` leaves the key absent.
    pub fn insert(&mut self, key: LabelKey, value: Option<String>) {
        if let Some(v) = value {
            self.values.insert(key, v);
        }
    }

    pub fn get(&self, key: LabelKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: LabelKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(name, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

/// Maps an event payload plus process configuration to a [`LabelSet`].
#[derive(Clone)]
pub struct LabelExtractor {
    config: Arc<dyn ConfigSource>,
    application_key: String,
    environment_key: String,
    default_environment: String,
}

impl LabelExtractor {
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self {
            config,
            application_key: DEFAULT_APPLICATION_KEY.to_string(),
            environment_key: DEFAULT_ENVIRONMENT_KEY.to_string(),
            default_environment: DEFAULT_ENVIRONMENT.to_string(),
        }
    }

    pub fn with_keys(mut self, application_key: &str, environment_key: &str) -> Self {
        self.application_key = application_key.to_string();
        self.environment_key = environment_key.to_string();
        self
    }

    pub fn with_default_environment(mut self, environment: &str) -> Self {
        self.default_environment = environment.to_string();
        self
    }

    /// Fail fast when the required application name is not configured.
    pub fn application(&self) -> Result<String> {
        self.config
            .get(&self.application_key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ReqMetricsError::MissingConfig(self.application_key.clone()))
    }

    pub fn environment(&self) -> String {
        self.config
            .get(&self.environment_key)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.default_environment.clone())
    }

    pub fn extract(&self, payload: &Payload) -> Result<LabelSet> {
        let mut labels = LabelSet::new();

        labels.insert(LabelKey::Application, Some(self.application()?));
        labels.insert(LabelKey::Environment, Some(self.environment()));
        labels.insert(LabelKey::Controller, payload.param("controller").and_then(label_value));
        labels.insert(LabelKey::Action, payload.param("action").and_then(label_value));
        labels.insert(LabelKey::Status, payload.get("status").and_then(label_value));

        let format = match payload.get("format") {
            None | Some(Value::Bool(false)) => None,
            Some(v) => label_value(v),
        };
        labels.insert(
            LabelKey::Format,
            Some(format.unwrap_or_else(|| DEFAULT_FORMAT.to_string())),
        );

        labels.insert(
            LabelKey::Method,
            payload
                .get("method")
                .and_then(label_value)
                .map(|m| m.to_lowercase()),
        );

        Ok(labels)
    }
}

/// Empty strings read as absent.
fn label_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => {
            tracing::trace!(value = %other, "non-string label value stringified");
            Some(other.to_string())
        }
    }
}
