//! Request-completion event as delivered by the framework's notification bus.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Notification name the pipeline subscribes to by default.
pub const PROCESS_ACTION_EVENT: &str = "process_action.action_controller";

/// Raw event payload: a loose string-keyed mapping.
///
/// Lookups are tolerant; a missing or `null` field reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Value nested under the `params` mapping.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.get("params")
            .and_then(Value::as_object)
            .and_then(|params| params.get(key))
            .filter(|v| !v.is_null())
    }
}

/// One completed request. Produced once by the bus, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestEvent {
    pub payload: Payload,
    pub duration_ms: f64,
    #[serde(default)]
    pub view_runtime_ms: Option<f64>,
    #[serde(default)]
    pub db_runtime_ms: Option<f64>,
}

impl RequestEvent {
    pub fn new(payload: Payload, duration_ms: f64) -> Self {
        Self {
            payload,
            duration_ms,
            view_runtime_ms: None,
            db_runtime_ms: None,
        }
    }

    pub fn with_view_runtime(mut self, ms: f64) -> Self {
        self.view_runtime_ms = Some(ms);
        self
    }

    pub fn with_db_runtime(mut self, ms: f64) -> Self {
        self.db_runtime_ms = Some(ms);
        self
    }
}
