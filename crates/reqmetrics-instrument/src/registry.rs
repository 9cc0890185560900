//! Metric declaration, once per registry.

use std::sync::{Arc, Mutex};

use reqmetrics_core::metric::MetricDefinition;
use reqmetrics_core::Result;

use crate::sink::{Counter, Histogram, MetricsSink};

/// Update handles for the four request metrics.
#[derive(Clone)]
pub struct RequestMetrics {
    pub requests_total: Arc<dyn Counter>,
    pub request_duration: Arc<dyn Histogram>,
    pub view_runtime: Arc<dyn Histogram>,
    pub db_runtime: Arc<dyn Histogram>,
}

/// Declares the request metrics against a sink exactly once.
pub struct MetricRegistry {
    sink: Arc<dyn MetricsSink>,
    group: String,
    // Held while declaring so racing installs see one definition set.
    installed: Mutex<Option<Arc<RequestMetrics>>>,
}

impl MetricRegistry {
    pub fn new(sink: Arc<dyn MetricsSink>, group: impl Into<String>) -> Self {
        Self {
            sink,
            group: group.into(),
            installed: Mutex::new(None),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn is_installed(&self) -> bool {
        self.installed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Declare the metrics on first call; later calls return the same handles.
    /// A failed declaration leaves the registry uninstalled.
    pub fn install(&self) -> Result<Arc<RequestMetrics>> {
        let mut slot = self.installed.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(metrics) = slot.as_ref() {
            tracing::debug!(group = %self.group, "request metrics already declared");
            return Ok(Arc::clone(metrics));
        }

        let [total, duration, view, db] = MetricDefinition::request_set(&self.group);
        let metrics = Arc::new(RequestMetrics {
            requests_total: self.sink.counter(&total)?,
            request_duration: self.sink.histogram(&duration)?,
            view_runtime: self.sink.histogram(&view)?,
            db_runtime: self.sink.histogram(&db)?,
        });

        tracing::info!(group = %self.group, "request metrics declared");
        *slot = Some(Arc::clone(&metrics));
        Ok(metrics)
    }
}
