//! Per-event pipeline: labels, metric updates, handler fan-out.
//!
//! Order per event is fixed: extract labels, increment `requests_total`,
//! measure `request_duration`, `view_runtime`, `db_runtime`, then run every
//! registered handler in registration order. Runs on the publisher's thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqmetrics_core::event::RequestEvent;
use reqmetrics_core::labels::{LabelExtractor, LabelSet};
use reqmetrics_core::units::{ms_to_seconds, optional_ms_to_seconds};
use reqmetrics_core::Result;

use crate::handlers::HandlerRegistry;
use crate::registry::RequestMetrics;

pub struct EventSubscriber {
    metrics: Arc<RequestMetrics>,
    handlers: Arc<HandlerRegistry>,
    extractor: LabelExtractor,
    handler_failures: AtomicU64,
}

impl EventSubscriber {
    pub fn new(
        metrics: Arc<RequestMetrics>,
        handlers: Arc<HandlerRegistry>,
        extractor: LabelExtractor,
    ) -> Self {
        Self {
            metrics,
            handlers,
            extractor,
            handler_failures: AtomicU64::new(0),
        }
    }

    /// Handle one completed request.
    ///
    /// Missing required configuration fails before anything is recorded.
    /// Handler failures never reach the caller; they are logged and counted.
    pub fn on_event(&self, event: &RequestEvent) -> Result<LabelSet> {
        let labels = self.extractor.extract(&event.payload)?;

        let m = &self.metrics;
        m.requests_total.increment(&labels)?;
        m.request_duration
            .measure(&labels, ms_to_seconds(event.duration_ms))?;
        m.view_runtime
            .measure(&labels, optional_ms_to_seconds(event.view_runtime_ms))?;
        m.db_runtime
            .measure(&labels, optional_ms_to_seconds(event.db_runtime_ms))?;

        tracing::debug!(labels = %labels, duration_ms = event.duration_ms, "request recorded");

        for (idx, handler) in self.handlers.snapshot().iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler.call(event, &labels))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.handler_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(handler = idx, error = %e, "controller handler failed");
                }
                Err(panic) => {
                    self.handler_failures.fetch_add(1, Ordering::Relaxed);
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic".to_string());
                    tracing::error!(handler = idx, panic = %msg, "controller handler panicked");
                }
            }
        }

        Ok(labels)
    }

    /// Handler invocations that returned an error or panicked.
    pub fn handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }
}
