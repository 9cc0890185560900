//! Metrics sink seam.
//!
//! The pipeline only needs to declare metrics once and then increment or
//! measure them with a label set. Storage and export belong to whatever
//! implements these traits; `MemorySink` is the in-process one.

pub mod memory;

use std::sync::Arc;

use reqmetrics_core::labels::LabelSet;
use reqmetrics_core::metric::MetricDefinition;
use reqmetrics_core::Result;

pub use memory::{HistogramSnapshot, MemorySink};

/// Monotonic counter family. Must tolerate concurrent increments.
pub trait Counter: Send + Sync {
    fn increment(&self, labels: &LabelSet) -> Result<()>;
}

/// Bucketed distribution family. Must tolerate concurrent observations.
pub trait Histogram: Send + Sync {
    fn measure(&self, labels: &LabelSet, value: f64) -> Result<()>;
}

/// Declares metric families and hands back update handles.
///
/// Re-declaring an identical definition returns the existing family, so a
/// partially failed declaration pass can be retried. Reusing a full name
/// with a different definition is an error.
pub trait MetricsSink: Send + Sync {
    fn counter(&self, def: &MetricDefinition) -> Result<Arc<dyn Counter>>;
    fn histogram(&self, def: &MetricDefinition) -> Result<Arc<dyn Histogram>>;
}
