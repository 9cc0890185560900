//! Fixed metric definitions for the request pipeline.
//!
//! Names, tags, units and buckets here are an external contract: dashboards
//! and alerts key on them, so they are declared once and never computed.

use crate::labels::LabelKey;

/// Histogram buckets in seconds, shared by every request histogram.
/// Strictly increasing; the tail covers long-running requests.
pub const LONG_RUNNING_REQUEST_BUCKETS: [f64; 16] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, // standard
    30.0, 60.0, 120.0, 300.0, 600.0,
];

pub const REQUESTS_TOTAL: &str = "requests_total";
pub const REQUEST_DURATION: &str = "request_duration";
pub const VIEW_RUNTIME: &str = "view_runtime";
pub const DB_RUNTIME: &str = "db_runtime";

/// Default metric group (name prefix).
pub const DEFAULT_GROUP: &str = "rails";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Histogram,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// Immutable description of one metric, handed to a sink for declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub group: String,
    pub name: &'static str,
    pub kind: MetricKind,
    pub comment: &'static str,
    pub tag_keys: &'static [LabelKey],
    pub unit: Option<&'static str>,
    pub buckets: Option<&'static [f64]>,
}

impl MetricDefinition {
    /// Exported name: `<group>_<name>`.
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.group, self.name)
    }

    pub fn has_tag(&self, key: &str) -> bool {
        self.tag_keys.iter().any(|k| k.as_str() == key)
    }

    /// The four request metrics, in declaration order.
    pub fn request_set(group: &str) -> [MetricDefinition; 4] {
        [
            Self::counter(
                group,
                REQUESTS_TOTAL,
                "A counter of the total number of HTTP requests rails processed.",
            ),
            Self::seconds_histogram(group, REQUEST_DURATION, "A histogram of the response latency."),
            Self::seconds_histogram(group, VIEW_RUNTIME, "A histogram of the view rendering time."),
            Self::seconds_histogram(
                group,
                DB_RUNTIME,
                "A histogram of the activerecord execution time.",
            ),
        ]
    }

    fn counter(group: &str, name: &'static str, comment: &'static str) -> Self {
        Self {
            group: group.to_string(),
            name,
            kind: MetricKind::Counter,
            comment,
            tag_keys: &LabelKey::ALL,
            unit: None,
            buckets: None,
        }
    }

    fn seconds_histogram(group: &str, name: &'static str, comment: &'static str) -> Self {
        Self {
            group: group.to_string(),
            name,
            kind: MetricKind::Histogram,
            comment,
            tag_keys: &LabelKey::ALL,
            unit: Some("seconds"),
            buckets: Some(&LONG_RUNNING_REQUEST_BUCKETS),
        }
    }
}
