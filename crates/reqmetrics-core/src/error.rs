//! Shared error type across reqmetrics crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, ReqMetricsError>;

/// Unified error type used by core and instrument.
#[derive(Debug, Error)]
pub enum ReqMetricsError {
    #[error("missing required configuration: {0}")]
    MissingConfig(String),
    #[error("metric already declared: {0}")]
    DuplicateMetric(String),
    #[error("label `{key}` is not a declared tag of {metric}")]
    UnknownLabel { metric: String, key: String },
    #[error("invalid observation for {metric}: {value}")]
    InvalidValue { metric: String, value: f64 },
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("subscription failed: {0}")]
    Subscription(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ReqMetricsError {
    /// Fatal errors must reach the publisher instead of being swallowed by
    /// the instrumentation layer.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReqMetricsError::MissingConfig(_))
    }

    /// Stable short code, handy for log fields and test assertions.
    pub fn code(&self) -> &'static str {
        match self {
            ReqMetricsError::MissingConfig(_) => "MISSING_CONFIG",
            ReqMetricsError::DuplicateMetric(_) => "DUPLICATE_METRIC",
            ReqMetricsError::UnknownLabel { .. } => "UNKNOWN_LABEL",
            ReqMetricsError::InvalidValue { .. } => "INVALID_VALUE",
            ReqMetricsError::BadConfig(_) => "BAD_CONFIG",
            ReqMetricsError::Subscription(_) => "SUBSCRIPTION",
            ReqMetricsError::Internal(_) => "INTERNAL",
        }
    }
}
