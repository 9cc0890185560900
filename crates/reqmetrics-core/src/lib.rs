//! reqmetrics core: request-event model, label derivation, metric definitions.
//!
//! This crate holds the pure, runtime-free half of the instrumentation
//! pipeline. It knows how a request-completion event looks, how labels are
//! derived from it, and which metrics exist. It never talks to a sink or a
//! bus; that wiring lives in `reqmetrics-instrument`.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Missing configuration surfaces as `ReqMetricsError::MissingConfig`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod event;
pub mod labels;
pub mod metric;
pub mod units;

/// Shared result type.
pub use error::{ReqMetricsError, Result};
