//! reqmetrics instrumentation library.
//!
//! Wires the request-completion notification to the request metrics:
//! metric declaration against a sink, the single bus subscription, label
//! derivation per event, and fan-out to post-update handlers. Consumed by
//! the demo binary (`main.rs`) and by integration tests.

pub mod bus;
pub mod config;
pub mod handlers;
pub mod install;
pub mod registry;
pub mod sink;
pub mod subscriber;
pub mod web;

pub use install::Instrumentation;
