//! Top-level facade crate for reqmetrics.
//!
//! Re-exports core types and the instrumentation library so users can depend on a single crate.

pub mod core {
    pub use reqmetrics_core::*;
}

pub mod instrument {
    pub use reqmetrics_instrument::*;
}
