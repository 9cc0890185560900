//! Demo HTTP host: an axum app that publishes request-completion events.
//!
//! Stands in for the web framework. Nothing here is exported over HTTP;
//! the router only produces events for the instrumentation pipeline.

pub mod router;
pub mod timing;

pub use router::{build_router, WebState};
pub use timing::{resolve_action, RouteAction, Runtimes};
