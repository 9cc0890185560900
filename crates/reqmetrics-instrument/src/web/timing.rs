//! Request timing middleware.
//!
//! Times each request, derives controller/action from the path, and
//! publishes one `RequestEvent` after the response is produced. A fatal
//! pipeline error turns the response into a 500.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use reqmetrics_core::event::{Payload, RequestEvent};

use super::router::WebState;

/// Sub-timings a handler reports through response extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runtimes {
    pub view_ms: Option<f64>,
    pub db_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAction {
    pub controller: String,
    pub action: String,
    pub format: Option<String>,
}

/// Resource-style mapping: `/posts` -> posts#index, `/posts/7` -> posts#show,
/// a trailing extension (`/posts/7.json`) selects the format.
pub fn resolve_action(method: &Method, path: &str) -> RouteAction {
    let (path, format) = match path.rsplit_once('.') {
        Some((p, ext)) if !ext.is_empty() && !ext.contains('/') => (p, Some(ext.to_string())),
        _ => (path, None),
    };

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let controller = segments.next().unwrap_or("home").to_string();
    let member = segments.next().is_some();

    let action = match (method.as_str(), member) {
        ("GET", false) => "index",
        ("GET", true) => "show",
        ("POST", _) => "create",
        ("PUT" | "PATCH", _) => "update",
        ("DELETE", _) => "destroy",
        _ => "unknown",
    };

    RouteAction {
        controller,
        action: action.to_string(),
        format,
    }
}

pub async fn instrument_request(State(state): State<WebState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let route = resolve_action(&method, req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    let runtimes = response.extensions().get::<Runtimes>().copied().unwrap_or_default();

    let mut payload = Payload::new()
        .with(
            "params",
            json!({ "controller": route.controller, "action": route.action }),
        )
        .with("method", method.as_str())
        .with("status", response.status().as_u16());
    if let Some(format) = route.format {
        payload = payload.with("format", format);
    }

    let mut event = RequestEvent::new(payload, duration_ms);
    event.view_runtime_ms = runtimes.view_ms;
    event.db_runtime_ms = runtimes.db_ms;

    if let Err(e) = state.bus.publish(&state.event_name, &event) {
        tracing::error!(error = %e, "request instrumentation failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, "instrumentation misconfigured").into_response();
    }

    response
}
