//! Axum router wiring for the demo host.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::Path,
    http::StatusCode,
    middleware,
    routing::get,
    Extension, Json, Router,
};
use serde_json::{json, Value};

use crate::bus::Notifications;

use super::timing::{instrument_request, Runtimes};

#[derive(Clone)]
pub struct WebState {
    pub bus: Arc<Notifications>,
    pub event_name: String,
}

pub fn build_router(state: WebState) -> Router {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/:id", get(show_post))
        .layer(middleware::from_fn_with_state(state, instrument_request))
}

async fn fake_query(ms: u64) -> f64 {
    let start = Instant::now();
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    start.elapsed().as_secs_f64() * 1000.0
}

async fn list_posts() -> (Extension<Runtimes>, Json<Value>) {
    let db_ms = fake_query(3).await;
    let runtimes = Runtimes { view_ms: Some(1.0), db_ms: Some(db_ms) };
    (Extension(runtimes), Json(json!([{ "id": 1 }, { "id": 2 }])))
}

async fn show_post(Path(id): Path<String>) -> Result<(Extension<Runtimes>, Json<Value>), StatusCode> {
    let id: u64 = id
        .trim_end_matches(".json")
        .parse()
        .map_err(|_| StatusCode::NOT_FOUND)?;
    let db_ms = fake_query(2).await;
    let runtimes = Runtimes { view_ms: Some(0.5), db_ms: Some(db_ms) };
    Ok((Extension(runtimes), Json(json!({ "id": id }))))
}

async fn create_post() -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(json!({ "id": 3 })))
}
