//! reqmetrics demo host
//!
//! - Loads instrumentation options (`REQMETRICS_CONFIG`, defaults otherwise)
//! - Installs the request pipeline on an in-process bus and memory sink
//! - Serves a tiny resource router whose middleware publishes one event per request

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use reqmetrics_core::config::EnvConfig;
use reqmetrics_core::labels::LabelKey;
use reqmetrics_instrument::bus::Notifications;
use reqmetrics_instrument::config::{self, InstrumentConfig};
use reqmetrics_instrument::sink::MemorySink;
use reqmetrics_instrument::web::{build_router, WebState};
use reqmetrics_instrument::Instrumentation;

const SLOW_REQUEST_MS: f64 = 500.0;

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "reqmetrics-demo exited");
        std::process::exit(1);
    }
}

async fn run() -> reqmetrics_core::Result<()> {
    let cfg = match std::env::var("REQMETRICS_CONFIG") {
        Ok(path) => config::load_from_file(&path)?,
        Err(_) => InstrumentConfig::default(),
    };
    let listen: SocketAddr = std::env::var("REQMETRICS_LISTEN")
        .unwrap_or_else(|_| "127.0.0.1:8080".into())
        .parse()
        .map_err(|e| reqmetrics_core::ReqMetricsError::BadConfig(format!("listen addr: {e}")))?;

    let sink = Arc::new(MemorySink::new());
    let bus = Arc::new(Notifications::new());
    let instrumentation = Instrumentation::new(cfg.clone(), sink, Arc::new(EnvConfig));

    instrumentation.on_controller_action(|event, labels| {
        if event.duration_ms >= SLOW_REQUEST_MS {
            tracing::warn!(
                controller = labels.get(LabelKey::Controller).unwrap_or("-"),
                action = labels.get(LabelKey::Action).unwrap_or("-"),
                duration_ms = event.duration_ms,
                "slow request"
            );
        }
        Ok(())
    });
    instrumentation.install(bus.as_ref())?;

    let app = build_router(WebState {
        bus,
        event_name: cfg.event_name.clone(),
    });

    tracing::info!(%listen, "reqmetrics-demo starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| reqmetrics_core::ReqMetricsError::Internal(format!("bind failed: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| reqmetrics_core::ReqMetricsError::Internal(format!("server failed: {e}")))
}
