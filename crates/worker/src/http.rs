//! Health and metrics listener

use axum::{extract::State, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct HttpState {
    worker: &'static str,
    metrics: PrometheusHandle,
}

/// Serve `/health` and `/metrics` for this worker process. Failures are
/// logged, never fatal: the worker keeps serving rooms without them.
pub async fn serve(port: u16, worker: &'static str, metrics: PrometheusHandle) {
    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(HttpState { worker, metrics });

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::warn!(error = %e, port, "health listener bind failed");
            return;
        }
    };
    tracing::info!(port, "health/metrics listener up");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::warn!(error = %e, "health listener exited");
    }
}

async fn health(State(state): State<HttpState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "worker": state.worker,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn render_metrics(State(state): State<HttpState>) -> String {
    state.metrics.render()
}
