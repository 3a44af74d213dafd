//! Status API
//!
//! Read-only JSON endpoints over the observability facade:
//! - `/health`      — liveness and loop heartbeats
//! - `/api/status`  — full facade snapshot
//! - `/api/buffer`  — buffer operating point
//! - `/api/stats`   — dispatcher and optimizer counters

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::control::ObservabilityFacade;

/// Build the status router.
pub fn router(facade: Arc<ObservabilityFacade>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/api/status", get(get_status))
        .route("/api/buffer", get(get_buffer))
        .route("/api/stats", get(get_stats))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(facade)
}

/// Serve the status API until cancelled.
pub async fn serve(
    addr: &str,
    facade: Arc<ObservabilityFacade>,
    cancel: CancellationToken,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "status API listening");
    axum::serve(listener, router(facade))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn get_health(State(facade): State<Arc<ObservabilityFacade>>) -> Json<serde_json::Value> {
    let snapshot = facade.snapshot();
    let stale = snapshot
        .last_realtime_tick
        .map(|t| (Utc::now() - t).num_seconds() > 10)
        .unwrap_or(true);
    Json(json!({
        "status": if stale { "starting" } else { "ok" },
        "realtime_cycles": snapshot.realtime_cycles,
        "tactical_cycles": snapshot.tactical_cycles,
        "historical_cycles": snapshot.historical_cycles,
    }))
}

async fn get_status(State(facade): State<Arc<ObservabilityFacade>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(facade.snapshot()).unwrap_or_else(|_| json!({})))
}

async fn get_buffer(State(facade): State<Arc<ObservabilityFacade>>) -> Json<serde_json::Value> {
    let snapshot = facade.snapshot();
    Json(json!({
        "level": snapshot.buffer_level,
        "state": snapshot.buffer_state,
        "consumption_rate": snapshot.consumption_rate,
        "required_delivery_rate": snapshot.required_delivery_rate,
        "pallets_to_request": snapshot.pallets_to_request,
        "queue": snapshot.queue,
    }))
}

async fn get_stats(State(facade): State<Arc<ObservabilityFacade>>) -> Json<serde_json::Value> {
    let snapshot = facade.snapshot();
    Json(json!({
        "dispatcher": snapshot.dispatcher,
        "last_optimization": snapshot.last_optimization,
        "tasks_created": snapshot.tasks_created,
        "active_pickers": snapshot.active_pickers,
        "active_forklifts": snapshot.active_forklifts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_starting_before_first_tick() {
        let app = router(Arc::new(ObservabilityFacade::new()));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value["status"], "starting");
    }

    #[tokio::test]
    async fn buffer_endpoint_serves_snapshot_fields() {
        let app = router(Arc::new(ObservabilityFacade::new()));
        let response = app
            .oneshot(Request::builder().uri("/api/buffer").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
