//! Ops HTTP API for the loyalty daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Status (reconciler counters and effective configuration)

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use loyalty_engine::{AccrualPort, Reconciler, ReconcilerStats};
use loyalty_store::LedgerStore;

use crate::config::Config;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<A: ?Sized, S: ?Sized> {
    pub reconciler: Arc<Reconciler<A, S>>,
    pub config: Config,
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub environment: String,
    pub store: &'static str,
    pub accrual_base_url: String,
    pub poll_interval_ms: u64,
    pub rate_limit_cooldown_secs: u64,
    pub request_timeout_ms: u64,
    pub reconciler: ReconcilerStats,
}

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<A, S>(state: Arc<ApiState<A, S>>) -> Router
where
    A: AccrualPort + ?Sized + 'static,
    S: LedgerStore + ?Sized + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler::<A, S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Reconciler counters and effective configuration.
async fn status_handler<A, S>(State(state): State<Arc<ApiState<A, S>>>) -> Json<StatusResponse>
where
    A: AccrualPort + ?Sized + 'static,
    S: LedgerStore + ?Sized + 'static,
{
    let config = &state.config;
    Json(StatusResponse {
        environment: config.environment.to_string(),
        store: config.store_backend(),
        accrual_base_url: config.accrual.base_url.clone(),
        poll_interval_ms: config.reconciler.poll_interval.as_millis() as u64,
        rate_limit_cooldown_secs: config.reconciler.rate_limit_cooldown.as_secs(),
        request_timeout_ms: config.accrual.request_timeout.as_millis() as u64,
        reconciler: state.reconciler.stats().await,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use loyalty_engine::ScriptedAccrual;
    use loyalty_store::MemoryStore;
    use tower::ServiceExt;

    fn router() -> Router {
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(ScriptedAccrual::new()),
            Arc::new(MemoryStore::new()),
            Config::test().reconciler,
        ));
        create_router(Arc::new(ApiState {
            reconciler,
            config: Config::test(),
        }))
    }

    async fn get_json(path: &str) -> (StatusCode, serde_json::Value) {
        let response = router()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json("/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_status_reports_config_and_stats() {
        let (status, body) = get_json("/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["environment"], "test");
        assert_eq!(body["store"], "memory");
        assert_eq!(body["poll_interval_ms"], 20);
        assert_eq!(body["reconciler"]["sweeps"], 0);
        assert!(body["reconciler"]["last_sweep_at"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = router()
            .oneshot(Request::builder().uri("/api/user/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
