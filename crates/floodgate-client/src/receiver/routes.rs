//! Webhook receiver routes.
//!
//! `POST /webhook` is the delivery endpoint subscribed on behalf of
//! delegated jobs. Verification runs on the raw body before anything is
//! parsed or stored, and fails closed when a signing secret is configured.
//! The query surface (`/webhooks`, `/webhooks/{job_id}`, `/webhooks/reset`)
//! exposes the stored results for polling-style consumers.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use floodgate_core::signature::{
    DEFAULT_TOLERANCE_SECS, MatchedSecret, SignatureFailure, verify_with_rotation,
};
use floodgate_types::webhook::WebhookDelivery;

use super::state::ReceiverState;

/// Header carrying the `t=...,v1=...` delivery signature.
pub const SIGNATURE_HEADER: &str = "x-floodgate-signature";

pub fn build_router(state: Arc<ReceiverState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/webhooks", get(list_results))
        .route("/webhooks/reset", post(reset_results))
        .route("/webhooks/{job_id}", get(get_result))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum AppError {
    Verification(SignatureFailure),
    Malformed(String),
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Verification(failure) => (
                StatusCode::UNAUTHORIZED,
                "SIGNATURE_INVALID",
                failure.to_string(),
            ),
            AppError::Malformed(detail) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_DELIVERY", detail)
            }
            AppError::NotFound(job_id) => (
                StatusCode::NOT_FOUND,
                "RESULT_NOT_FOUND",
                format!("no result stored for job {job_id}"),
            ),
        };
        let body = json!({"error": {"code": code, "message": message}});
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /webhook - accept a delivery from the remote execution service.
async fn receive_webhook(
    State(state): State<Arc<ReceiverState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(secret) = &state.signing_secret {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        let matched = verify_with_rotation(
            &body,
            header,
            secret,
            state.secondary_secret.as_deref(),
            DEFAULT_TOLERANCE_SECS,
        )
        .map_err(AppError::Verification)?;
        if matched == MatchedSecret::Secondary {
            tracing::warn!("delivery verified with the secondary secret, rotation in progress");
        }
    }

    let delivery: WebhookDelivery =
        serde_json::from_slice(&body).map_err(|err| AppError::Malformed(err.to_string()))?;
    let payload: serde_json::Value =
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);

    let job_id = delivery.job_id.clone();
    let status = delivery.status;
    tracing::info!(job_id = %job_id, ?status, "webhook delivery received");
    state.store(delivery);

    // The emit itself runs inline: the lookup is one map removal and a
    // registered continuation only queues its execution, so an accepted
    // delivery always consumes its entry even when the pool is saturated.
    if !state.events.emit(&job_id, status, payload.clone()) {
        tracing::debug!(job_id = %job_id, "no continuation registered for delivery");
    }

    // The user callback is arbitrary code and stays off the response path.
    if let Some(callback) = &state.callback {
        let callback = Arc::clone(callback);
        let callback_id = job_id.clone();
        let accepted = state
            .pool
            .dispatch(async move { callback(callback_id, payload) });
        if !accepted {
            tracing::warn!(job_id = %job_id, "callback queue full, delivery hook skipped");
        }
    }

    Ok(Json(json!({"status": "received", "job_id": job_id})))
}

/// GET /webhooks/{job_id} - one stored result.
async fn get_result(
    State(state): State<Arc<ReceiverState>>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    match state.get(&job_id) {
        Some(record) => Ok(Json(json!(record))),
        None => Err(AppError::NotFound(job_id)),
    }
}

/// GET /webhooks - every stored result, keyed by job id.
async fn list_results(State(state): State<Arc<ReceiverState>>) -> Json<serde_json::Value> {
    let results = state.all();
    Json(json!({"count": results.len(), "results": results}))
}

/// POST /webhooks/reset - drop all stored results.
async fn reset_results(State(state): State<Arc<ReceiverState>>) -> Json<serde_json::Value> {
    state.reset();
    tracing::info!("stored webhook results cleared");
    Json(json!({"status": "reset"}))
}

/// GET /health - liveness plus queue visibility.
async fn health(State(state): State<Arc<ReceiverState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "results": state.result_count(),
        "pending_events": state.events.pending_count(),
    }))
}
