//! Route handlers.
//!
//! Management routes answer with the JSON envelope; `/run` passes the
//! worker's response through untouched and reports failures as plain text.

use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use herd_pool::{PlatformError, PoolError};
use tracing::{info, warn};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

/// HTTP status reported for a pool failure.
pub fn error_status(err: &PoolError) -> StatusCode {
    match err {
        PoolError::CapacityExceeded { .. } => StatusCode::CONFLICT,
        PoolError::Platform(PlatformError::Exhausted) => StatusCode::CONFLICT,
        PoolError::Closed | PoolError::AcquireTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        PoolError::ProvisioningFailed { .. } => StatusCode::BAD_GATEWAY,
        PoolError::Platform(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PoolError::Proxy(e) => e.status(),
    }
}

// ── Status ─────────────────────────────────────────────────────

/// GET /api/v1/status
///
/// A list of single-entry `{worker-id: state}` maps.
pub async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.pool.status())
}

/// GET /api/v1/workers
pub async fn workers(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({
        "workers": state.pool.workers(),
        "summary": state.pool.summary(),
    }))
}

// ── Scaling ────────────────────────────────────────────────────

#[derive(Debug, Default, serde::Deserialize)]
pub struct ScaleUpParams {
    /// Wait for the new worker to finish provisioning.
    #[serde(default)]
    pub wait: bool,
}

/// POST /api/v1/scale/up
///
/// `202 Accepted` once the worker is registered, or `201 Created` after it
/// is ready when `?wait=true`.
pub async fn scale_up(
    State(state): State<ApiState>,
    Query(params): Query<ScaleUpParams>,
) -> Response {
    let handle = match state.pool.scale_up() {
        Ok(handle) => handle,
        Err(e) => return error_response(&e.to_string(), error_status(&e)),
    };
    let id = handle.id().clone();
    info!(worker = %id, wait = params.wait, "scale-up requested");

    if !params.wait {
        return (
            StatusCode::ACCEPTED,
            ApiResponse::ok(serde_json::json!({ "worker": id, "state": "provisioning" })),
        )
            .into_response();
    }

    match handle.ready().await {
        Ok(id) => (
            StatusCode::CREATED,
            ApiResponse::ok(serde_json::json!({ "worker": id, "state": "idle" })),
        )
            .into_response(),
        Err(e) => error_response(&e.to_string(), error_status(&e)),
    }
}

/// POST /api/v1/scale/down
pub async fn scale_down(State(state): State<ApiState>) -> Response {
    match state.pool.scale_down().await {
        Ok(id) => ApiResponse::ok(serde_json::json!({ "worker": id })).into_response(),
        Err(e) => error_response(&e.to_string(), error_status(&e)),
    }
}

// ── Dispatch ───────────────────────────────────────────────────

/// ANY /run, /run/{*path}
pub async fn run(State(state): State<ApiState>, req: Request) -> Response {
    let req = req.map(herd_proxy::boxed);
    match state.pool.dispatch(req).await {
        Ok(resp) => resp.map(Body::new),
        Err(e) => {
            let status = error_status(&e);
            warn!(%status, error = %e, "dispatch failed");
            (status, e.to_string()).into_response()
        }
    }
}
