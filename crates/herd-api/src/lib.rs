//! herd-api — HTTP surface of the boss node.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/status` | One `{id: state}` map per worker |
//! | GET | `/api/v1/workers` | Combined `{id: state}` map plus counts |
//! | POST | `/api/v1/scale/up` | Add a worker (`?wait=true` awaits readiness) |
//! | POST | `/api/v1/scale/down` | Remove one idle worker |
//! | ANY | `/run`, `/run/{*path}` | Dispatch the request to an idle worker |

pub mod handlers;

use axum::routing::{any, get, post};
use axum::Router;
use herd_pool::WorkerPool;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub pool: WorkerPool,
}

/// Build the complete boss router.
pub fn build_router(pool: WorkerPool) -> Router {
    let state = ApiState { pool };

    let api_routes = Router::new()
        .route("/status", get(handlers::status))
        .route("/workers", get(handlers::workers))
        .route("/scale/up", post(handlers::scale_up))
        .route("/scale/down", post(handlers::scale_down));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/run", any(handlers::run))
        .route("/run/{*path}", any(handlers::run))
        .with_state(state)
}
