//! HTTP router assembly.
//!
//! | Route | Auth | CORS |
//! |-------|------|------|
//! | `GET /` | no | no |
//! | `GET /_health` | no | no |
//! | `POST /query` | yes | yes |
//! | `POST /streaming-query` | yes | yes |
//!
//! Unknown routes answer `404 {"message": "Not Found", "ok": false}`. Every
//! response carries an `x-request-id`.

use axum::{
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use duckgate_engine::EngineSession;
use serde_json::json;
use std::sync::Arc;

use super::middleware::{auth_middleware, cors_middleware, request_id_middleware};
use super::query_api::{create_query_api_router, QueryApiState};
use crate::config::AuthConfig;

/// Build the full application router.
pub fn build_router(session: Arc<EngineSession>, auth: AuthConfig) -> Router {
    // Layer order: CORS runs first so preflight requests skip authentication.
    let query_router = create_query_api_router(QueryApiState::new(session))
        .layer(from_fn_with_state(Arc::new(auth), auth_middleware))
        .layer(from_fn(cors_middleware));

    Router::new()
        .route("/", get(welcome_handler))
        .route("/_health", get(health_handler))
        .merge(query_router)
        .fallback(not_found_handler)
        .layer(from_fn(request_id_middleware))
}

async fn welcome_handler() -> impl IntoResponse {
    Json(json!({ "message": "Welcome to DuckDB API" }))
}

/// Liveness only: never touches the engine.
async fn health_handler() -> &'static str {
    "OK"
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Not Found", "ok": false })),
    )
}
