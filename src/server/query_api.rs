//! Query API endpoints
//!
//! ## Endpoints
//!
//! - `POST /query` - Run a statement and return its rows as a JSON array
//! - `POST /streaming-query` - Run a statement and stream the result as an
//!   Arrow IPC stream
//!
//! Both endpoints take `{"query": "<statement>"}`. Statements blocked by the
//! engine's filter are not errors: they succeed with a single row describing
//! the rejection.
//!
//! ## Errors
//!
//! | Condition | Status | Body |
//! |-----------|--------|------|
//! | malformed JSON, missing, blank or non-string `query` | 400 | `{"error": "..."}` |
//! | engine or initialization failure | 500 | `{"error": "<engine detail>"}` |

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use duckgate_engine::{
    EngineError, EngineSession, QueryExecutor, Row, StreamingExecutor, ARROW_STREAM_CONTENT_TYPE,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Message returned when the request body has no usable `query`.
pub const MISSING_QUERY_MESSAGE: &str = "Missing query property in request body!";

/// Message returned when `query` is present but blank.
pub const EMPTY_QUERY_MESSAGE: &str = "The query property must not be empty";

/// Shared state for the query endpoints.
#[derive(Clone)]
pub struct QueryApiState {
    executor: QueryExecutor,
    streaming: StreamingExecutor,
}

impl QueryApiState {
    pub fn new(session: Arc<EngineSession>) -> Self {
        Self {
            executor: QueryExecutor::new(session.clone()),
            streaming: StreamingExecutor::new(session),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

/// Query API error type.
#[derive(Debug)]
pub enum ApiError {
    /// The request body is unusable.
    BadRequest(String),
    /// The engine failed to initialize or run the statement.
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => {
                debug!(error = %msg, "Rejected query request");
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::Engine(e) => {
                error!(error = %e, retriable = e.is_retriable(), "Query failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Create the query API router.
pub fn create_query_api_router(state: QueryApiState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/streaming-query", post(streaming_query_handler))
        .with_state(state)
}

/// Extract the statement from a `{"query": "..."}` body.
///
/// The body is read as raw bytes so that a missing or wrong content type
/// does not change the outcome.
pub fn parse_query_body(body: &[u8]) -> Result<String, ApiError> {
    let value: JsonValue = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?;

    match value.get("query") {
        None | Some(JsonValue::Null) => Err(ApiError::BadRequest(MISSING_QUERY_MESSAGE.into())),
        Some(JsonValue::String(query)) if query.trim().is_empty() => {
            Err(ApiError::BadRequest(EMPTY_QUERY_MESSAGE.into()))
        }
        Some(JsonValue::String(query)) => Ok(query.clone()),
        Some(_) => Err(ApiError::BadRequest(
            "The query property must be a string".into(),
        )),
    }
}

/// Run a statement and return its rows.
async fn query_handler(
    State(state): State<QueryApiState>,
    body: Bytes,
) -> Result<Json<Vec<Row>>, ApiError> {
    let query = parse_query_body(&body)?;
    let result = state.executor.execute(&query).await?;
    info!(rows = result.len(), "Query executed");
    Ok(Json(result.into_rows()))
}

/// Run a statement and stream the result as Arrow IPC frames.
async fn streaming_query_handler(
    State(state): State<QueryApiState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let query = parse_query_body(&body)?;
    let frames = state.streaming.stream_execute(&query).await?;
    info!("Streaming query started");
    Ok((
        [(header::CONTENT_TYPE, ARROW_STREAM_CONTENT_TYPE)],
        Body::from_stream(frames),
    )
        .into_response())
}
