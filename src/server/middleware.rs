//! HTTP middleware: request ids, CORS and authentication.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};

use super::query_api::ErrorResponse;
use crate::config::AuthConfig;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied request id that is reused as-is.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Tag each request with an id and run it inside a span carrying that id.
///
/// A client-supplied `x-request-id` is reused when it is short printable
/// ASCII; otherwise a UUID v4 is generated. The id is echoed on the response.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let header_value = HeaderValue::from_str(&request_id).ok();
    if let Some(ref value) = header_value {
        req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }

    let start = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
    });

    response
}

/// CORS middleware
///
/// Answers preflight requests directly with `204` and adds the
/// `Access-Control-Allow-*` headers to every other response. All origins are
/// allowed.
pub async fn cors_middleware(req: Request<Body>, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    // Handle preflight
    if req.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        add_cors_headers(response.headers_mut(), origin.as_deref());
        return response;
    }

    let mut response = next.run(req).await;
    add_cors_headers(response.headers_mut(), origin.as_deref());
    response
}

/// Add CORS headers to response
fn add_cors_headers(headers: &mut HeaderMap, origin: Option<&str>) {
    let allow_origin = origin
        .and_then(|o| HeaderValue::from_str(o).ok())
        .unwrap_or_else(|| HeaderValue::from_static("*"));

    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type, X-Request-Id"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("X-Request-Id"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    if origin.is_some() {
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    }
}

/// Authentication middleware for the query endpoints.
///
/// Passes every request through when no scheme is configured. Otherwise the
/// `Authorization` header must carry valid Basic credentials or the bearer
/// token; either scheme is accepted when both are configured.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !auth.is_enabled() {
        return next.run(req).await;
    }

    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match authorization {
        Some(value) if is_authorized(&auth, value) => next.run(req).await,
        Some(_) => {
            warn!("Rejected request with invalid credentials");
            unauthorized(&auth)
        }
        None => {
            warn!("Rejected request without credentials");
            unauthorized(&auth)
        }
    }
}

fn is_authorized(auth: &AuthConfig, authorization: &str) -> bool {
    let Some((scheme, credentials)) = authorization.trim().split_once(' ') else {
        return false;
    };
    let credentials = credentials.trim();

    if scheme.eq_ignore_ascii_case("basic") {
        let Some(expected) = &auth.basic else {
            return false;
        };
        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(credentials) else {
            return false;
        };
        let Some(split) = decoded.iter().position(|b| *b == b':') else {
            return false;
        };
        let (username, password) = (&decoded[..split], &decoded[split + 1..]);
        // No short-circuit between the two comparisons.
        let user_ok = constant_time_eq(username, expected.username.as_bytes());
        let pass_ok = constant_time_eq(password, expected.password.as_bytes());
        user_ok & pass_ok
    } else if scheme.eq_ignore_ascii_case("bearer") {
        match &auth.bearer_token {
            Some(token) => constant_time_eq(credentials.as_bytes(), token.as_bytes()),
            None => false,
        }
    } else {
        false
    }
}

fn unauthorized(auth: &AuthConfig) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Unauthorized".to_string(),
        }),
    )
        .into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(auth.challenge()),
    );
    response
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}
