//! # HTTP Middleware
//!
//! Applied in order: CORS, request logging, authentication. There is no
//! input-validation or plugin middleware layer — content moderation is the
//! core crate's `ModerationHook`, not a regex pass at the edge.

use crate::auth::AuthService;
use crate::config::CorsConfig;
use crate::gateway_error::ApiError;
use crate::request_context::RequestContext;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{self, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

/// Logs method, path, status, and latency for every request, keyed by the
/// request id assigned in [`auth_middleware`] (or `"unknown"` for requests
/// that never reach auth, e.g. a CORS preflight).
pub async fn logging_middleware(State(_state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let request_id = req
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(req).await;
    let latency = start.elapsed();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        latency_ms = latency.as_millis(),
        "request processed"
    );

    response
}

/// Extracts and validates the client's API key, then stashes a
/// [`RequestContext`] (carrying `effective_provider_ids` and the optional
/// `X-Session-Id`) in the request extensions for handlers to read.
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    if req.method() == http::Method::OPTIONS {
        return next.run(req).await;
    }

    let authorization = header_str(&req, "authorization");
    let x_api_key = header_str(&req, "x-api-key");
    let session_id = header_str(&req, "x-session-id").map(|s| s.to_string());

    let api_key = match AuthService::extract_api_key(authorization, x_api_key) {
        Ok(key) => key,
        Err(err) => return ApiError::from(err).into_response(),
    };

    let auth_context = match state.auth.authenticate(&api_key) {
        Ok(ctx) => ctx,
        Err(err) => return ApiError::from(err).into_response(),
    };

    let request_context = RequestContext::with_auth(Some(auth_context.key_name.clone()), Some(api_key))
        .with_session_id(session_id);
    req.extensions_mut().insert(request_context);
    req.extensions_mut().insert(auth_context);

    next.run(req).await
}

fn header_str<'a>(req: &'a Request<Body>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|h| h.to_str().ok())
}

pub fn cors_middleware(cors_config: &CorsConfig) -> CorsLayer {
    if !cors_config.enabled {
        return CorsLayer::new();
    }

    let mut cors = CorsLayer::new();

    if cors_config.allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_origin(Any);
    } else {
        for origin in &cors_config.allowed_origins {
            if let Ok(origin) = origin.parse::<http::header::HeaderValue>() {
                cors = cors.allow_origin(origin);
            }
        }
    }

    cors.allow_methods(Any).allow_headers(Any)
}
