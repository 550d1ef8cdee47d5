//! # Wire error envelope
//!
//! [`llmrouter_core::error::GatewayError`] is the single source of truth for
//! error kind → HTTP status mapping (`status_code()`/`code()`); this module
//! only adds the `axum::response::IntoResponse` impl and the JSON shape
//! clients see: `{"error": true, "message": ..., "code": ..., "details": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use llmrouter_core::error::GatewayError;
use serde_json::json;

/// Newtype so this crate can implement a foreign trait (`IntoResponse`) on a
/// foreign type (`GatewayError`) without running afoul of the orphan rule.
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let details = match &self.0 {
            GatewayError::UpstreamAllFailed { attempted, skipped, .. } => {
                Some(json!({ "attempted": attempted, "skipped": skipped }))
            }
            _ => None,
        };
        let body = json!({
            "error": true,
            "message": self.0.to_string(),
            "code": self.0.code(),
            "details": details,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_model_not_found_maps_to_404() {
        let err = ApiError(GatewayError::LogicalModelNotFound {
            logical_model: "gpt-5".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn upstream_all_failed_carries_attempted_and_skipped() {
        let err = ApiError(GatewayError::UpstreamAllFailed {
            attempted: 2,
            skipped: 1,
            last_status: Some(502),
            last_message: "boom".to_string(),
        });
        assert_eq!(err.0.status_code(), 502);
    }
}
