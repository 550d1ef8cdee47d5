//! # Request Context
//!
//! Per-request state threaded through the Axum middleware stack as an
//! extension: a stable request id for log correlation, the authenticated
//! caller (once [`crate::middleware::auth_middleware`] has run), the
//! optional `X-Session-Id` the selector uses for stickiness, and a small
//! metadata bag handlers can use to attach extra fields to the request's
//! log lines.

use std::time::Instant;
use uuid::Uuid;

/// Created once per request by [`crate::middleware::auth_middleware`] and
/// read by handlers and [`crate::middleware::logging_middleware`] for the
/// rest of the request's lifetime.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request ID for tracing
    pub request_id: String,
    /// User ID if authenticated
    pub user_id: Option<String>,
    /// API key used for authentication
    pub api_key: Option<String>,
    /// `X-Session-Id` header value, if the caller opted into conversation
    /// stickiness for this request.
    pub session_id: Option<String>,
    /// Request start time for latency tracking
    pub start_time: Instant,
    /// Request metadata
    pub metadata: std::collections::HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            user_id: None,
            api_key: None,
            session_id: None,
            start_time: Instant::now(),
            metadata: std::collections::HashMap::new(),
        }
    }

    pub fn with_auth(user_id: Option<String>, api_key: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            user_id,
            api_key,
            session_id: None,
            start_time: Instant::now(),
            metadata: std::collections::HashMap::new(),
        }
    }

    /// Attaches the `X-Session-Id` header value, if present. Builder-style
    /// to match `with_metadata`.
    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn with_metadata(mut self, key: String, value: String) -> Self {
        self.metadata.insert(key, value);
        self
    }

    pub fn get_metadata(&self, key: &str) -> Option<&String> {
        self.metadata.get(key)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
