//! # Error Handling
//!
//! Two error hierarchies:
//!
//! - [`ProviderError`]: raised by a single transport adapter attempt against one
//!   upstream. Carries enough detail for [`ProviderError::is_retryable`] to classify
//!   the failure.
//! - [`GatewayError`]: raised by the selector and executor once transport-level
//!   detail no longer matters — these are the kinds the HTTP layer maps to a wire
//!   error envelope and status code.

use thiserror::Error;

/// Errors produced by a transport adapter while talking to one upstream.
///
/// # Examples
///
/// ```rust
/// use llmrouter_core::error::ProviderError;
///
/// let err = ProviderError::RateLimit;
/// assert!(err.is_retryable());
/// ```
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {code} - {message}")]
    Api { code: u16, message: String },

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Timeout before response headers were received")]
    Timeout,

    #[error("Connection to upstream failed: {message}")]
    ConnectFailed { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid response format: {message}")]
    InvalidResponse { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Feature not supported by this transport: {feature}")]
    FeatureNotSupported { feature: String },

    /// Connection was interrupted after at least one byte of a streamed
    /// response had already been forwarded to the client. This is never
    /// retryable — the caller may not have idempotent partial output.
    #[error("Stream disconnected mid-response after {bytes_sent} bytes")]
    MidStreamDisconnect { bytes_sent: usize },
}

impl ProviderError {
    /// Classifies whether the executor should try the next candidate.
    ///
    /// Mirrors the wire-level table: transport/connect failures, timeouts before
    /// any bytes, 5xx and 429 are retryable; other 4xx are not; a mid-stream
    /// disconnect is never retryable because output has already been observed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(_) => true,
            ProviderError::ConnectFailed { .. } => true,
            ProviderError::Timeout => true,
            ProviderError::RateLimit => true,
            ProviderError::ServiceUnavailable => true,
            ProviderError::Api { code, .. } => *code >= 500,
            ProviderError::MidStreamDisconnect { .. } => false,
            ProviderError::InvalidApiKey
            | ProviderError::ModelNotFound { .. }
            | ProviderError::Serialization(_)
            | ProviderError::InvalidResponse { .. }
            | ProviderError::Configuration { .. }
            | ProviderError::FeatureNotSupported { .. } => false,
        }
    }

    /// True only for the case the executor must never retry under any
    /// circumstance, even as the last remaining candidate.
    pub fn is_fatal_mid_stream(&self) -> bool {
        matches!(self, ProviderError::MidStreamDisconnect { .. })
    }
}

/// Errors surfaced by the routing engine (selector, executor, session manager)
/// to the HTTP layer. Each variant maps to exactly one wire status code.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("logical model not found: {logical_model}")]
    LogicalModelNotFound { logical_model: String },

    #[error("logical model disabled: {logical_model}")]
    LogicalModelDisabled { logical_model: String },

    #[error("no authorized provider for logical model: {logical_model}")]
    NoAuthorizedProvider { logical_model: String },

    #[error("no upstream available for logical model: {logical_model}")]
    NoUpstreamAvailable { logical_model: String },

    #[error("all {attempted} candidate(s) failed ({skipped} skipped due to cooldown/health): {last_message}")]
    UpstreamAllFailed {
        attempted: usize,
        skipped: usize,
        last_status: Option<u16>,
        last_message: String,
    },

    #[error("stream disconnected after {bytes_sent} bytes; cannot retry")]
    MidStreamDisconnect { bytes_sent: usize },

    #[error("request blocked by content policy: {reason}")]
    ModerationBlocked { reason: String },

    #[error("account is not usable for billing: {reason}")]
    AccountUnusable { reason: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("authentication failed: {message}")]
    Authentication { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("request canceled by caller")]
    Canceled,
}

impl GatewayError {
    /// HTTP status code this error kind maps to. Kept next to the enum
    /// instead of in the gateway crate so the mapping can't drift between the
    /// two crates' copies of the error kind list.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::LogicalModelNotFound { .. } => 404,
            GatewayError::LogicalModelDisabled { .. } => 503,
            GatewayError::NoAuthorizedProvider { .. } => 403,
            GatewayError::NoUpstreamAvailable { .. } => 503,
            GatewayError::UpstreamAllFailed { .. } => 502,
            GatewayError::MidStreamDisconnect { .. } => 502,
            GatewayError::ModerationBlocked { .. } => 400,
            GatewayError::AccountUnusable { .. } => 402,
            GatewayError::InvalidRequest { .. } => 400,
            GatewayError::Authentication { .. } => 401,
            GatewayError::Configuration { .. } => 500,
            GatewayError::Canceled => 499,
        }
    }

    /// Short machine-readable code for the wire error envelope's `code` field.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::LogicalModelNotFound { .. } => "logical_model_not_found",
            GatewayError::LogicalModelDisabled { .. } => "logical_model_disabled",
            GatewayError::NoAuthorizedProvider { .. } => "no_authorized_provider",
            GatewayError::NoUpstreamAvailable { .. } => "no_upstream_available",
            GatewayError::UpstreamAllFailed { .. } => "upstream_all_failed",
            GatewayError::MidStreamDisconnect { .. } => "mid_stream_disconnect",
            GatewayError::ModerationBlocked { .. } => "content_blocked",
            GatewayError::AccountUnusable { .. } => "account_unusable",
            GatewayError::InvalidRequest { .. } => "invalid_request",
            GatewayError::Authentication { .. } => "authentication_failed",
            GatewayError::Configuration { .. } => "configuration_error",
            GatewayError::Canceled => "canceled",
        }
    }
}
