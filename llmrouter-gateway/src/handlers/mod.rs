//! # HTTP Handlers
//!
//! One dispatch path shared by the three client-facing chat routes — they
//! differ only in which [`ApiStyle`] they ask the selector to filter
//! candidates by. Health, metrics, and the admin providers view are plain
//! read-only reflections of routing state; there is no provider CRUD here.

use crate::auth::AuthContext;
use crate::gateway_error::ApiError;
use crate::request_context::RequestContext;
use crate::server::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use llmrouter_core::hooks::UsageContext;
use llmrouter_core::models::{ApiStyle, ChatRequest, SchedulingStrategy};
use llmrouter_core::routing::SelectionInput;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

pub async fn chat_completions(
    state: State<AppState>,
    auth: Extension<AuthContext>,
    ctx: Extension<RequestContext>,
    headers: HeaderMap,
    request: Json<ChatRequest>,
) -> Result<Response, ApiError> {
    dispatch(state, auth, ctx, headers, request, ApiStyle::OpenAi).await
}

pub async fn messages(
    state: State<AppState>,
    auth: Extension<AuthContext>,
    ctx: Extension<RequestContext>,
    headers: HeaderMap,
    request: Json<ChatRequest>,
) -> Result<Response, ApiError> {
    dispatch(state, auth, ctx, headers, request, ApiStyle::Claude).await
}

pub async fn responses(
    state: State<AppState>,
    auth: Extension<AuthContext>,
    ctx: Extension<RequestContext>,
    headers: HeaderMap,
    request: Json<ChatRequest>,
) -> Result<Response, ApiError> {
    dispatch(state, auth, ctx, headers, request, ApiStyle::Responses).await
}

fn wants_sse(headers: &HeaderMap, request: &ChatRequest) -> bool {
    if request.wants_stream() {
        return true;
    }
    headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Probes set this to force an attempt against a candidate that would
/// otherwise be skipped for sitting in failure cooldown.
fn wants_cooldown_bypass(headers: &HeaderMap) -> bool {
    headers
        .get("x-allow-cooldown-bypass")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

async fn dispatch(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
    api_style: ApiStyle,
) -> Result<Response, ApiError> {
    let logical_model_id = request.model.clone();

    let request_payload = serde_json::to_value(&request).unwrap_or(serde_json::Value::Null);
    let moderation = state.moderation.apply_request(&request_payload).await;
    if let llmrouter_core::hooks::ModerationOutcome::Block { reason } = moderation {
        return Err(llmrouter_core::error::GatewayError::ModerationBlocked { reason }.into());
    }

    let strategy = SchedulingStrategy::by_name(&state.config.routing.default_strategy)
        .unwrap_or(SchedulingStrategy::BALANCED);

    let selection = state
        .selector
        .select(SelectionInput {
            logical_model_id: &logical_model_id,
            api_style,
            effective_provider_ids: &auth.effective_provider_ids,
            session_id: ctx.session_id.as_deref(),
            requires_tool_use: request.requires_tool_use(),
            strategy,
            enable_health_check: state.config.routing.enable_provider_health_check,
            allow_degraded: false,
        })
        .await?;

    let cancel = CancellationToken::new();
    let wants_stream = wants_sse(&headers, &request);
    let allow_cooldown_bypass = wants_cooldown_bypass(&headers);

    if wants_stream {
        let idempotency_key = headers.get("idempotency-key").and_then(|v| v.to_str().ok()).map(String::from);
        state
            .billing
            .record_stream_precharge(
                UsageContext {
                    account_id: auth.key_name.clone(),
                    logical_model: logical_model_id.clone(),
                    provider_id: String::new(),
                    model_id: String::new(),
                },
                &request_payload,
                idempotency_key.as_deref(),
            )
            .await;

        let outcome = state
            .executor
            .try_stream(
                &selection.ordered_candidates,
                &request,
                &logical_model_id,
                &cancel,
                allow_cooldown_bypass,
                |provider_id, model_id| {
                    tracing::debug!(provider_id, model_id, "stream established");
                },
                |provider_id| {
                    tracing::debug!(provider_id, "stream complete");
                },
                |provider_id, retryable| {
                    tracing::debug!(provider_id, retryable, "candidate failed");
                },
            )
            .await?;

        if let Some(session_id) = &ctx.session_id {
            state
                .sessions
                .bind(session_id, &logical_model_id, &outcome.provider_id, &outcome.model_id, now_unix())
                .await;
        }

        let body = axum::body::Body::from_stream(outcome.bytes);
        let response = Response::builder()
            .header("content-type", "text/event-stream")
            .header("cache-control", "no-cache")
            .header("x-selected-provider", outcome.provider_id)
            .body(body)
            .unwrap();
        return Ok(response);
    }

    let outcome = state
        .executor
        .try_unary(
            &selection.ordered_candidates,
            &request,
            &logical_model_id,
            &cancel,
            allow_cooldown_bypass,
            |provider_id, model_id| {
                tracing::debug!(provider_id, model_id, "request succeeded");
            },
            |provider_id, retryable| {
                tracing::debug!(provider_id, retryable, "candidate failed");
            },
        )
        .await?;

    if let Some(session_id) = &ctx.session_id {
        state
            .sessions
            .bind(session_id, &logical_model_id, &outcome.provider_id, &outcome.model_id, now_unix())
            .await;
    }

    let response_payload = serde_json::to_value(&outcome.response).unwrap_or(serde_json::Value::Null);
    let idempotency_key = headers.get("idempotency-key").and_then(|v| v.to_str().ok()).map(String::from);
    state
        .billing
        .record_unary(
            UsageContext {
                account_id: auth.key_name.clone(),
                logical_model: logical_model_id,
                provider_id: outcome.provider_id.clone(),
                model_id: outcome.model_id.clone(),
            },
            &response_payload,
            &request_payload,
            idempotency_key.as_deref(),
        )
        .await;

    Ok((
        [("x-selected-provider", outcome.provider_id.as_str())],
        Json(outcome.response),
    )
        .into_response())
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": now_unix(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Snapshot of the metrics buffer's last flush, per `(logical_model, provider)`
/// pair declared in `provider_models`.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let logical_models = state.config.build_logical_models();
    let mut entries = Vec::new();

    for model in &logical_models {
        for upstream in &model.upstreams {
            if let Some(m) = state
                .routing_state
                .get_routing_metrics(&model.logical_id, &upstream.provider_id)
                .await
            {
                entries.push(json!({
                    "logical_model": model.logical_id,
                    "provider_id": upstream.provider_id,
                    "avg_latency_ms": m.avg_latency_ms,
                    "p95_latency_ms": m.p95_latency_ms,
                    "p99_latency_ms": m.p99_latency_ms,
                    "error_rate": m.error_rate,
                    "status": m.status,
                    "total_samples": m.total_samples,
                }));
            }
        }
    }

    Json(json!({ "metrics": entries }))
}

/// Read-only provider roster: static config plus cached health and the
/// current failure-cooldown counter. No create/update/delete — provider
/// topology only changes by editing the config file and reloading.
pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    let mut entries = Vec::new();
    for provider in &state.config.providers {
        let health = state.routing_state.get_cached_health(&provider.provider_id).await;
        let cooldown = state.routing_state.get_failure_cooldown_status(&provider.provider_id).await;
        entries.push(json!({
            "provider_id": provider.provider_id,
            "base_url": provider.base_url,
            "enabled": provider.enabled,
            "api_styles": provider.api_styles,
            "base_weight": provider.base_weight,
            "region": provider.region,
            "health": health,
            "failure_count": cooldown.count,
            "failure_threshold": cooldown.threshold,
            "in_cooldown": cooldown.should_skip,
        }));
    }

    Json(json!({ "providers": entries }))
}
