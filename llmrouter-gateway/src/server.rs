//! # HTTP Server
//!
//! Wires the routing engine (catalog, selector, executor, metrics buffer,
//! session manager) from [`crate::config::Config`] into an Axum [`Router`]
//! exposing the client-facing surface: OpenAI/Anthropic/Responses-style
//! chat endpoints, health, metrics, and a read-only admin providers view.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{auth_middleware, cors_middleware, logging_middleware};
use axum::{
    routing::{get, post},
    Router,
};
use llmrouter_core::hooks::{BillingHook, ModerationHook, NoopBillingHook, NoopModerationHook, NoopSessionEventHook, SessionEventHook};
use llmrouter_core::metrics::MetricsBuffer;
use llmrouter_core::routing::{CooldownConfig, LogicalModelCatalog, ProviderSelector, RoutingStateService, SessionManager};
use llmrouter_core::transport::TransportRegistry;
use llmrouter_core::CandidateExecutor;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

/// Shared state reachable from every handler. Cheap to clone — every field
/// is an `Arc`, so each request clones a handful of pointers, not the
/// underlying routing state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<LogicalModelCatalog>,
    pub routing_state: Arc<RoutingStateService>,
    pub sessions: Arc<SessionManager>,
    pub selector: Arc<ProviderSelector>,
    pub executor: Arc<CandidateExecutor>,
    pub metrics_buffer: Arc<MetricsBuffer>,
    pub auth: Arc<crate::auth::AuthService>,
    pub moderation: Arc<dyn ModerationHook>,
    pub billing: Arc<dyn BillingHook>,
    pub session_events: Arc<dyn SessionEventHook>,
}

/// Builds the full routing engine and returns a router ready to serve.
///
/// Connects to Redis once (if `redis_url` is configured) and shares that
/// connection between the routing state service and the session manager;
/// when unset, both run in disconnected mode per §4.3's tolerance
/// contract — reads come back empty, writes are dropped, nothing fails.
pub async fn create_server(config: Config) -> anyhow::Result<Router> {
    let credentials = config.load_provider_credentials()?;
    let logical_models = config.build_logical_models();
    let catalog = Arc::new(LogicalModelCatalog::new(logical_models));

    let cooldown = CooldownConfig {
        threshold: config.routing.provider_failure_threshold,
        cooldown_seconds: config.routing.provider_failure_cooldown_seconds,
    };

    let redis_conn = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            match redis::aio::ConnectionManager::new(client).await {
                Ok(conn) => Some(conn),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to connect to redis; running in disconnected mode");
                    None
                }
            }
        }
        None => None,
    };

    let routing_state = Arc::new(RoutingStateService::new(redis_conn.clone(), cooldown));
    let sessions = Arc::new(SessionManager::new(redis_conn));

    let selector = Arc::new(ProviderSelector::new(
        catalog.clone(),
        routing_state.clone(),
        sessions.clone(),
        Duration::from_secs(config.routing.candidate_availability_cache_ttl_seconds),
    ));

    let metrics_buffer = Arc::new(MetricsBuffer::spawn(
        routing_state.clone(),
        Duration::from_secs(config.metrics.flush_interval_seconds),
        1024,
        config.metrics.buffer_key_cap,
        config.metrics.success_sample_rate,
    ));

    let transports = Arc::new(TransportRegistry::new());
    let executor = Arc::new(CandidateExecutor::new(
        transports,
        routing_state.clone(),
        metrics_buffer.clone(),
        credentials,
    ));

    let provider_ids: Vec<String> = config.providers.iter().map(|p| p.provider_id.clone()).collect();
    let auth = Arc::new(crate::auth::AuthService::new(&config.auth, &provider_ids));

    if config.server.cors.enabled && config.server.cors.allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS is enabled with wildcard origins; restrict allowed_origins in production");
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        catalog,
        routing_state,
        sessions,
        selector,
        executor,
        metrics_buffer,
        auth,
        moderation: Arc::new(NoopModerationHook),
        billing: Arc::new(NoopBillingHook),
        session_events: Arc::new(NoopSessionEventHook),
    };

    let app = Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/messages", post(handlers::messages))
        .route("/v1/responses", post(handlers::responses))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/admin/providers", get(handlers::list_providers))
        .layer(
            ServiceBuilder::new()
                .layer(cors_middleware(&config.server.cors))
                .layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware))
                .layer(axum::middleware::from_fn_with_state(state.clone(), logging_middleware))
                .layer(TimeoutLayer::new(config.routing.upstream_timeout)),
        )
        .with_state(state);

    Ok(app)
}
