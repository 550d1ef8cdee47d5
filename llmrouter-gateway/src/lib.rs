//! # llmrouter-gateway
//!
//! The HTTP surface for the LLM router: OpenAI/Anthropic/Responses-style
//! chat endpoints, bearer/API-key auth, and read-only health/metrics/admin
//! views. The routing engine itself — provider selection, transport
//! adapters, retries, the metrics buffer — lives in `llmrouter-core`; this
//! crate wires it to Axum and owns the config file format.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use llmrouter_gateway::{config::Config, server::create_server};
//!
//! let config = Config::load("gateway.toml")?;
//! let app = create_server(config).await?;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod gateway_error;
pub mod handlers;
pub mod middleware;
pub mod request_context;
pub mod server;

pub use server::create_server;

#[cfg(test)]
mod tests {
    use crate::config::{ApiKeyConfig, AuthConfig, Config, CorsConfig, LogFormat, LoggingConfig, MetricsConfig, ProviderConfig, ProviderModelConfig, RoutingRuntimeConfig, ServerConfig};
    use crate::server::create_server;
    use axum_test::TestServer;
    use llmrouter_core::models::{ApiStyle, Capability, Transport};
    use std::collections::HashMap;
    use std::time::Duration;

    fn test_config() -> Config {
        std::env::set_var("TEST_PROVIDER_KEY", "sk-test-upstream");
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig { enabled: true, allowed_origins: vec!["*".to_string()] },
            },
            auth: AuthConfig {
                api_keys: vec![ApiKeyConfig { key: "sk-client-test".to_string(), name: Some("test-client".to_string()), allowed_providers: None }],
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Pretty },
            routing: RoutingRuntimeConfig {
                upstream_timeout: Duration::from_secs(30),
                provider_failure_threshold: 3,
                provider_failure_cooldown_seconds: 30,
                provider_health_cache_ttl_seconds: 30,
                enable_provider_health_check: false,
                streaming_min_tokens: 1,
                candidate_availability_cache_ttl_seconds: 30,
                default_strategy: "balanced".to_string(),
            },
            metrics: MetricsConfig { flush_interval_seconds: 60, buffer_key_cap: 256, success_sample_rate: 1.0 },
            redis_url: None,
            providers: vec![ProviderConfig {
                provider_id: "test-provider".to_string(),
                base_url: "http://127.0.0.1:9".to_string(),
                transport: Transport::Http,
                api_styles: vec![ApiStyle::OpenAi],
                api_key_env: "TEST_PROVIDER_KEY".to_string(),
                extra_headers: HashMap::new(),
                base_weight: 1.0,
                region: None,
                max_qps: None,
                enabled: true,
            }],
            provider_models: vec![ProviderModelConfig {
                provider_id: "test-provider".to_string(),
                model_id: "gpt-4o".to_string(),
                alias: Some("gpt-4".to_string()),
                disabled: false,
                capabilities: vec![Capability::Chat],
                pricing: None,
            }],
        }
    }

    #[tokio::test]
    async fn health_check_reports_ok() {
        let app = create_server(test_config()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn unauthenticated_chat_request_is_rejected() {
        let app = create_server(test_config()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server
            .post("/v1/chat/completions")
            .json(&serde_json::json!({"model": "gpt-4", "messages": []}))
            .await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_logical_model_returns_not_found() {
        let app = create_server(test_config()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server
            .post("/v1/chat/completions")
            .add_header(axum::http::HeaderName::from_static("authorization"), axum::http::HeaderValue::from_static("Bearer sk-client-test"))
            .json(&serde_json::json!({"model": "does-not-exist", "messages": [{"role": "user", "content": "hi"}]}))
            .await;
        response.assert_status(axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_providers_lists_configured_provider() {
        let app = create_server(test_config()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server
            .get("/admin/providers")
            .add_header(axum::http::HeaderName::from_static("authorization"), axum::http::HeaderValue::from_static("Bearer sk-client-test"))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["providers"][0]["provider_id"], "test-provider");
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_empty_array_with_no_traffic() {
        let app = create_server(test_config()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server
            .get("/metrics")
            .add_header(axum::http::HeaderName::from_static("authorization"), axum::http::HeaderValue::from_static("Bearer sk-client-test"))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert!(body["metrics"].as_array().unwrap().is_empty());
    }
}
