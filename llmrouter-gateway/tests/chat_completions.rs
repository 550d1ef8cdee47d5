//! End-to-end happy path: a real Axum router, an authenticated client, and a
//! wiremock stand-in for the upstream provider.

use axum_test::TestServer;
use llmrouter_gateway::config::{
    ApiKeyConfig, AuthConfig, Config, CorsConfig, LogFormat, LoggingConfig, MetricsConfig,
    ProviderConfig, ProviderModelConfig, RoutingRuntimeConfig, ServerConfig,
};
use llmrouter_gateway::server::create_server;
use llmrouter_core::models::{ApiStyle, Capability, Transport};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(base_url: String) -> Config {
    std::env::set_var("WIREMOCK_PROVIDER_KEY", "sk-upstream-test");
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors: CorsConfig { enabled: true, allowed_origins: vec!["*".to_string()] },
        },
        auth: AuthConfig {
            api_keys: vec![ApiKeyConfig {
                key: "sk-client-test".to_string(),
                name: Some("integration-test".to_string()),
                allowed_providers: None,
            }],
        },
        logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Pretty },
        routing: RoutingRuntimeConfig {
            upstream_timeout: Duration::from_secs(5),
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
            provider_id: "wiremock-provider".to_string(),
            base_url,
            transport: Transport::Http,
            api_styles: vec![ApiStyle::OpenAi],
            api_key_env: "WIREMOCK_PROVIDER_KEY".to_string(),
            extra_headers: HashMap::new(),
            base_weight: 1.0,
            region: None,
            max_qps: None,
            enabled: true,
        }],
        provider_models: vec![ProviderModelConfig {
            provider_id: "wiremock-provider".to_string(),
            model_id: "gpt-4o-mini".to_string(),
            alias: Some("gpt-4".to_string()),
            disabled: false,
            capabilities: vec![Capability::Chat],
            pricing: None,
        }],
    }
}

#[tokio::test]
async fn chat_completion_round_trips_through_selected_provider() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-test-1",
            "object": "chat.completion",
            "created": 1_700_000_000u64,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello from upstream"},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8},
        })))
        .mount(&mock_server)
        .await;

    let app = create_server(config_for(mock_server.uri())).await.unwrap();
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/v1/chat/completions")
        .add_header(
            axum::http::HeaderName::from_static("authorization"),
            axum::http::HeaderValue::from_static("Bearer sk-client-test"),
        )
        .json(&json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .await;

    response.assert_status_ok();
    let selected_provider = response
        .headers()
        .get("x-selected-provider")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert_eq!(selected_provider, "wiremock-provider");
    let body: serde_json::Value = response.json();
    assert_eq!(body["choices"][0]["message"]["content"], "hello from upstream");
}

#[tokio::test]
async fn all_candidates_failing_returns_bad_gateway() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let app = create_server(config_for(mock_server.uri())).await.unwrap();
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/v1/chat/completions")
        .add_header(
            axum::http::HeaderName::from_static("authorization"),
            axum::http::HeaderValue::from_static("Bearer sk-client-test"),
        )
        .json(&json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "upstream_all_failed");
}
