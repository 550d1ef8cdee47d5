use criterion::{black_box, criterion_group, criterion_main, Criterion};
use llmrouter_core::models::{ApiStyle, Capability, ChatRequest, LogicalModel, Message, PhysicalModel, Transport};
use llmrouter_core::routing::{CooldownConfig, LogicalModelCatalog, ProviderSelector, RoutingStateService, SelectionInput, SessionManager};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn sample_logical_model() -> LogicalModel {
    LogicalModel {
        logical_id: "gpt-4".to_string(),
        capabilities: HashSet::from([Capability::Chat]),
        enabled: true,
        upstreams: vec![
            PhysicalModel {
                provider_id: "openai".to_string(),
                model_id: "gpt-4o".to_string(),
                endpoint: "https://api.openai.com/v1".to_string(),
                base_weight: 1.0,
                region: None,
                max_qps: None,
                api_style: ApiStyle::OpenAi,
                transport: Transport::Http,
                capabilities: HashSet::from([Capability::Chat]),
                enabled: true,
            },
            PhysicalModel {
                provider_id: "azure-openai".to_string(),
                model_id: "gpt-4o".to_string(),
                endpoint: "https://contoso.openai.azure.com".to_string(),
                base_weight: 0.8,
                region: None,
                max_qps: None,
                api_style: ApiStyle::OpenAi,
                transport: Transport::Http,
                capabilities: HashSet::from([Capability::Chat]),
                enabled: true,
            },
        ],
    }
}

fn bench_message_creation(c: &mut Criterion) {
    c.bench_function("message_creation", |b| {
        b.iter(|| {
            let _user_msg = Message::user("Hello, world!");
            let _assistant_msg = Message::assistant("Hi there!");
            let _system_msg = Message::system("You are a helpful assistant.");
        });
    });
}

fn bench_request_serialization(c: &mut Criterion) {
    let request = ChatRequest {
        model: "gpt-4".to_string(),
        messages: vec![
            Message::system("You are a helpful assistant."),
            Message::user("Hello, how are you?"),
        ],
        temperature: Some(0.7),
        max_tokens: Some(100),
        stream: Some(false),
        ..Default::default()
    };

    c.bench_function("request_serialization", |b| {
        b.iter(|| {
            let _json = serde_json::to_string(black_box(&request));
        });
    });

    c.bench_function("request_deserialization", |b| {
        let json = serde_json::to_string(&request).unwrap();
        b.iter(|| {
            let _request: ChatRequest = serde_json::from_str(black_box(&json)).unwrap();
        });
    });
}

fn bench_candidate_selection(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let catalog = Arc::new(LogicalModelCatalog::new(vec![sample_logical_model()]));
    let routing_state = Arc::new(RoutingStateService::disconnected(CooldownConfig::default()));
    let sessions = Arc::new(SessionManager::new(None));
    let selector = ProviderSelector::new(catalog, routing_state, sessions, Duration::from_secs(30));

    let effective_provider_ids: HashSet<String> =
        HashSet::from(["openai".to_string(), "azure-openai".to_string()]);

    c.bench_function("provider_selection", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let result = selector
                    .select(SelectionInput {
                        logical_model_id: "gpt-4",
                        api_style: ApiStyle::OpenAi,
                        effective_provider_ids: &effective_provider_ids,
                        session_id: None,
                        requires_tool_use: false,
                        strategy: llmrouter_core::models::SchedulingStrategy::BALANCED,
                        enable_health_check: false,
                        allow_degraded: true,
                    })
                    .await;
                black_box(result).unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_message_creation,
    bench_request_serialization,
    bench_candidate_selection
);
criterion_main!(benches);
