//! Vertex AI transport modeled on the vendor SDK's synchronous client: the
//! wire shape is the same `generateContent` request/response used by
//! [`super::gemini`], but the call itself runs on a blocking thread via
//! `spawn_blocking` rather than the pooled async `reqwest::Client`, mirroring
//! how a synchronous SDK call is kept off the async executor's worker threads.

use super::{ByteStream, TransportAdapter, UpstreamTarget};
use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse, Choice, Message, Usage};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub struct VertexSdkAdapter;

impl VertexSdkAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VertexSdkAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn blocking_call(target: UpstreamTarget, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| ProviderError::Configuration {
            message: format!("failed to build blocking Vertex client: {e}"),
        })?;

    let contents: Vec<_> = request
        .messages
        .iter()
        .map(|m| {
            json!({
                "role": if matches!(m.role, crate::models::Role::Assistant) { "model" } else { "user" },
                "parts": [{ "text": m.content }],
            })
        })
        .collect();

    let url = format!(
        "{}/v1/projects/-/locations/-/publishers/google/models/{}:generateContent",
        target.endpoint.trim_end_matches('/'),
        target.model_id
    );

    let resp = client
        .post(url)
        .bearer_auth(&target.api_key)
        .json(&json!({ "contents": contents }))
        .send()
        .map_err(super::http_client::classify_reqwest_error)?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().unwrap_or_default();
        return Err(ProviderError::Api {
            code: status,
            message: body,
        });
    }

    let value: serde_json::Value = resp.json().map_err(super::http_client::classify_reqwest_error)?;
    let text = value["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    Ok(ChatResponse {
        id: uuid::Uuid::new_v4().to_string(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp() as u64,
        model: target.model_id.clone(),
        choices: vec![Choice {
            index: 0,
            message: Message::assistant(text),
            finish_reason: None,
            logprobs: None,
        }],
        usage: Some(Usage::default()),
        system_fingerprint: None,
    })
}

#[async_trait]
impl TransportAdapter for VertexSdkAdapter {
    async fn unary(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let target = target.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || blocking_call(target, request))
            .await
            .map_err(|e| ProviderError::Configuration {
                message: format!("vertex blocking task panicked: {e}"),
            })?
    }

    async fn stream(
        &self,
        _target: &UpstreamTarget,
        _request: &ChatRequest,
    ) -> Result<ByteStream, ProviderError> {
        Err(ProviderError::FeatureNotSupported {
            feature: "streaming over the blocking vertex-sdk transport".to_string(),
        })
    }
}
