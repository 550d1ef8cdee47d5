//! Anthropic `/v1/messages` transport adapter. Unlike OpenAI's flat-string
//! content, Anthropic requires `messages[].content` as an array of typed
//! parts and a top-level `system` array — this adapter is responsible for
//! folding the neutral flat-string payload into that shape.

use super::http_client::{byte_stream, map_error_response, AuthStrategy, HttpProviderClient};
use super::{ByteStream, TransportAdapter, UpstreamTarget};
use crate::error::ProviderError;
use crate::models::{ChatResponse, Choice, Message, Role, Usage};
use crate::models::ChatRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct ClaudeAdapter;

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn client(
        &self,
        target: &UpstreamTarget,
    ) -> Result<HttpProviderClient, ProviderError> {
        let mut headers = target.extra_headers.clone();
        headers
            .entry("anthropic-version".to_string())
            .or_insert_with(|| "2023-06-01".to_string());
        HttpProviderClient::new(
            Duration::from_secs(60),
            target.endpoint.clone(),
            &headers,
            AuthStrategy::Header {
                name: "x-api-key".to_string(),
                value: target.api_key.clone(),
            },
        )
    }

    pub(crate) fn build_request(&self, target: &UpstreamTarget, request: &ChatRequest) -> AnthropicRequest {
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();
        for msg in &request.messages {
            match msg.role {
                Role::System => system_parts.push(SystemPart {
                    part_type: "text",
                    text: msg.content.clone(),
                }),
                Role::User | Role::Assistant => messages.push(AnthropicMessage {
                    role: role_str(msg.role).to_string(),
                    content: vec![ContentPart {
                        part_type: "text",
                        text: msg.content.clone(),
                    }],
                }),
                Role::Tool => {}
            }
        }

        AnthropicRequest {
            model: target.model_id.clone(),
            max_tokens: request.max_tokens.unwrap_or(4096),
            messages,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts)
            },
            temperature: request.temperature,
            stream: None,
            metadata: None,
        }
    }
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System | Role::Tool => "user",
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Vec<SystemPart>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AnthropicMetadata>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicMetadata {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SystemPart {
    #[serde(rename = "type")]
    pub part_type: &'static str,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: &'static str,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicResponse {
    id: String,
    content: Vec<AnthropicResponseContent>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponseContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

pub(crate) fn response_from_anthropic(resp: AnthropicResponse) -> ChatResponse {
    let text = resp
        .content
        .into_iter()
        .map(|c| c.text)
        .collect::<Vec<_>>()
        .join("");
    ChatResponse {
        id: resp.id,
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp() as u64,
        model: resp.model,
        choices: vec![Choice {
            index: 0,
            message: Message::assistant(text),
            finish_reason: resp.stop_reason,
            logprobs: None,
        }],
        usage: Some(Usage {
            prompt_tokens: resp.usage.input_tokens,
            completion_tokens: resp.usage.output_tokens,
            total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
        }),
        system_fingerprint: None,
    }
}

#[async_trait]
impl TransportAdapter for ClaudeAdapter {
    async fn unary(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let client = self.client(target)?;
        let body = self.build_request(target, request);
        let resp: AnthropicResponse = client.post_json("/v1/messages", &body, None).await?;
        Ok(response_from_anthropic(resp))
    }

    async fn stream(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ByteStream, ProviderError> {
        let client = self.client(target)?;
        let mut body = self.build_request(target, request);
        body.stream = Some(true);
        let resp = client.post_raw("/v1/messages", &body, None).await?;
        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(Box::pin(byte_stream(resp)))
    }
}
