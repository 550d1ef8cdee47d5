//! OpenAI `/v1/responses` transport adapter. Wire shape differs from
//! `chat/completions`: input is a flat `input` array of role/content pairs
//! and the reply carries `output[].content[].text` instead of `choices`.

use super::http_client::{byte_stream, map_error_response, AuthStrategy, HttpProviderClient};
use super::{ByteStream, TransportAdapter, UpstreamTarget};
use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse, Choice, Message, Role, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct ResponsesAdapter;

impl ResponsesAdapter {
    pub fn new() -> Self {
        Self
    }

    fn client(&self, target: &UpstreamTarget) -> Result<HttpProviderClient, ProviderError> {
        HttpProviderClient::new(
            Duration::from_secs(60),
            target.endpoint.clone(),
            &target.extra_headers,
            AuthStrategy::Bearer {
                token: target.api_key.clone(),
            },
        )
    }

    fn build_request(&self, target: &UpstreamTarget, request: &ChatRequest) -> ResponsesRequest {
        ResponsesRequest {
            model: target.model_id.clone(),
            input: request
                .messages
                .iter()
                .map(|m| InputItem {
                    role: role_str(m.role).to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            stream: None,
        }
    }
}

impl Default for ResponsesAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct InputItem {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    id: String,
    model: String,
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    #[serde(rename = "input_tokens", default)]
    input_tokens: u32,
    #[serde(rename = "output_tokens", default)]
    output_tokens: u32,
}

fn to_chat_response(resp: ResponsesResponse) -> ChatResponse {
    let text = resp
        .output
        .into_iter()
        .flat_map(|o| o.content.into_iter().map(|c| c.text))
        .collect::<String>();
    let usage = resp.usage.map(|u| Usage {
        prompt_tokens: u.input_tokens,
        completion_tokens: u.output_tokens,
        total_tokens: u.input_tokens + u.output_tokens,
    });

    ChatResponse {
        id: resp.id,
        object: "response".to_string(),
        created: chrono::Utc::now().timestamp() as u64,
        model: resp.model,
        choices: vec![Choice {
            index: 0,
            message: Message::assistant(text),
            finish_reason: None,
            logprobs: None,
        }],
        usage,
        system_fingerprint: None,
    }
}

#[async_trait]
impl TransportAdapter for ResponsesAdapter {
    async fn unary(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let client = self.client(target)?;
        let body = self.build_request(target, request);
        let resp: ResponsesResponse = client.post_json("/v1/responses", &body, None).await?;
        Ok(to_chat_response(resp))
    }

    async fn stream(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ByteStream, ProviderError> {
        let client = self.client(target)?;
        let mut body = self.build_request(target, request);
        body.stream = Some(true);
        let resp = client.post_raw("/v1/responses", &body, None).await?;
        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(Box::pin(byte_stream(resp)))
    }
}
