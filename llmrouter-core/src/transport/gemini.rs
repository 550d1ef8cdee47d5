//! Gemini / Vertex AI `generateContent` transport adapter. Converts the
//! neutral message list into `contents[{role, parts:[{text}]}]`, folding
//! system messages into a single `systemInstruction`.

use super::http_client::{byte_stream, map_error_response, AuthStrategy, HttpProviderClient};
use super::{ByteStream, TransportAdapter, UpstreamTarget};
use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse, Choice, Message, Role, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct GeminiAdapter;

impl GeminiAdapter {
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

    fn path(&self, target: &UpstreamTarget, stream: bool) -> String {
        let method = if stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        format!("/v1beta/models/{}:{}", target.model_id, method)
    }

    fn build_request(&self, request: &ChatRequest) -> GenerateContentRequest {
        let mut system_instruction = None;
        let mut contents = Vec::new();
        for msg in &request.messages {
            match msg.role {
                Role::System => {
                    system_instruction = Some(SystemInstruction {
                        parts: vec![Part {
                            text: msg.content.clone(),
                        }],
                    });
                }
                Role::User | Role::Tool => contents.push(Content {
                    role: "user".to_string(),
                    parts: vec![Part {
                        text: msg.content.clone(),
                    }],
                }),
                Role::Assistant => contents.push(Content {
                    role: "model".to_string(),
                    parts: vec![Part {
                        text: msg.content.clone(),
                    }],
                }),
            }
        }

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
    #[serde(default)]
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

fn to_chat_response(model: &str, resp: GenerateContentResponse) -> ChatResponse {
    let first = resp.candidates.into_iter().next();
    let (text, finish_reason) = match first {
        Some(c) => (
            c.content.parts.into_iter().map(|p| p.text).collect::<String>(),
            c.finish_reason,
        ),
        None => (String::new(), None),
    };
    let usage = resp.usage_metadata.map(|u| Usage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
        total_tokens: u.prompt_token_count + u.candidates_token_count,
    });

    ChatResponse {
        id: uuid::Uuid::new_v4().to_string(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp() as u64,
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: Message::assistant(text),
            finish_reason,
            logprobs: None,
        }],
        usage,
        system_fingerprint: None,
    }
}

#[async_trait]
impl TransportAdapter for GeminiAdapter {
    async fn unary(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let client = self.client(target)?;
        let body = self.build_request(request);
        let resp: GenerateContentResponse = client
            .post_json(&self.path(target, false), &body, None)
            .await?;
        Ok(to_chat_response(&target.model_id, resp))
    }

    async fn stream(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ByteStream, ProviderError> {
        let client = self.client(target)?;
        let body = self.build_request(request);
        let resp = client
            .post_raw(&self.path(target, true), &body, None)
            .await?;
        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(Box::pin(byte_stream(resp)))
    }
}
