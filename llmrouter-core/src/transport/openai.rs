//! OpenAI `chat/completions` transport adapter. The gateway's neutral
//! payload is already OpenAI-shaped, so this adapter is close to a
//! pass-through: it substitutes the resolved upstream model id and forwards.

use super::http_client::{byte_stream, map_error_response, AuthStrategy, HttpProviderClient};
use super::{ByteStream, TransportAdapter, UpstreamTarget};
use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use std::time::Duration;

pub struct OpenAiAdapter;

impl OpenAiAdapter {
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

    fn with_resolved_model(&self, target: &UpstreamTarget, request: &ChatRequest) -> ChatRequest {
        let mut req = clone_for_upstream(request);
        req.model = target.model_id.clone();
        req
    }
}

impl Default for OpenAiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Strips fields the upstream doesn't need echoed back (none, today, but kept
/// as the seam every other adapter's equivalent helper uses).
fn clone_for_upstream(request: &ChatRequest) -> ChatRequest {
    ChatRequest {
        model: request.model.clone(),
        messages: request.messages.clone(),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream: request.stream,
        tools: request.tools.clone(),
        tool_choice: request.tool_choice.clone(),
        top_p: request.top_p,
        stop: request.stop.clone(),
        user: request.user.clone(),
    }
}

#[async_trait]
impl TransportAdapter for OpenAiAdapter {
    async fn unary(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let client = self.client(target)?;
        let mut req = self.with_resolved_model(target, request);
        req.stream = Some(false);
        client
            .post_json::<_, ChatResponse>("/chat/completions", &req, None)
            .await
    }

    async fn stream(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ByteStream, ProviderError> {
        let client = self.client(target)?;
        let mut req = self.with_resolved_model(target, request);
        req.stream = Some(true);
        let resp = client.post_raw("/chat/completions", &req, None).await?;
        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(Box::pin(byte_stream(resp)))
    }
}
