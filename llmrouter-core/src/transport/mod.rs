//! # Transport Adapters
//!
//! Each [`crate::models::ApiStyle`] has one [`TransportAdapter`] implementation
//! that converts the gateway's neutral [`ChatRequest`]/[`ChatResponse`] to and
//! from that upstream's wire format. Adapters are registered by style in a
//! [`TransportRegistry`] rather than reached through inheritance, so the
//! executor never needs to know which concrete vendor it is talking to.

pub mod claude;
pub mod claude_cli;
pub mod gemini;
pub mod http_client;
pub mod openai;
pub mod responses;
pub mod vertex_sdk;

use crate::error::ProviderError;
use crate::models::{ApiStyle, ChatRequest, ChatResponse};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

/// Connection details for one upstream endpoint, resolved from
/// [`crate::models::PhysicalModel`] plus provider-level config (auth,
/// extra headers) that doesn't belong on the routing data model.
#[derive(Clone, Debug)]
pub struct UpstreamTarget {
    pub endpoint: String,
    pub model_id: String,
    pub api_key: String,
    pub extra_headers: HashMap<String, String>,
}

#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Issues a non-streaming request and returns the parsed neutral response.
    async fn unary(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError>;

    /// Issues a streaming request. Returns the raw upstream SSE bytes;
    /// the executor relays them to the client largely unchanged (content
    /// moderation aside), so adapters are not required to decode each chunk.
    async fn stream(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ByteStream, ProviderError>;
}

/// Maps [`ApiStyle`] to the adapter that implements it. Built once at
/// startup and shared behind an `Arc` by the executor.
pub struct TransportRegistry {
    adapters: HashMap<ApiStyle, Arc<dyn TransportAdapter>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        let mut adapters: HashMap<ApiStyle, Arc<dyn TransportAdapter>> = HashMap::new();
        adapters.insert(ApiStyle::OpenAi, Arc::new(openai::OpenAiAdapter::new()));
        adapters.insert(ApiStyle::Claude, Arc::new(claude::ClaudeAdapter::new()));
        adapters.insert(
            ApiStyle::ClaudeCli,
            Arc::new(claude_cli::ClaudeCliAdapter::new(claude::ClaudeAdapter::new())),
        );
        adapters.insert(ApiStyle::Responses, Arc::new(responses::ResponsesAdapter::new()));
        adapters.insert(ApiStyle::Gemini, Arc::new(gemini::GeminiAdapter::new()));
        adapters.insert(ApiStyle::VertexSdk, Arc::new(vertex_sdk::VertexSdkAdapter::new()));
        Self { adapters }
    }

    /// Builds a registry from an explicit adapter map, bypassing the default
    /// vendor set. Used by tests to substitute fakes for specific styles.
    pub fn from_adapters(adapters: HashMap<ApiStyle, Arc<dyn TransportAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn get(&self, style: ApiStyle) -> Option<Arc<dyn TransportAdapter>> {
        self.adapters.get(&style).cloned()
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}
