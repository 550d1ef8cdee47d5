//! Decorator over [`ClaudeAdapter`] that masquerades as the official Claude
//! CLI: a fixed `User-Agent` and a synthesized `metadata.user_id` of the form
//! `user_{sha256(api_key)}_account__session_{uuid}`.
//!
//! This is a wire-format decoration only — the underlying request/response
//! shape is identical to [`super::claude::ClaudeAdapter`].

use super::claude::{AnthropicMetadata, ClaudeAdapter};
use super::http_client::{byte_stream, map_error_response};
use super::{ByteStream, TransportAdapter, UpstreamTarget};
use crate::error::ProviderError;
use crate::models::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use uuid::Uuid;

const CLAUDE_CLI_USER_AGENT: &str = "claude-cli/1.0.0 (external, cli)";
/// Bounds the in-process hash cache so a long-running gateway process never
/// accumulates one entry per distinct API key seen over its lifetime.
const HASH_CACHE_CAPACITY: usize = 4096;

pub struct ClaudeCliAdapter {
    inner: ClaudeAdapter,
    hash_cache: Mutex<LruCache<String, String>>,
}

impl ClaudeCliAdapter {
    pub fn new(inner: ClaudeAdapter) -> Self {
        Self {
            inner,
            hash_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(HASH_CACHE_CAPACITY).expect("nonzero capacity"),
            )),
        }
    }

    fn hashed_key(&self, api_key: &str) -> String {
        let mut cache = self.hash_cache.lock().expect("hash cache mutex poisoned");
        if let Some(hash) = cache.get(api_key) {
            return hash.clone();
        }
        let digest = Sha256::digest(api_key.as_bytes());
        let hash = format!("{digest:x}");
        cache.put(api_key.to_string(), hash.clone());
        hash
    }

    fn user_id(&self, api_key: &str) -> String {
        format!(
            "user_{}_account__session_{}",
            self.hashed_key(api_key),
            Uuid::new_v4()
        )
    }

    fn request_with_masquerade(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> super::claude::AnthropicRequest {
        let mut body = self.inner.build_request(target, request);
        body.metadata = Some(AnthropicMetadata {
            user_id: self.user_id(&target.api_key),
        });
        body
    }
}

#[async_trait]
impl TransportAdapter for ClaudeCliAdapter {
    async fn unary(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let mut headers = target.extra_headers.clone();
        headers.insert("User-Agent".to_string(), CLAUDE_CLI_USER_AGENT.to_string());
        let target = UpstreamTarget {
            extra_headers: headers,
            ..target.clone()
        };
        let client = self.inner.client(&target)?;
        let body = self.request_with_masquerade(&target, request);
        let resp = client.post_json("/v1/messages", &body, None).await?;
        Ok(super::claude::response_from_anthropic(resp))
    }

    async fn stream(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<ByteStream, ProviderError> {
        let mut headers = target.extra_headers.clone();
        headers.insert("User-Agent".to_string(), CLAUDE_CLI_USER_AGENT.to_string());
        let target = UpstreamTarget {
            extra_headers: headers,
            ..target.clone()
        };
        let client = self.inner.client(&target)?;
        let mut body = self.request_with_masquerade(&target, request);
        body.stream = Some(true);
        let resp = client.post_raw("/v1/messages", &body, None).await?;
        if !resp.status().is_success() {
            return Err(map_error_response(resp).await);
        }
        Ok(Box::pin(byte_stream(resp)))
    }
}
