//! # Policy Hooks
//!
//! Moderation, billing, and session-event policy are deliberately left out
//! of this crate: it knows only the narrow trait surface the executor calls
//! through. A deployment wires in a concrete implementation; absent one, the
//! no-op defaults below keep the gateway fully functional with moderation
//! and billing disabled, the same way the teacher's plugin registry treats
//! an unconfigured plugin as absent rather than as an error.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    FirstChunk,
    Complete,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModerationOutcome {
    Allow,
    Block { reason: String },
}

impl ModerationOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, ModerationOutcome::Block { .. })
    }
}

#[derive(Clone, Debug)]
pub struct UsageContext {
    pub account_id: String,
    pub logical_model: String,
    pub provider_id: String,
    pub model_id: String,
}

#[async_trait]
pub trait ModerationHook: Send + Sync {
    async fn apply_request(&self, payload: &Value) -> ModerationOutcome;
    async fn apply_response(&self, content: &Value, stage: Stage) -> ModerationOutcome;
}

#[async_trait]
pub trait BillingHook: Send + Sync {
    async fn record_unary(
        &self,
        ctx: UsageContext,
        response_payload: &Value,
        request_payload: &Value,
        idempotency_key: Option<&str>,
    );

    async fn record_stream_precharge(
        &self,
        ctx: UsageContext,
        payload: &Value,
        idempotency_key: Option<&str>,
    );
}

#[async_trait]
pub trait SessionEventHook: Send + Sync {
    async fn on_message_assistant_written(&self, conversation_id: &str, message: &str);
}

/// Allows everything; installed when no moderation policy is configured.
pub struct NoopModerationHook;

#[async_trait]
impl ModerationHook for NoopModerationHook {
    async fn apply_request(&self, _payload: &Value) -> ModerationOutcome {
        ModerationOutcome::Allow
    }

    async fn apply_response(&self, _content: &Value, _stage: Stage) -> ModerationOutcome {
        ModerationOutcome::Allow
    }
}

/// Records nothing; installed when no billing backend is configured.
pub struct NoopBillingHook;

#[async_trait]
impl BillingHook for NoopBillingHook {
    async fn record_unary(
        &self,
        _ctx: UsageContext,
        _response_payload: &Value,
        _request_payload: &Value,
        _idempotency_key: Option<&str>,
    ) {
    }

    async fn record_stream_precharge(
        &self,
        _ctx: UsageContext,
        _payload: &Value,
        _idempotency_key: Option<&str>,
    ) {
    }
}

pub struct NoopSessionEventHook;

#[async_trait]
impl SessionEventHook for NoopSessionEventHook {
    async fn on_message_assistant_written(&self, _conversation_id: &str, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_moderation_allows_everything() {
        let hook = NoopModerationHook;
        let outcome = hook.apply_request(&Value::Null).await;
        assert_eq!(outcome, ModerationOutcome::Allow);
        assert!(!outcome.is_blocked());
    }
}
