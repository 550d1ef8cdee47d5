//! # Routing and Wire Types
//!
//! This module defines the core data structures for the routing engine:
//!
//! - The **neutral chat payload** ([`ChatRequest`], [`ChatResponse`], [`Message`],
//!   [`StreamChunk`]) — an OpenAI-shaped representation that every transport
//!   adapter converts to and from its own upstream wire format.
//! - The **routing data model** ([`LogicalModel`], [`PhysicalModel`],
//!   [`SchedulingStrategy`], [`RoutingMetrics`], [`DynamicWeight`],
//!   [`FailureCooldownStatus`], [`Session`], [`CandidateScore`],
//!   [`ProviderHealth`]) used by the selector, executor, routing state
//!   service, and session manager.
//!
//! ## Example
//!
//! ```rust
//! use llmrouter_core::models::{ChatRequest, Message};
//!
//! let request = ChatRequest {
//!     model: "gpt-4".to_string(),
//!     messages: vec![Message::user("Hello, how are you?")],
//!     temperature: Some(0.7),
//!     max_tokens: Some(100),
//!     stream: Some(false),
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Neutral chat payload
// ---------------------------------------------------------------------------

/// A chat completion request in the gateway's neutral, OpenAI-shaped format.
/// Transport adapters (`llmrouter_core::transport`) translate this into the
/// upstream's wire format and translate the reply back into [`ChatResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    /// Logical model id as supplied by the caller, before resolution.
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatRequest {
    /// Heuristic used by the selector's capability narrowing
    /// (see [`crate::selector`]): a payload that carries `tools` requires a
    /// candidate that declares `Capability::ToolUse`.
    pub fn requires_tool_use(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
}

/// A message in a conversation. `content` is a flat string in the neutral
/// representation; adapters that need array-of-parts content (Anthropic,
/// Gemini) build that shape themselves from this field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Function { function: FunctionChoice },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionChoice {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

// ---------------------------------------------------------------------------
// Routing data model
// ---------------------------------------------------------------------------

/// Wire formats understood by the transport adapters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ApiStyle {
    OpenAi,
    Claude,
    /// Claude wire format, decorated to masquerade as the official Claude CLI
    /// (distinct `User-Agent`, synthesized `metadata.user_id`).
    ClaudeCli,
    Responses,
    Gemini,
    VertexSdk,
}

/// How a candidate is reached. `Sdk` candidates run their blocking SDK call
/// inside `spawn_blocking` rather than over a pooled `reqwest::Client`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Http,
    Sdk,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Chat,
    ToolUse,
    Vision,
}

/// One concrete upstream endpoint able to serve a logical model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalModel {
    pub provider_id: String,
    pub model_id: String,
    pub endpoint: String,
    pub base_weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_qps: Option<u32>,
    pub api_style: ApiStyle,
    pub transport: Transport,
    pub capabilities: HashSet<Capability>,
    pub enabled: bool,
}

/// A client-facing model identifier that fans out to one or more
/// [`PhysicalModel`] upstreams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalModel {
    pub logical_id: String,
    pub capabilities: HashSet<Capability>,
    pub upstreams: Vec<PhysicalModel>,
    pub enabled: bool,
}

/// Coefficients for the candidate scoring formula:
/// `score = base − α·norm_lat − β·err − γ·cost_score − δ·quota_pen`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedulingStrategy {
    pub name: &'static str,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub min_score: f64,
    pub enable_stickiness: bool,
}

impl SchedulingStrategy {
    pub const BALANCED: SchedulingStrategy = SchedulingStrategy {
        name: "balanced",
        alpha: 0.3,
        beta: 0.3,
        gamma: 0.2,
        delta: 0.2,
        min_score: 0.0,
        enable_stickiness: true,
    };

    pub const LATENCY_FIRST: SchedulingStrategy = SchedulingStrategy {
        name: "latency_first",
        alpha: 0.6,
        beta: 0.2,
        gamma: 0.1,
        delta: 0.1,
        min_score: 0.0,
        enable_stickiness: true,
    };

    pub const COST_FIRST: SchedulingStrategy = SchedulingStrategy {
        name: "cost_first",
        alpha: 0.2,
        beta: 0.2,
        gamma: 0.5,
        delta: 0.1,
        min_score: 0.0,
        enable_stickiness: true,
    };

    pub const RELIABILITY_FIRST: SchedulingStrategy = SchedulingStrategy {
        name: "reliability_first",
        alpha: 0.3,
        beta: 0.5,
        gamma: 0.1,
        delta: 0.1,
        min_score: 0.0,
        enable_stickiness: true,
    };

    pub fn by_name(name: &str) -> Option<SchedulingStrategy> {
        match name {
            "balanced" => Some(Self::BALANCED),
            "latency_first" => Some(Self::LATENCY_FIRST),
            "cost_first" => Some(Self::COST_FIRST),
            "reliability_first" => Some(Self::RELIABILITY_FIRST),
            _ => None,
        }
    }
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        Self::BALANCED
    }
}

/// Health classification used by the quota-penalty term of the scorer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

/// Cached per-`(logical_model, provider)` latency/error snapshot read by the
/// scorer. Produced by [`crate::metrics::MetricsBuffer`] flushes. `total_samples`
/// is the cumulative count behind the current averages, carried so the next
/// flush can weight its merge by how much history already backs this entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingMetrics {
    #[serde(default)]
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    #[serde(default)]
    pub p99_latency_ms: f64,
    pub error_rate: f64,
    pub status: HealthStatus,
    #[serde(default)]
    pub total_samples: u64,
}

impl RoutingMetrics {
    /// Used by the scorer when no sample exists yet for a candidate: neutral
    /// latency penalty, zero error rate, healthy status.
    pub fn unknown() -> Self {
        Self {
            avg_latency_ms: 2000.0,
            p95_latency_ms: 2000.0,
            p99_latency_ms: 2000.0,
            error_rate: 0.0,
            status: HealthStatus::Healthy,
            total_samples: 0,
        }
    }
}

/// Point-in-time health sample for a single provider, independent of any
/// particular logical model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider_id: String,
    pub status: HealthStatus,
    pub response_time_ms: Option<f64>,
    pub error_message: Option<String>,
    pub last_successful_check_unix: Option<i64>,
}

/// Result of `RoutingStateService::get_failure_cooldown_status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FailureCooldownStatus {
    pub provider_id_hash: u64,
    pub count: u64,
    pub threshold: u64,
    pub cooldown_seconds: u64,
    pub should_skip: bool,
}

/// Per-conversation upstream binding maintained by the session manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub conversation_id: String,
    pub logical_model: String,
    pub provider_id: String,
    pub model_id: String,
    pub created_at_unix: i64,
    pub last_accessed_unix: i64,
    pub message_count: u64,
}

/// Transient scored candidate produced by the selector for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub upstream: PhysicalModel,
    pub metrics: RoutingMetrics,
    pub score: f64,
}
