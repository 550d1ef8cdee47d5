//! # LLM Router Core
//!
//! Routing engine and transport layer for the LLM router gateway. This
//! crate holds everything that decides *which* upstream serves a chat
//! completion and *how* to speak that upstream's wire protocol; the HTTP
//! surface, auth, and admin routes live in the `llmrouter-gateway` crate.
//!
//! ## Overview
//!
//! - [`models`]: neutral chat payload types plus the routing data model
//!   (`LogicalModel`, `PhysicalModel`, `CandidateScore`, ...).
//! - [`routing`]: the Provider Selector, the Redis-backed Routing State
//!   Service, the Session Manager, and the logical-model catalog.
//! - [`transport`]: one [`transport::TransportAdapter`] per upstream API
//!   style, registered in a [`transport::TransportRegistry`].
//! - [`executor`]: the Candidate Executor, which walks a scored candidate
//!   list and hands off to the right transport adapter.
//! - [`metrics`]: the in-memory Metrics Buffer that folds per-request
//!   samples into the durable routing-metrics history.
//! - [`hooks`]: narrow async traits for moderation, billing, and session
//!   events that the executor calls through without depending on a
//!   concrete policy implementation.
//!
//! ## Example
//!
//! ```no_run
//! use llmrouter_core::models::{ChatRequest, Message};
//! use llmrouter_core::routing::{LogicalModelCatalog, ProviderSelector, RoutingStateService, SessionManager, CooldownConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let catalog = Arc::new(LogicalModelCatalog::empty());
//! let routing_state = Arc::new(RoutingStateService::disconnected(CooldownConfig::default()));
//! let sessions = Arc::new(SessionManager::new(None));
//! let selector = ProviderSelector::new(catalog, routing_state, sessions, Duration::from_secs(30));
//!
//! let request = ChatRequest {
//!     model: "gpt-4o".to_string(),
//!     messages: vec![Message::user("hello")],
//!     ..Default::default()
//! };
//! # let _ = (selector, request);
//! # }
//! ```

pub mod common;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod metrics;
pub mod models;
pub mod routing;
pub mod transport;

pub use error::{GatewayError, ProviderError};
pub use executor::{CandidateExecutor, ProviderCredentials, StreamOutcome, UnaryOutcome};
pub use models::{ChatRequest, ChatResponse, Choice, Message, Role, Usage};

#[cfg(test)]
mod tests {
    use crate::models::{ChatRequest, Message, Role};

    #[test]
    fn message_constructors_set_the_expected_role() {
        let user_msg = Message::user("Hello, world!");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.content, "Hello, world!");

        let assistant_msg = Message::assistant("Hi there!");
        assert_eq!(assistant_msg.role, Role::Assistant);

        let system_msg = Message::system("You are a helpful assistant.");
        assert_eq!(system_msg.role, Role::System);
    }

    #[test]
    fn chat_request_default_is_empty() {
        let request = ChatRequest::default();
        assert_eq!(request.model, "");
        assert_eq!(request.messages.len(), 0);
        assert_eq!(request.stream, None);
    }
}
