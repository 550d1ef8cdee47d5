//! # Session Manager
//!
//! Binds a conversation id to the `(logical_model, provider_id, model_id)`
//! tuple it last used, so follow-up turns in the same conversation keep
//! hitting the same upstream. Bindings are advisory: the selector only
//! honors a binding if the bound provider still appears among the
//! candidates for that request.

use crate::models::Session;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

const SESSION_KEY_PREFIX: &str = "llm:session:";
const DEFAULT_TTL_SECS: u64 = 7200;

fn session_key(conversation_id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{conversation_id}")
}

pub struct SessionManager {
    conn: Option<ConnectionManager>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(conn: Option<ConnectionManager>) -> Self {
        Self {
            conn,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn conn(&self) -> Option<ConnectionManager> {
        self.conn.clone()
    }

    pub async fn get(&self, conversation_id: &str) -> Option<Session> {
        let mut conn = self.conn()?;
        let raw: Option<String> = conn.get(session_key(conversation_id)).await.ok().flatten();
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    async fn store(&self, session: &Session) {
        let Some(mut conn) = self.conn() else { return };
        let Ok(json) = serde_json::to_string(session) else {
            return;
        };
        let _: Result<(), _> = conn
            .set_ex(session_key(&session.conversation_id), json, self.ttl.as_secs())
            .await;
    }

    /// Idempotent upsert: an existing session keeps its `created_at` and
    /// `message_count`; only `last_accessed` and the routed-to upstream are
    /// refreshed. A brand-new session starts `message_count` at zero.
    pub async fn bind(
        &self,
        conversation_id: &str,
        logical_model: &str,
        provider_id: &str,
        model_id: &str,
        now_unix: i64,
    ) -> Session {
        let existing = self.get(conversation_id).await;
        let session = match existing {
            Some(mut s) => {
                s.logical_model = logical_model.to_string();
                s.provider_id = provider_id.to_string();
                s.model_id = model_id.to_string();
                s.last_accessed_unix = now_unix;
                s
            }
            None => Session {
                conversation_id: conversation_id.to_string(),
                logical_model: logical_model.to_string(),
                provider_id: provider_id.to_string(),
                model_id: model_id.to_string(),
                created_at_unix: now_unix,
                last_accessed_unix: now_unix,
                message_count: 0,
            },
        };
        self.store(&session).await;
        session
    }

    /// No-op if no session exists yet; otherwise bumps `last_accessed` and
    /// adds `increment_messages` (floored at zero) to the running count.
    pub async fn touch(
        &self,
        conversation_id: &str,
        increment_messages: i64,
        now_unix: i64,
    ) -> Option<Session> {
        let mut session = self.get(conversation_id).await?;
        session.last_accessed_unix = now_unix;
        session.message_count += increment_messages.max(0) as u64;
        self.store(&session).await;
        Some(session)
    }

    pub async fn delete(&self, conversation_id: &str) -> bool {
        let Some(mut conn) = self.conn() else { return false };
        if self.get(conversation_id).await.is_none() {
            return false;
        }
        conn.del::<_, ()>(session_key(conversation_id)).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disconnected_manager_is_a_safe_no_op() {
        let manager = SessionManager::new(None);
        assert!(manager.get("conv-1").await.is_none());
        let session = manager.bind("conv-1", "gpt-4", "openai", "gpt-4o", 1000).await;
        assert_eq!(session.message_count, 0);
        assert!(manager.touch("conv-1", 1, 1001).await.is_none());
        assert!(!manager.delete("conv-1").await);
    }
}
