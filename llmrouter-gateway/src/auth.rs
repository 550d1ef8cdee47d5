//! # Authentication
//!
//! Client authentication is a flat API-key check: each configured key
//! authorizes a set of provider ids (the selector's `effective_provider_ids`,
//! §4.1). There is no JWT, no per-key rate limiting, and no server-side
//! session store here — conversation stickiness is
//! [`llmrouter_core::routing::SessionManager`]'s job, not this module's.

use crate::config::AuthConfig;
use llmrouter_core::error::GatewayError;
use std::collections::{HashMap, HashSet};

/// Everything downstream handlers need to know about the caller.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub key_name: String,
    pub effective_provider_ids: HashSet<String>,
}

/// Resolves `Authorization`/`X-API-Key` headers against the configured key
/// list. Built once at startup and shared behind an `Arc` in `AppState`.
#[derive(Debug, Clone)]
pub struct AuthService {
    keys: HashMap<String, AuthContext>,
}

impl AuthService {
    pub fn new(auth: &AuthConfig, all_provider_ids: &[String]) -> Self {
        let keys = auth
            .api_keys
            .iter()
            .map(|k| {
                let effective_provider_ids = match &k.allowed_providers {
                    Some(allowed) => allowed.iter().cloned().collect(),
                    None => all_provider_ids.iter().cloned().collect(),
                };
                (
                    k.key.clone(),
                    AuthContext {
                        key_name: k.name.clone().unwrap_or_else(|| "unnamed".to_string()),
                        effective_provider_ids,
                    },
                )
            })
            .collect();
        Self { keys }
    }

    /// Extracts the raw token from either supported header. `Bearer `
    /// prefix on `Authorization` is stripped; `X-API-Key` is used verbatim.
    pub fn extract_api_key(
        authorization: Option<&str>,
        x_api_key: Option<&str>,
    ) -> Result<String, GatewayError> {
        if let Some(header) = authorization {
            if let Some(token) = header.strip_prefix("Bearer ") {
                if !token.is_empty() {
                    return Ok(token.to_string());
                }
            }
            return Err(GatewayError::Authentication {
                message: "Authorization header must be 'Bearer <token>'".to_string(),
            });
        }
        if let Some(key) = x_api_key {
            if !key.is_empty() {
                return Ok(key.to_string());
            }
        }
        Err(GatewayError::Authentication {
            message: "missing Authorization or X-API-Key header".to_string(),
        })
    }

    pub fn authenticate(&self, api_key: &str) -> Result<AuthContext, GatewayError> {
        self.keys
            .get(api_key)
            .cloned()
            .ok_or_else(|| GatewayError::Authentication {
                message: "invalid API key".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeyConfig;

    fn service() -> AuthService {
        let auth = AuthConfig {
            api_keys: vec![
                ApiKeyConfig {
                    key: "sk-all".to_string(),
                    name: Some("all-providers".to_string()),
                    allowed_providers: None,
                },
                ApiKeyConfig {
                    key: "sk-scoped".to_string(),
                    name: Some("openai-only".to_string()),
                    allowed_providers: Some(vec!["openai".to_string()]),
                },
            ],
        };
        AuthService::new(&auth, &["openai".to_string(), "anthropic".to_string()])
    }

    #[test]
    fn extract_api_key_prefers_bearer() {
        let key = AuthService::extract_api_key(Some("Bearer sk-abc"), None).unwrap();
        assert_eq!(key, "sk-abc");
    }

    #[test]
    fn extract_api_key_falls_back_to_x_api_key() {
        let key = AuthService::extract_api_key(None, Some("sk-abc")).unwrap();
        assert_eq!(key, "sk-abc");
    }

    #[test]
    fn extract_api_key_rejects_missing_headers() {
        assert!(AuthService::extract_api_key(None, None).is_err());
    }

    #[test]
    fn authenticate_unscoped_key_gets_all_providers() {
        let ctx = service().authenticate("sk-all").unwrap();
        assert_eq!(ctx.effective_provider_ids.len(), 2);
    }

    #[test]
    fn authenticate_scoped_key_restricts_providers() {
        let ctx = service().authenticate("sk-scoped").unwrap();
        assert_eq!(ctx.effective_provider_ids, HashSet::from(["openai".to_string()]));
    }

    #[test]
    fn authenticate_rejects_unknown_key() {
        assert!(service().authenticate("sk-nope").is_err());
    }
}
