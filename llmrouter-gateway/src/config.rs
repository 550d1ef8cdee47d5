//! # Configuration
//!
//! The gateway has no database: provider topology, scheduling strategy
//! selection, and auth material all live in a TOML file loaded at startup.
//! Environment variables layer on top of the file for the handful of
//! settings operators typically want to override per-deployment (timeouts,
//! cooldown thresholds, Redis URL, log format) without editing the file.
//!
//! `/admin/providers` reload re-reads this file and rebuilds the in-process
//! logical-model cache (see [`Config::build_logical_models`]); it never
//! opens a database connection because there isn't one.

use llmrouter_core::models::{ApiStyle, Capability, LogicalModel, PhysicalModel, Transport};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::env;
use std::time::Duration;

/// Top-level configuration, deserialized from a TOML file and then
/// patched by [`Config::apply_env_overrides`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub routing: RoutingRuntimeConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Redis connection string for the routing state store and session
    /// manager. `None` runs the gateway in disconnected mode: routing
    /// falls back to static base weights and stickiness is unavailable.
    #[serde(default)]
    pub redis_url: Option<String>,
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub provider_models: Vec<ProviderModelConfig>,
}

/// HTTP bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Gateway-facing authentication: the set of tokens clients may present
/// via `Authorization: Bearer <token>` or `X-API-Key: <token>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

/// One accepted client key. `allowed_providers` is the `effective_provider_ids`
/// set the selector enforces per §4.1 — `None` means every configured
/// provider is authorized for this key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub allowed_providers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

/// The env-tunable knobs enumerated by the gateway's operating contract.
/// These govern executor/selector behavior, not routing topology, which is
/// why they live separately from [`ProviderConfig`]/[`ProviderModelConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRuntimeConfig {
    #[serde(with = "duration_secs", default = "default_upstream_timeout")]
    pub upstream_timeout: Duration,
    #[serde(default = "default_failure_threshold")]
    pub provider_failure_threshold: u64,
    #[serde(default = "default_failure_cooldown_seconds")]
    pub provider_failure_cooldown_seconds: u64,
    #[serde(default = "default_health_cache_ttl_seconds")]
    pub provider_health_cache_ttl_seconds: u64,
    #[serde(default = "default_true")]
    pub enable_provider_health_check: bool,
    #[serde(default = "default_streaming_min_tokens")]
    pub streaming_min_tokens: u32,
    #[serde(default = "default_availability_cache_ttl_seconds")]
    pub candidate_availability_cache_ttl_seconds: u64,
    #[serde(default = "default_strategy_name")]
    pub default_strategy: String,
}

impl Default for RoutingRuntimeConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: default_upstream_timeout(),
            provider_failure_threshold: default_failure_threshold(),
            provider_failure_cooldown_seconds: default_failure_cooldown_seconds(),
            provider_health_cache_ttl_seconds: default_health_cache_ttl_seconds(),
            enable_provider_health_check: true,
            streaming_min_tokens: default_streaming_min_tokens(),
            candidate_availability_cache_ttl_seconds: default_availability_cache_ttl_seconds(),
            default_strategy: default_strategy_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_flush_interval_seconds")]
    pub flush_interval_seconds: u64,
    #[serde(default = "default_buffer_key_cap")]
    pub buffer_key_cap: usize,
    /// Fraction of successful samples the buffer actually records; `1.0`
    /// (the default) disables sampling. Failures are never sampled.
    #[serde(default = "default_success_sample_rate")]
    pub success_sample_rate: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            flush_interval_seconds: default_flush_interval_seconds(),
            buffer_key_cap: default_buffer_key_cap(),
            success_sample_rate: default_success_sample_rate(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_upstream_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_failure_threshold() -> u64 {
    3
}
fn default_failure_cooldown_seconds() -> u64 {
    30
}
fn default_health_cache_ttl_seconds() -> u64 {
    60
}
fn default_streaming_min_tokens() -> u32 {
    16
}
fn default_availability_cache_ttl_seconds() -> u64 {
    30
}
fn default_strategy_name() -> String {
    "balanced".to_string()
}
fn default_flush_interval_seconds() -> u64 {
    15
}
fn default_buffer_key_cap() -> usize {
    512
}
fn default_success_sample_rate() -> f64 {
    1.0
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// One upstream vendor endpoint. A provider may answer more than one
/// [`ApiStyle`] over the same `base_url` (e.g. a proxy that speaks both
/// OpenAI and Anthropic wire formats) — the cross product of
/// `api_styles` × this provider's [`ProviderModelConfig`] rows produces
/// one [`PhysicalModel`] per style.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub base_url: String,
    #[serde(default)]
    pub transport: Transport,
    pub api_styles: Vec<ApiStyle>,
    /// Name of the environment variable holding this provider's credential.
    pub api_key_env: String,
    /// Extra static headers (beta flags, tenant IDs) sent with every request.
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default = "default_base_weight")]
    pub base_weight: f64,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub max_qps: Option<u32>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_base_weight() -> f64 {
    1.0
}

/// One model served by one provider. `alias` is the client-visible logical
/// model id; when absent, `model_id` itself is the logical id, so two
/// providers serving the literal same `model_id` are automatically grouped
/// into one logical model's candidate set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderModelConfig {
    pub provider_id: String,
    pub model_id: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub pricing: Option<ModelPricing>,
}

/// Hook for the cost term of the scoring formula. Currently unused —
/// `cost_score` is pinned to zero per the scoring contract — but kept on
/// the wire shape so pricing data doesn't need a config migration later.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let mut config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Patches the handful of settings operators tune per-deployment.
    /// File values win when the corresponding variable is unset or unparsable.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("UPSTREAM_TIMEOUT") {
            if let Ok(secs) = v.parse() {
                self.routing.upstream_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = env::var("PROVIDER_FAILURE_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.routing.provider_failure_threshold = n;
            }
        }
        if let Ok(v) = env::var("PROVIDER_FAILURE_COOLDOWN_SECONDS") {
            if let Ok(n) = v.parse() {
                self.routing.provider_failure_cooldown_seconds = n;
            }
        }
        if let Ok(v) = env::var("PROVIDER_HEALTH_CACHE_TTL_SECONDS") {
            if let Ok(n) = v.parse() {
                self.routing.provider_health_cache_ttl_seconds = n;
            }
        }
        if let Ok(v) = env::var("ENABLE_PROVIDER_HEALTH_CHECK") {
            if let Ok(b) = v.parse() {
                self.routing.enable_provider_health_check = b;
            }
        }
        if let Ok(v) = env::var("STREAMING_MIN_TOKENS") {
            if let Ok(n) = v.parse() {
                self.routing.streaming_min_tokens = n;
            }
        }
        if let Ok(v) = env::var("CANDIDATE_AVAILABILITY_CACHE_TTL_SECONDS") {
            if let Ok(n) = v.parse() {
                self.routing.candidate_availability_cache_ttl_seconds = n;
            }
        }
        if let Ok(v) = env::var("REDIS_URL") {
            if !v.is_empty() {
                self.redis_url = Some(v);
            }
        }
        if let Ok(v) = env::var("LOG_LEVEL") {
            if !v.is_empty() {
                self.logging.level = v;
            }
        }
        if let Ok(v) = env::var("LOG_FORMAT") {
            self.logging.format = match v.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
        if let Ok(v) = env::var("METRICS_FLUSH_INTERVAL_SECONDS") {
            if let Ok(n) = v.parse() {
                self.metrics.flush_interval_seconds = n;
            }
        }
        if let Ok(v) = env::var("METRICS_BUFFER_KEY_CAP") {
            if let Ok(n) = v.parse() {
                self.metrics.buffer_key_cap = n;
            }
        }
        if let Ok(v) = env::var("METRICS_SUCCESS_SAMPLE_RATE") {
            if let Ok(n) = v.parse() {
                self.metrics.success_sample_rate = n;
            }
        }
        if let Ok(v) = env::var("GATEWAY_HOST") {
            if !v.is_empty() {
                self.server.host = v;
            }
        }
        if let Ok(v) = env::var("GATEWAY_PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server port must be non-zero".to_string()));
        }
        if self.providers.is_empty() {
            return Err(ConfigError::Invalid("at least one provider must be configured".to_string()));
        }

        let provider_ids: HashSet<&str> = self.providers.iter().map(|p| p.provider_id.as_str()).collect();
        if provider_ids.len() != self.providers.len() {
            return Err(ConfigError::Invalid("duplicate provider_id in [[providers]]".to_string()));
        }

        for provider in &self.providers {
            if provider.api_styles.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "provider {} declares no api_styles",
                    provider.provider_id
                )));
            }
            if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "provider {} has an invalid base_url: {}",
                    provider.provider_id, provider.base_url
                )));
            }
        }

        for model in &self.provider_models {
            if !provider_ids.contains(model.provider_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "provider_models entry references unknown provider_id: {}",
                    model.provider_id
                )));
            }
        }

        if llmrouter_core::models::SchedulingStrategy::by_name(&self.routing.default_strategy).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown default_strategy: {}",
                self.routing.default_strategy
            )));
        }

        for key in &self.auth.api_keys {
            if let Some(allowed) = &key.allowed_providers {
                for provider_id in allowed {
                    if !provider_ids.contains(provider_id.as_str()) {
                        return Err(ConfigError::Invalid(format!(
                            "api key {:?} allows unknown provider_id: {}",
                            key.name.as_deref().unwrap_or("<unnamed>"),
                            provider_id
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Reads `provider.api_key_env` for each enabled provider, failing fast
    /// if the variable is unset — a provider with no credential can never
    /// serve a request, so surfacing this at startup beats a confusing
    /// 502 on first use.
    pub fn load_provider_credentials(
        &self,
    ) -> Result<HashMap<String, llmrouter_core::executor::ProviderCredentials>, ConfigError> {
        let mut credentials = HashMap::new();
        for provider in &self.providers {
            if !provider.enabled {
                continue;
            }
            let api_key = env::var(&provider.api_key_env).map_err(|_| {
                ConfigError::Invalid(format!(
                    "provider {} requires env var {} to be set",
                    provider.provider_id, provider.api_key_env
                ))
            })?;
            credentials.insert(
                provider.provider_id.clone(),
                llmrouter_core::executor::ProviderCredentials {
                    api_key,
                    extra_headers: provider.extra_headers.clone(),
                },
            );
        }
        Ok(credentials)
    }

    /// Aggregates `provider_models` into one [`LogicalModel`] per
    /// `alias`/`model_id`, with one [`PhysicalModel`] candidate per
    /// `(provider, api_style)` pair that provider declares — this is the
    /// write-through rebuild the logical-model cache runs on miss or
    /// admin-triggered reload.
    pub fn build_logical_models(&self) -> Vec<LogicalModel> {
        let providers: HashMap<&str, &ProviderConfig> =
            self.providers.iter().map(|p| (p.provider_id.as_str(), p)).collect();

        let mut grouped: HashMap<String, Vec<PhysicalModel>> = HashMap::new();
        for model in &self.provider_models {
            if model.disabled {
                continue;
            }
            let Some(provider) = providers.get(model.provider_id.as_str()) else {
                continue;
            };
            if !provider.enabled {
                continue;
            }
            let logical_id = model.alias.clone().unwrap_or_else(|| model.model_id.clone());
            let capabilities: HashSet<Capability> = if model.capabilities.is_empty() {
                HashSet::from([Capability::Chat])
            } else {
                model.capabilities.iter().copied().collect()
            };

            for api_style in &provider.api_styles {
                grouped.entry(logical_id.clone()).or_default().push(PhysicalModel {
                    provider_id: provider.provider_id.clone(),
                    model_id: model.model_id.clone(),
                    endpoint: provider.base_url.clone(),
                    base_weight: provider.base_weight,
                    region: provider.region.clone(),
                    max_qps: provider.max_qps,
                    api_style: *api_style,
                    transport: provider.transport,
                    capabilities: capabilities.clone(),
                    enabled: true,
                });
            }
        }

        grouped
            .into_iter()
            .map(|(logical_id, upstreams)| {
                let capabilities = upstreams
                    .iter()
                    .flat_map(|u| u.capabilities.iter().copied())
                    .collect();
                LogicalModel {
                    logical_id,
                    capabilities,
                    upstreams,
                    enabled: true,
                }
            })
            .collect()
    }
}

impl ApiKeyConfig {
    /// The provider ids this key may route to, or `None` for "all providers".
    pub fn effective_provider_ids(&self, all_providers: &[ProviderConfig]) -> HashSet<String> {
        match &self.allowed_providers {
            Some(allowed) => allowed.iter().cloned().collect(),
            None => all_providers.iter().map(|p| p.provider_id.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            server: ServerConfig::default(),
            auth: AuthConfig {
                api_keys: vec![ApiKeyConfig {
                    key: "sk-test".to_string(),
                    name: Some("test".to_string()),
                    allowed_providers: None,
                }],
            },
            logging: LoggingConfig::default(),
            routing: RoutingRuntimeConfig::default(),
            metrics: MetricsConfig::default(),
            redis_url: None,
            providers: vec![ProviderConfig {
                provider_id: "openai".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                transport: Transport::Http,
                api_styles: vec![ApiStyle::OpenAi],
                api_key_env: "OPENAI_API_KEY".to_string(),
                extra_headers: HashMap::new(),
                base_weight: 1.0,
                region: None,
                max_qps: None,
                enabled: true,
            }],
            provider_models: vec![ProviderModelConfig {
                provider_id: "openai".to_string(),
                model_id: "gpt-4o".to_string(),
                alias: Some("gpt-4".to_string()),
                disabled: false,
                capabilities: vec![Capability::Chat],
                pricing: None,
            }],
        }
    }

    #[test]
    fn validate_accepts_well_formed_config() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_strategy() {
        let mut config = sample();
        config.routing.default_strategy = "made_up".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_dangling_provider_model_reference() {
        let mut config = sample();
        config.provider_models[0].provider_id = "missing".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn build_logical_models_groups_by_alias() {
        let config = sample();
        let models = config.build_logical_models();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].logical_id, "gpt-4");
        assert_eq!(models[0].upstreams.len(), 1);
        assert_eq!(models[0].upstreams[0].provider_id, "openai");
    }

    #[test]
    fn disabled_provider_model_is_excluded() {
        let mut config = sample();
        config.provider_models[0].disabled = true;
        assert!(config.build_logical_models().is_empty());
    }
}
