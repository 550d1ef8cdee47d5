//! # Routing State Service
//!
//! Facade hiding the Redis key layout from the rest of the routing engine.
//! Every operation tolerates store unavailability: reads return an empty
//! value and writes are logged and dropped rather than propagated, because a
//! degraded state store must never fail a request (see
//! [`crate::models::RoutingMetrics::unknown`] for the read-side default the
//! selector falls back to).

use crate::models::{FailureCooldownStatus, HealthStatus, ProviderHealth, RoutingMetrics};
use crate::routing::weights;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

const FAILURE_KEY_PREFIX: &str = "provider:failure:";
const HEALTH_KEY_PREFIX: &str = "llm:provider:health:";
const METRICS_KEY_PREFIX: &str = "llm:metrics:";
/// Metrics entries outlive a single flush interval by a wide margin so a
/// quiet candidate's last known numbers stay available to the scorer.
const METRICS_TTL_SECONDS: u64 = 3600;

fn weight_key(logical_model: &str) -> String {
    format!("routing:{logical_model}:provider_weights")
}

fn failure_key(provider_id: &str) -> String {
    format!("{FAILURE_KEY_PREFIX}{provider_id}")
}

fn health_key(provider_id: &str) -> String {
    format!("{HEALTH_KEY_PREFIX}{provider_id}")
}

fn metrics_key(logical_model: &str, provider_id: &str) -> String {
    format!("{METRICS_KEY_PREFIX}{logical_model}:{provider_id}")
}

#[derive(Clone, Copy)]
pub struct CooldownConfig {
    pub threshold: u64,
    pub cooldown_seconds: u64,
}

pub struct RoutingStateService {
    conn: Option<ConnectionManager>,
    cooldown: CooldownConfig,
}

impl RoutingStateService {
    pub fn new(conn: Option<ConnectionManager>, cooldown: CooldownConfig) -> Self {
        Self { conn, cooldown }
    }

    /// Connects eagerly so startup fails loudly if `redis_url` is wrong;
    /// after that, every method degrades silently on a transient error.
    pub async fn connect(redis_url: &str, cooldown: CooldownConfig) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(Some(conn), cooldown))
    }

    /// A routing state service with no backing store, used by tests and by
    /// standalone deployments that accept losing stickiness/weights across
    /// restarts.
    pub fn disconnected(cooldown: CooldownConfig) -> Self {
        Self::new(None, cooldown)
    }

    fn conn(&self) -> Option<ConnectionManager> {
        self.conn.clone()
    }

    pub async fn get_cached_health(&self, provider_id: &str) -> Option<ProviderHealth> {
        let mut conn = self.conn()?;
        let raw: Option<String> = conn.get(health_key(provider_id)).await.ok().flatten();
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    pub async fn get_routing_metrics(
        &self,
        logical_model: &str,
        provider_id: &str,
    ) -> Option<RoutingMetrics> {
        let mut conn = self.conn()?;
        let raw: Option<String> = conn
            .get(metrics_key(logical_model, provider_id))
            .await
            .ok()
            .flatten();
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    pub async fn load_metrics_for_candidates(
        &self,
        logical_model: &str,
        provider_ids: &[String],
    ) -> HashMap<String, RoutingMetrics> {
        let mut out = HashMap::new();
        let mut seen = std::collections::HashSet::new();
        for provider_id in provider_ids {
            if !seen.insert(provider_id.clone()) {
                continue;
            }
            let metrics = self
                .get_routing_metrics(logical_model, provider_id)
                .await
                .unwrap_or_else(RoutingMetrics::unknown);
            out.insert(provider_id.clone(), metrics);
        }
        out
    }

    /// Seeds missing weights with `base_weight` (Redis `ZADD NX`), reads back
    /// the full set, clamps each value, and re-writes any that clamping
    /// changed. Mirrors the upstream service's seed-then-clamp sequence so
    /// concurrent first-touches race safely (`NX` makes the seed idempotent).
    pub async fn load_dynamic_weights(
        &self,
        logical_model: &str,
        upstreams: &[(String, f64)],
    ) -> HashMap<String, f64> {
        let Some(mut conn) = self.conn() else {
            return HashMap::new();
        };
        if upstreams.is_empty() {
            return HashMap::new();
        }
        let key = weight_key(logical_model);

        let mut base_by_provider = HashMap::new();
        for (provider_id, base_weight) in upstreams {
            base_by_provider.entry(provider_id.clone()).or_insert(*base_weight);
        }

        for (provider_id, base_weight) in &base_by_provider {
            let _: Result<bool, _> = redis::cmd("ZADD")
                .arg(&key)
                .arg("NX")
                .arg(base_weight)
                .arg(provider_id)
                .query_async(&mut conn)
                .await;
        }

        let mut weights = HashMap::new();
        for (provider_id, base_weight) in &base_by_provider {
            let score: Option<f64> = conn.zscore(&key, provider_id).await.unwrap_or(None);
            let raw = score.unwrap_or(*base_weight);
            let clamped = weights::clamp_weight(raw, *base_weight);
            if (clamped - raw).abs() > f64::EPSILON {
                let _: Result<(), _> = conn.zadd(&key, provider_id, clamped).await;
            }
            weights.insert(provider_id.clone(), clamped);
        }
        weights
    }

    async fn adjust_weight(&self, logical_model: &str, provider_id: &str, base_weight: f64, delta: f64) {
        let Some(mut conn) = self.conn() else { return };
        let key = weight_key(logical_model);
        let _: Result<bool, _> = redis::cmd("ZADD")
            .arg(&key)
            .arg("NX")
            .arg(base_weight)
            .arg(provider_id)
            .query_async(&mut conn)
            .await;
        let raw: f64 = match conn.zincr(&key, provider_id, delta).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, provider_id, "failed to adjust dynamic weight");
                return;
            }
        };
        let clamped = weights::clamp_weight(raw, base_weight);
        if (clamped - raw).abs() > f64::EPSILON {
            let _: Result<(), _> = conn.zadd(&key, provider_id, clamped).await;
        }
    }

    /// Fire-and-forget: spawns the Redis round trip so the caller's request
    /// path never waits on a weight update.
    pub fn record_success(&self, logical_model: String, provider_id: String, base_weight: f64) {
        self.spawn_adjust(logical_model, provider_id, weights::success_delta(base_weight));
    }

    pub fn record_failure(
        &self,
        logical_model: String,
        provider_id: String,
        base_weight: f64,
        retryable: bool,
    ) {
        self.spawn_adjust(logical_model, provider_id, weights::failure_delta(base_weight, retryable));
    }

    fn spawn_adjust(&self, logical_model: String, provider_id: String, delta: f64) {
        let Some(conn) = self.conn() else { return };
        let base_weight = delta.abs().max(weights::ABSOLUTE_MIN);
        let service = Self::new(Some(conn), self.cooldown);
        tokio::spawn(async move {
            service.adjust_weight(&logical_model, &provider_id, base_weight, delta).await;
        });
    }

    pub async fn get_failure_cooldown_status(&self, provider_id: &str) -> FailureCooldownStatus {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        provider_id.hash(&mut hasher);
        let provider_id_hash = hasher.finish();

        if self.cooldown.threshold == 0 {
            return FailureCooldownStatus {
                provider_id_hash,
                count: 0,
                threshold: self.cooldown.threshold,
                cooldown_seconds: self.cooldown.cooldown_seconds,
                should_skip: false,
            };
        }
        let count = match self.conn() {
            Some(mut conn) => {
                let raw: Option<String> = conn.get(failure_key(provider_id)).await.unwrap_or(None);
                raw.and_then(|s| s.parse::<u64>().ok()).unwrap_or(0)
            }
            None => 0,
        };
        FailureCooldownStatus {
            provider_id_hash,
            count,
            threshold: self.cooldown.threshold,
            cooldown_seconds: self.cooldown.cooldown_seconds,
            should_skip: count >= self.cooldown.threshold,
        }
    }

    pub async fn increment_provider_failure(&self, provider_id: &str) -> u64 {
        let Some(mut conn) = self.conn() else { return 0 };
        let key = failure_key(provider_id);
        match conn.incr::<_, _, u64>(&key, 1).await {
            Ok(count) => {
                let _: Result<bool, _> = conn
                    .expire(&key, self.cooldown.cooldown_seconds as i64)
                    .await;
                count
            }
            Err(e) => {
                tracing::warn!(error = %e, provider_id, "failed to increment failure counter");
                0
            }
        }
    }

    pub async fn clear_provider_failure(&self, provider_id: &str) {
        let Some(mut conn) = self.conn() else { return };
        if let Err(e) = conn.del::<_, ()>(failure_key(provider_id)).await {
            tracing::debug!(error = %e, provider_id, "failed to clear failure counter");
        }
    }

    /// Additive merge write-back from the metrics buffer's periodic flush:
    /// reads whatever snapshot is already stored and folds the new batch
    /// into it (counts add, percentiles are weighted-averaged by count)
    /// rather than overwriting it, so a flush never erases history a
    /// previous flush already persisted.
    pub async fn upsert_metrics(&self, logical_model: &str, provider_id: &str, metrics: &RoutingMetrics) {
        let Some(mut conn) = self.conn() else { return };
        let merged = match self.get_routing_metrics(logical_model, provider_id).await {
            Some(existing) if existing.total_samples > 0 => merge_routing_metrics(&existing, metrics),
            _ => metrics.clone(),
        };
        let Ok(json) = serde_json::to_string(&merged) else {
            return;
        };
        let _: Result<(), _> = conn
            .set_ex(metrics_key(logical_model, provider_id), json, METRICS_TTL_SECONDS)
            .await;
    }

    pub async fn record_health(&self, health: &ProviderHealth, ttl: Duration) {
        let Some(mut conn) = self.conn() else { return };
        let Ok(json) = serde_json::to_string(health) else {
            return;
        };
        let _: Result<(), _> = conn
            .set_ex(health_key(&health.provider_id), json, ttl.as_secs())
            .await;
    }
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            cooldown_seconds: 30,
        }
    }
}

/// Folds a freshly flushed batch into a previously stored snapshot: counts
/// add, every averaged field is re-weighted by each side's sample count, and
/// status is recomputed from the merged error rate rather than carried over
/// from either side. Mirrors the upstream service's `ON CONFLICT` merge.
pub(crate) fn merge_routing_metrics(existing: &RoutingMetrics, new: &RoutingMetrics) -> RoutingMetrics {
    let existing_count = existing.total_samples as f64;
    let new_count = new.total_samples as f64;
    let total = existing_count + new_count;
    if total == 0.0 {
        return new.clone();
    }
    let weighted = |old: f64, incoming: f64| (old * existing_count + incoming * new_count) / total;
    let error_rate = weighted(existing.error_rate, new.error_rate);
    RoutingMetrics {
        avg_latency_ms: weighted(existing.avg_latency_ms, new.avg_latency_ms),
        p95_latency_ms: weighted(existing.p95_latency_ms, new.p95_latency_ms),
        p99_latency_ms: weighted(existing.p99_latency_ms, new.p99_latency_ms),
        error_rate,
        status: crate::metrics::status_from_error_rate(error_rate),
        total_samples: existing.total_samples + new.total_samples,
    }
}

/// Convenience used by tests: treats any status other than `Healthy` as
/// degraded enough to apply the scorer's quota penalty.
pub fn quota_penalty(status: HealthStatus) -> f64 {
    match status {
        HealthStatus::Healthy => 0.0,
        HealthStatus::Degraded => 0.5,
        HealthStatus::Down => 1.0,
    }
}
