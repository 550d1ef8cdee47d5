//! # Provider Selector
//!
//! Resolves `(logical_model_id, request_context)` into an ordered list of
//! scored upstream candidates. See the scoring formula in the module-level
//! constants below; this is the one place that formula is evaluated.

use crate::error::GatewayError;
use crate::models::{
    ApiStyle, CandidateScore, Capability, HealthStatus, LogicalModel, PhysicalModel,
    RoutingMetrics, SchedulingStrategy,
};
use crate::routing::catalog::LogicalModelCatalog;
use crate::routing::session::SessionManager;
use crate::routing::state::RoutingStateService;
use rand::Rng;
use std::collections::HashMap;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Only the top `STICKY_RERANK_WINDOW` score-sorted candidates participate in
/// the weighted-random draw; beyond that the score order is kept as-is. This
/// bounds how much a single random draw can reorder a long candidate list.
const STICKY_RERANK_WINDOW: usize = 3;

type AvailabilityCacheKey = (String, ApiStyle, u64);

pub struct SelectionInput<'a> {
    pub logical_model_id: &'a str,
    pub api_style: ApiStyle,
    pub effective_provider_ids: &'a HashSet<String>,
    pub session_id: Option<&'a str>,
    pub requires_tool_use: bool,
    pub strategy: SchedulingStrategy,
    pub enable_health_check: bool,
    pub allow_degraded: bool,
}

#[derive(Debug)]
pub struct SelectionResult {
    pub ordered_candidates: Vec<CandidateScore>,
    pub base_weights: HashMap<String, f64>,
}

pub struct ProviderSelector {
    catalog: Arc<LogicalModelCatalog>,
    routing_state: Arc<RoutingStateService>,
    session_manager: Arc<SessionManager>,
    availability_cache: Mutex<HashMap<AvailabilityCacheKey, (Instant, bool)>>,
    availability_cache_ttl: Duration,
}

impl ProviderSelector {
    pub fn new(
        catalog: Arc<LogicalModelCatalog>,
        routing_state: Arc<RoutingStateService>,
        session_manager: Arc<SessionManager>,
        availability_cache_ttl: Duration,
    ) -> Self {
        Self {
            catalog,
            routing_state,
            session_manager,
            availability_cache: Mutex::new(HashMap::new()),
            availability_cache_ttl,
        }
    }

    pub async fn select(&self, input: SelectionInput<'_>) -> Result<SelectionResult, GatewayError> {
        let logical_model = self.resolve_logical_model(input.logical_model_id)?;

        let provider_ids: HashSet<&str> = logical_model
            .upstreams
            .iter()
            .map(|u| u.provider_id.as_str())
            .collect();
        if !provider_ids
            .iter()
            .any(|p| input.effective_provider_ids.contains(*p))
        {
            return Err(GatewayError::NoAuthorizedProvider {
                logical_model: input.logical_model_id.to_string(),
            });
        }

        let feasible: Vec<&PhysicalModel> = logical_model
            .upstreams
            .iter()
            .filter(|u| u.enabled)
            .filter(|u| u.api_style == input.api_style)
            .filter(|u| input.effective_provider_ids.contains(u.provider_id.as_str()))
            .filter(|u| !input.requires_tool_use || u.capabilities.contains(&Capability::ToolUse))
            .collect();

        if feasible.is_empty() {
            return Err(GatewayError::NoUpstreamAvailable {
                logical_model: input.logical_model_id.to_string(),
            });
        }

        let base_pairs: Vec<(String, f64)> = feasible
            .iter()
            .map(|u| (u.provider_id.clone(), u.base_weight))
            .collect();
        let dynamic_weights = self
            .routing_state
            .load_dynamic_weights(input.logical_model_id, &base_pairs)
            .await;

        let provider_id_list: Vec<String> = feasible.iter().map(|u| u.provider_id.clone()).collect();
        let metrics_by_provider = self
            .routing_state
            .load_metrics_for_candidates(input.logical_model_id, &provider_id_list)
            .await;

        let mut scored = Vec::with_capacity(feasible.len());
        let mut skipped_for_health = 0usize;
        for upstream in feasible {
            let metrics = metrics_by_provider
                .get(&upstream.provider_id)
                .cloned()
                .unwrap_or_else(crate::models::RoutingMetrics::unknown);

            // `Down` is always excluded; `Degraded` is excluded too unless the
            // caller opted in — `allow_degraded` never re-admits `Down`.
            // Failure-cooldown skipping happens later, in the executor, so
            // that an all-cooldown candidate set still reaches it and
            // produces `UpstreamAllFailed` rather than a selector-level 503.
            if input.enable_health_check {
                let excluded = match metrics.status {
                    HealthStatus::Down => true,
                    HealthStatus::Degraded => !input.allow_degraded,
                    HealthStatus::Healthy => false,
                };
                if excluded {
                    skipped_for_health += 1;
                    continue;
                }
            }

            let base = dynamic_weights
                .get(&upstream.provider_id)
                .copied()
                .unwrap_or(upstream.base_weight);
            let score = score_candidate(base, &metrics, &input.strategy);

            if input.enable_health_check && score < input.strategy.min_score {
                skipped_for_health += 1;
                continue;
            }

            scored.push(CandidateScore {
                upstream: upstream.clone(),
                metrics,
                score,
            });
        }

        if scored.is_empty() {
            return Err(GatewayError::NoUpstreamAvailable {
                logical_model: input.logical_model_id.to_string(),
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        reorder_by_weighted_draw(&mut scored);

        if input.strategy.enable_stickiness {
            if let Some(session_id) = input.session_id {
                if let Some(session) = self.session_manager.get(session_id).await {
                    if let Some(pos) = scored
                        .iter()
                        .position(|c| c.upstream.provider_id == session.provider_id)
                    {
                        let sticky = scored.remove(pos);
                        scored.insert(0, sticky);
                    }
                }
            }
        }

        let base_weights = dynamic_weights;
        tracing::debug!(
            logical_model = input.logical_model_id,
            candidates = scored.len(),
            skipped_for_health,
            "selected candidate ordering"
        );
        Ok(SelectionResult {
            ordered_candidates: scored,
            base_weights,
        })
    }

    /// Batch feasibility check over a pool of logical models: for each one,
    /// true if at least one of its upstreams is enabled, answers `api_style`,
    /// is authorized under `effective_provider_ids`, is not in failure
    /// cooldown, and is not `Down`/`Degraded`. Unlike [`Self::select`], this
    /// never re-admits `Degraded` — there is no `allow_degraded` escape
    /// hatch here, since the result only says whether a model is usable at
    /// all, not which upstream to pick.
    ///
    /// `request_payload` feeds the same tool-use heuristic narrowing as
    /// `select`'s `requires_tool_use`: a payload carrying non-empty `tools`
    /// excludes any upstream that doesn't declare [`Capability::ToolUse`],
    /// but a payload without tools never widens what a candidate already
    /// declares. `budget_credits` is accepted for forward compatibility with
    /// the scoring formula's cost term; since `cost_score` is pinned to zero
    /// (no per-candidate pricing is threaded into `PhysicalModel`), it does
    /// not currently filter anything.
    ///
    /// Results are cached per `(logical_model, api_style, provider set hash)`
    /// for `availability_cache_ttl`.
    pub async fn check_candidate_availability(
        &self,
        candidate_logical_models: &[String],
        effective_provider_ids: &HashSet<String>,
        api_style: ApiStyle,
        request_payload: Option<&serde_json::Value>,
        _budget_credits: Option<f64>,
    ) -> Vec<String> {
        let provider_set_hash = hash_provider_set(effective_provider_ids);
        let requires_tool_use = payload_requires_tool_use(request_payload);

        let mut feasible = Vec::with_capacity(candidate_logical_models.len());
        for logical_model_id in candidate_logical_models {
            let cache_key = (logical_model_id.clone(), api_style, provider_set_hash);
            if let Some(is_feasible) = self.cached_availability(&cache_key) {
                if is_feasible {
                    feasible.push(logical_model_id.clone());
                }
                continue;
            }

            let is_feasible = self
                .is_model_feasible(logical_model_id, effective_provider_ids, api_style, requires_tool_use)
                .await;
            self.availability_cache
                .lock()
                .unwrap()
                .insert(cache_key, (Instant::now(), is_feasible));
            if is_feasible {
                feasible.push(logical_model_id.clone());
            }
        }
        feasible
    }

    fn cached_availability(&self, key: &AvailabilityCacheKey) -> Option<bool> {
        let cache = self.availability_cache.lock().unwrap();
        let (cached_at, is_feasible) = cache.get(key)?;
        if cached_at.elapsed() < self.availability_cache_ttl {
            Some(*is_feasible)
        } else {
            None
        }
    }

    async fn is_model_feasible(
        &self,
        logical_model_id: &str,
        effective_provider_ids: &HashSet<String>,
        api_style: ApiStyle,
        requires_tool_use: bool,
    ) -> bool {
        let Some(model) = self.catalog.get(logical_model_id) else {
            return false;
        };
        if !model.enabled {
            return false;
        }

        let candidates: Vec<&PhysicalModel> = model
            .upstreams
            .iter()
            .filter(|u| u.enabled)
            .filter(|u| u.api_style == api_style)
            .filter(|u| effective_provider_ids.contains(u.provider_id.as_str()))
            .filter(|u| !requires_tool_use || u.capabilities.contains(&Capability::ToolUse))
            .collect();
        if candidates.is_empty() {
            return false;
        }

        for upstream in candidates {
            let cooldown = self
                .routing_state
                .get_failure_cooldown_status(&upstream.provider_id)
                .await;
            if cooldown.should_skip {
                continue;
            }
            let metrics = self
                .routing_state
                .get_routing_metrics(logical_model_id, &upstream.provider_id)
                .await
                .unwrap_or_else(RoutingMetrics::unknown);
            if matches!(metrics.status, HealthStatus::Down | HealthStatus::Degraded) {
                continue;
            }
            return true;
        }
        false
    }

    fn resolve_logical_model(&self, logical_model_id: &str) -> Result<Arc<LogicalModel>, GatewayError> {
        let model = self
            .catalog
            .get(logical_model_id)
            .ok_or_else(|| GatewayError::LogicalModelNotFound {
                logical_model: logical_model_id.to_string(),
            })?;
        if !model.enabled {
            return Err(GatewayError::LogicalModelDisabled {
                logical_model: logical_model_id.to_string(),
            });
        }
        Ok(model)
    }
}

/// Order-independent hash of an authorization set, used as part of the
/// availability cache key so two callers with the same effective providers
/// (regardless of `HashSet` iteration order) share a cache entry.
fn hash_provider_set(effective_provider_ids: &HashSet<String>) -> u64 {
    let mut sorted: Vec<&str> = effective_provider_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for id in sorted {
        id.hash(&mut hasher);
    }
    hasher.finish()
}

/// Same heuristic as [`crate::models::ChatRequest::requires_tool_use`], read
/// off the raw JSON payload `check_candidate_availability` is given instead
/// of a typed `ChatRequest`.
fn payload_requires_tool_use(payload: Option<&serde_json::Value>) -> bool {
    payload
        .and_then(|p| p.get("tools"))
        .and_then(|t| t.as_array())
        .is_some_and(|arr| !arr.is_empty())
}

/// `score = base − α·norm_lat − β·err − γ·cost_score − δ·quota_pen`.
/// `cost_score` is currently always zero — see `DESIGN.md` for why the term
/// is kept on the formula rather than dropped.
fn score_candidate(
    base: f64,
    metrics: &crate::models::RoutingMetrics,
    strategy: &SchedulingStrategy,
) -> f64 {
    let norm_lat = (metrics.p95_latency_ms / 4000.0).clamp(0.0, 1.0);
    let err = metrics.error_rate;
    let cost_score = 0.0;
    let quota_pen = crate::routing::state::quota_penalty(metrics.status);

    base - strategy.alpha * norm_lat - strategy.beta * err - strategy.gamma * cost_score
        - strategy.delta * quota_pen
}

/// Re-ranks the top [`STICKY_RERANK_WINDOW`] score-sorted candidates with a
/// single weighted-random draw over `max(score, 0)`. If every one of those
/// scores is non-positive, falls back to a uniform draw so the system
/// doesn't always pick the same index-0 candidate when scoring degenerates.
fn reorder_by_weighted_draw(scored: &mut [CandidateScore]) {
    let window_len = scored.len().min(STICKY_RERANK_WINDOW);
    if window_len <= 1 {
        return;
    }
    let window = &scored[..window_len];
    let weights: Vec<f64> = window.iter().map(|c| c.score.max(0.0)).collect();
    let total: f64 = weights.iter().sum();

    let chosen = if total <= 0.0 {
        rand::thread_rng().gen_range(0..window_len)
    } else {
        let draw: f64 = rand::thread_rng().gen::<f64>() * total;
        let mut cumulative = 0.0;
        let mut idx = window_len - 1;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w;
            if draw <= cumulative {
                idx = i;
                break;
            }
        }
        idx
    };

    if chosen != 0 {
        scored[0..window_len].swap(0, chosen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RoutingMetrics, Transport};

    fn metrics(status: HealthStatus) -> RoutingMetrics {
        RoutingMetrics {
            avg_latency_ms: 1000.0,
            p95_latency_ms: 1000.0,
            p99_latency_ms: 1000.0,
            error_rate: 0.0,
            status,
            total_samples: 10,
        }
    }

    #[test]
    fn healthy_candidate_scores_above_down_candidate() {
        let strategy = SchedulingStrategy::BALANCED;
        let healthy = score_candidate(1.0, &metrics(HealthStatus::Healthy), &strategy);
        let down = score_candidate(1.0, &metrics(HealthStatus::Down), &strategy);
        assert!(healthy > down);
    }

    #[test]
    fn reorder_is_noop_on_single_candidate() {
        let upstream = PhysicalModel {
            provider_id: "openai".to_string(),
            model_id: "gpt-4o".to_string(),
            endpoint: "https://api.openai.com".to_string(),
            base_weight: 1.0,
            region: None,
            max_qps: None,
            api_style: ApiStyle::OpenAi,
            transport: Transport::Http,
            capabilities: HashSet::new(),
            enabled: true,
        };
        let mut scored = vec![CandidateScore {
            upstream,
            metrics: metrics(HealthStatus::Healthy),
            score: 1.0,
        }];
        reorder_by_weighted_draw(&mut scored);
        assert_eq!(scored.len(), 1);
    }

    fn upstream(provider_id: &str, enabled: bool, capabilities: HashSet<Capability>) -> PhysicalModel {
        PhysicalModel {
            provider_id: provider_id.to_string(),
            model_id: "m".to_string(),
            endpoint: "https://example.invalid".to_string(),
            base_weight: 1.0,
            region: None,
            max_qps: None,
            api_style: ApiStyle::OpenAi,
            transport: Transport::Http,
            capabilities,
            enabled,
        }
    }

    fn logical_model(id: &str, enabled: bool, upstreams: Vec<PhysicalModel>) -> LogicalModel {
        LogicalModel {
            logical_id: id.to_string(),
            capabilities: HashSet::from([Capability::Chat]),
            enabled,
            upstreams,
        }
    }

    fn selector_with(models: Vec<LogicalModel>) -> ProviderSelector {
        let catalog = Arc::new(LogicalModelCatalog::new(models));
        let routing_state = Arc::new(RoutingStateService::disconnected(crate::routing::CooldownConfig::default()));
        let sessions = Arc::new(SessionManager::new(None));
        ProviderSelector::new(catalog, routing_state, sessions, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn check_candidate_availability_excludes_a_model_with_no_authorized_provider() {
        let selector = selector_with(vec![logical_model(
            "gpt-4",
            true,
            vec![upstream("openai", true, HashSet::from([Capability::Chat]))],
        )]);
        let effective = HashSet::from(["azure".to_string()]);

        let feasible = selector
            .check_candidate_availability(&["gpt-4".to_string()], &effective, ApiStyle::OpenAi, None, None)
            .await;
        assert!(feasible.is_empty());
    }

    #[tokio::test]
    async fn check_candidate_availability_is_feasible_via_one_of_two_upstreams() {
        let selector = selector_with(vec![logical_model(
            "gpt-4",
            true,
            vec![
                upstream("openai", false, HashSet::from([Capability::Chat])),
                upstream("azure", true, HashSet::from([Capability::Chat])),
            ],
        )]);
        let effective = HashSet::from(["openai".to_string(), "azure".to_string()]);

        let feasible = selector
            .check_candidate_availability(&["gpt-4".to_string()], &effective, ApiStyle::OpenAi, None, None)
            .await;
        assert_eq!(feasible, vec!["gpt-4".to_string()]);
    }

    #[tokio::test]
    async fn check_candidate_availability_excludes_a_model_lacking_tool_use_when_payload_needs_it() {
        let selector = selector_with(vec![logical_model(
            "gpt-4",
            true,
            vec![upstream("openai", true, HashSet::from([Capability::Chat]))],
        )]);
        let effective = HashSet::from(["openai".to_string()]);
        let payload = serde_json::json!({ "tools": [{"type": "function", "function": {"name": "x"}}] });

        let feasible = selector
            .check_candidate_availability(&["gpt-4".to_string()], &effective, ApiStyle::OpenAi, Some(&payload), None)
            .await;
        assert!(feasible.is_empty());
    }

    #[test]
    fn all_zero_scores_fall_back_to_uniform_without_panicking() {
        let mk = |id: &str| PhysicalModel {
            provider_id: id.to_string(),
            model_id: "m".to_string(),
            endpoint: "https://x".to_string(),
            base_weight: 0.0,
            region: None,
            max_qps: None,
            api_style: ApiStyle::OpenAi,
            transport: Transport::Http,
            capabilities: HashSet::new(),
            enabled: true,
        };
        let mut scored = vec![
            CandidateScore {
                upstream: mk("a"),
                metrics: metrics(HealthStatus::Healthy),
                score: 0.0,
            },
            CandidateScore {
                upstream: mk("b"),
                metrics: metrics(HealthStatus::Healthy),
                score: 0.0,
            },
        ];
        reorder_by_weighted_draw(&mut scored);
        assert_eq!(scored.len(), 2);
    }
}
