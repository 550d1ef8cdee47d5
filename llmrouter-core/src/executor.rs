//! # Candidate Executor
//!
//! Given an ordered candidate list from [`crate::routing::ProviderSelector`],
//! tries each upstream in turn until one succeeds, a non-retryable failure
//! decides the outcome, or the list is exhausted. Records per-provider
//! success/failure with the routing state service and pushes a latency
//! sample to the metrics buffer for every attempt.

use crate::error::{GatewayError, ProviderError};
use crate::metrics::{MetricsBuffer, MetricsKey};
use crate::models::{CandidateScore, ChatRequest, ChatResponse};
use crate::routing::RoutingStateService;
use crate::transport::{ByteStream, TransportRegistry, UpstreamTarget};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Per-provider credentials the executor needs to build an [`UpstreamTarget`].
/// Kept separate from [`crate::models::PhysicalModel`] because credentials
/// are gateway configuration, not routing data.
#[derive(Clone, Debug)]
pub struct ProviderCredentials {
    pub api_key: String,
    pub extra_headers: HashMap<String, String>,
}

#[derive(Debug)]
pub struct UnaryOutcome {
    pub response: ChatResponse,
    pub provider_id: String,
    pub model_id: String,
    pub attempted: usize,
    pub skipped: usize,
}

pub struct StreamOutcome {
    pub bytes: ByteStream,
    pub provider_id: String,
    pub model_id: String,
}

pub struct CandidateExecutor {
    transports: Arc<TransportRegistry>,
    routing_state: Arc<RoutingStateService>,
    metrics: Arc<MetricsBuffer>,
    credentials: HashMap<String, ProviderCredentials>,
}

impl CandidateExecutor {
    pub fn new(
        transports: Arc<TransportRegistry>,
        routing_state: Arc<RoutingStateService>,
        metrics: Arc<MetricsBuffer>,
        credentials: HashMap<String, ProviderCredentials>,
    ) -> Self {
        Self {
            transports,
            routing_state,
            metrics,
            credentials,
        }
    }

    fn target_for(&self, candidate: &CandidateScore) -> Result<UpstreamTarget, ProviderError> {
        let creds = self
            .credentials
            .get(&candidate.upstream.provider_id)
            .ok_or_else(|| ProviderError::Configuration {
                message: format!(
                    "no credentials configured for provider {}",
                    candidate.upstream.provider_id
                ),
            })?;
        Ok(UpstreamTarget {
            endpoint: candidate.upstream.endpoint.clone(),
            model_id: candidate.upstream.model_id.clone(),
            api_key: creds.api_key.clone(),
            extra_headers: creds.extra_headers.clone(),
        })
    }

    /// `on_success`/`on_failure` let the caller bind sessions and trigger
    /// billing/audit hooks without the executor needing to know about them.
    /// `cancel` is observed between candidates and during each in-flight
    /// attempt, so an abandoned client request stops retrying immediately
    /// instead of running the candidate list to exhaustion. The cooldown
    /// check is advisory: a candidate whose failure count is at or past
    /// threshold is skipped unless it is the last remaining candidate and
    /// `allow_cooldown_bypass` is set (used by probes that need to confirm
    /// whether a cooling-down provider has actually recovered).
    pub async fn try_unary(
        &self,
        candidates: &[CandidateScore],
        request: &ChatRequest,
        logical_model_id: &str,
        cancel: &CancellationToken,
        allow_cooldown_bypass: bool,
        mut on_success: impl FnMut(&str, &str),
        mut on_failure: impl FnMut(&str, bool),
    ) -> Result<UnaryOutcome, GatewayError> {
        let mut attempted = 0usize;
        let mut skipped = 0usize;
        let mut last_failure: Option<(Option<u16>, String)> = None;

        for (idx, candidate) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(GatewayError::Canceled);
            }
            let is_last = idx == candidates.len() - 1;
            if !(is_last && allow_cooldown_bypass) {
                let cooldown = self
                    .routing_state
                    .get_failure_cooldown_status(&candidate.upstream.provider_id)
                    .await;
                if cooldown.should_skip {
                    skipped += 1;
                    continue;
                }
            }
            let target = match self.target_for(candidate) {
                Ok(t) => t,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            let Some(adapter) = self.transports.get(candidate.upstream.api_style) else {
                skipped += 1;
                continue;
            };

            attempted += 1;
            let started = Instant::now();
            let result = tokio::select! {
                result = adapter.unary(&target, request) => result,
                _ = cancel.cancelled() => return Err(GatewayError::Canceled),
            };
            let elapsed = started.elapsed();
            let provider_id = candidate.upstream.provider_id.clone();

            match result {
                Ok(response) => {
                    self.record_sample(logical_model_id, &provider_id, elapsed, true);
                    self.routing_state.clear_provider_failure(&provider_id).await;
                    self.routing_state.record_success(
                        logical_model_id.to_string(),
                        provider_id.clone(),
                        candidate.upstream.base_weight,
                    );
                    on_success(&provider_id, &candidate.upstream.model_id);
                    return Ok(UnaryOutcome {
                        response,
                        provider_id,
                        model_id: candidate.upstream.model_id.clone(),
                        attempted,
                        skipped,
                    });
                }
                Err(err) => {
                    self.record_sample(logical_model_id, &provider_id, elapsed, false);
                    let retryable = err.is_retryable();
                    self.note_failure(logical_model_id, &provider_id, candidate.upstream.base_weight, retryable)
                        .await;
                    on_failure(&provider_id, retryable);
                    last_failure = Some(status_and_message(&err));
                }
            }
        }

        let (last_status, last_message) = last_failure
            .unwrap_or((None, "no candidate was attempted".to_string()));
        Err(GatewayError::UpstreamAllFailed {
            attempted,
            skipped,
            last_status,
            last_message,
        })
    }

    /// Streaming mirrors `try_unary` up to the point a candidate connects;
    /// once the transport hands back a byte stream, failover is no longer
    /// possible — a later chunk-read error cannot be retried against a
    /// different candidate because bytes may already have reached the
    /// client. `on_first_chunk` fires when the first byte is pulled from the
    /// wrapped stream and `on_stream_complete` when it is exhausted; both
    /// are driven by the caller polling the returned stream, not by this
    /// method returning.
    pub async fn try_stream(
        &self,
        candidates: &[CandidateScore],
        request: &ChatRequest,
        logical_model_id: &str,
        cancel: &CancellationToken,
        allow_cooldown_bypass: bool,
        on_first_chunk: impl FnOnce(&str, &str) + Send + 'static,
        on_stream_complete: impl FnOnce(&str) + Send + 'static,
        mut on_failure: impl FnMut(&str, bool),
    ) -> Result<StreamOutcome, GatewayError> {
        let mut attempted = 0usize;
        let mut skipped = 0usize;
        let mut last_failure: Option<(Option<u16>, String)> = None;

        for (idx, candidate) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(GatewayError::Canceled);
            }
            let is_last = idx == candidates.len() - 1;
            if !(is_last && allow_cooldown_bypass) {
                let cooldown = self
                    .routing_state
                    .get_failure_cooldown_status(&candidate.upstream.provider_id)
                    .await;
                if cooldown.should_skip {
                    skipped += 1;
                    continue;
                }
            }
            let target = match self.target_for(candidate) {
                Ok(t) => t,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            let Some(adapter) = self.transports.get(candidate.upstream.api_style) else {
                skipped += 1;
                continue;
            };

            attempted += 1;
            let started = Instant::now();
            let result = tokio::select! {
                result = adapter.stream(&target, request) => result,
                _ = cancel.cancelled() => return Err(GatewayError::Canceled),
            };
            let provider_id = candidate.upstream.provider_id.clone();

            match result {
                Ok(bytes) => {
                    self.record_sample(logical_model_id, &provider_id, started.elapsed(), true);
                    self.routing_state.clear_provider_failure(&provider_id).await;
                    self.routing_state.record_success(
                        logical_model_id.to_string(),
                        provider_id.clone(),
                        candidate.upstream.base_weight,
                    );
                    let model_id = candidate.upstream.model_id.clone();
                    let wrapped = instrument_stream(
                        bytes,
                        provider_id.clone(),
                        model_id.clone(),
                        on_first_chunk,
                        on_stream_complete,
                    );
                    return Ok(StreamOutcome {
                        bytes: wrapped,
                        provider_id,
                        model_id,
                    });
                }
                Err(err) => {
                    self.record_sample(logical_model_id, &provider_id, started.elapsed(), false);
                    let retryable = err.is_retryable();
                    self.note_failure(logical_model_id, &provider_id, candidate.upstream.base_weight, retryable)
                        .await;
                    on_failure(&provider_id, retryable);
                    last_failure = Some(status_and_message(&err));
                }
            }
        }

        let (last_status, last_message) = last_failure
            .unwrap_or((None, "no candidate was attempted".to_string()));
        Err(GatewayError::UpstreamAllFailed {
            attempted,
            skipped,
            last_status,
            last_message,
        })
    }

    async fn note_failure(&self, logical_model_id: &str, provider_id: &str, base_weight: f64, retryable: bool) {
        self.routing_state.increment_provider_failure(provider_id).await;
        self.routing_state.record_failure(
            logical_model_id.to_string(),
            provider_id.to_string(),
            base_weight,
            retryable,
        );
    }

    fn record_sample(&self, logical_model: &str, provider_id: &str, elapsed: Duration, success: bool) {
        self.metrics.record_sample(
            MetricsKey {
                logical_model: logical_model.to_string(),
                provider_id: provider_id.to_string(),
            },
            success,
            elapsed.as_secs_f64() * 1000.0,
        );
    }
}

/// Wraps a transport's byte stream so the first successfully-yielded chunk
/// fires `on_first_chunk` and stream exhaustion fires `on_stream_complete`,
/// without the executor itself needing to own the relay loop.
fn instrument_stream(
    mut inner: ByteStream,
    provider_id: String,
    model_id: String,
    on_first_chunk: impl FnOnce(&str, &str) + Send + 'static,
    on_stream_complete: impl FnOnce(&str) + Send + 'static,
) -> ByteStream {
    use futures::StreamExt;

    Box::pin(async_stream::stream! {
        let mut first = Some(on_first_chunk);
        while let Some(item) = inner.next().await {
            if item.is_ok() {
                if let Some(cb) = first.take() {
                    cb(&provider_id, &model_id);
                }
            }
            yield item;
        }
        on_stream_complete(&provider_id);
    })
}

fn status_and_message(err: &ProviderError) -> (Option<u16>, String) {
    match err {
        ProviderError::Api { code, message } => (Some(*code), message.clone()),
        ProviderError::InvalidApiKey => (Some(401), err.to_string()),
        ProviderError::ModelNotFound { .. } => (Some(404), err.to_string()),
        ProviderError::RateLimit => (Some(429), err.to_string()),
        ProviderError::ServiceUnavailable => (Some(503), err.to_string()),
        _ => (None, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiStyle, Capability, HealthStatus, PhysicalModel, RoutingMetrics, Transport};
    use crate::routing::CooldownConfig;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFailsAdapter;

    #[async_trait]
    impl crate::transport::TransportAdapter for AlwaysFailsAdapter {
        async fn unary(&self, _target: &UpstreamTarget, _request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::Api { code: 500, message: "boom".to_string() })
        }

        async fn stream(&self, _target: &UpstreamTarget, _request: &ChatRequest) -> Result<ByteStream, ProviderError> {
            Err(ProviderError::Api { code: 500, message: "boom".to_string() })
        }
    }

    fn candidate(provider_id: &str) -> CandidateScore {
        CandidateScore {
            upstream: PhysicalModel {
                provider_id: provider_id.to_string(),
                model_id: "m".to_string(),
                endpoint: "https://example.invalid".to_string(),
                base_weight: 1.0,
                region: None,
                max_qps: None,
                api_style: ApiStyle::OpenAi,
                transport: Transport::Http,
                capabilities: HashSet::from([Capability::Chat]),
                enabled: true,
            },
            metrics: RoutingMetrics {
                avg_latency_ms: 100.0,
                p95_latency_ms: 100.0,
                p99_latency_ms: 100.0,
                error_rate: 0.0,
                status: HealthStatus::Healthy,
                total_samples: 10,
            },
            score: 1.0,
        }
    }

    fn executor_with(adapter: AlwaysFailsAdapter, credentials: HashMap<String, ProviderCredentials>) -> CandidateExecutor {
        let mut registry_adapters: HashMap<ApiStyle, Arc<dyn crate::transport::TransportAdapter>> = HashMap::new();
        registry_adapters.insert(ApiStyle::OpenAi, Arc::new(adapter));
        let registry = crate::transport::TransportRegistry::from_adapters(registry_adapters);
        let routing_state = Arc::new(RoutingStateService::disconnected(CooldownConfig::default()));
        let metrics = MetricsBuffer::spawn(routing_state.clone(), Duration::from_secs(60), 16, 1000, 1.0);
        CandidateExecutor::new(Arc::new(registry), routing_state, Arc::new(metrics), credentials)
    }

    #[tokio::test]
    async fn missing_credentials_are_skipped_not_fatal() {
        let executor = executor_with(AlwaysFailsAdapter, HashMap::new());
        let candidates = vec![candidate("openai")];
        let request = ChatRequest::default();

        let failures = AtomicUsize::new(0);
        let cancel = CancellationToken::new();
        let result = executor
            .try_unary(&candidates, &request, "gpt-4", &cancel, false, |_, _| {}, |_, _| {
                failures.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(result.is_err());
        assert_eq!(failures.load(Ordering::SeqCst), 0);
        match result.unwrap_err() {
            GatewayError::UpstreamAllFailed { attempted, skipped, .. } => {
                assert_eq!(attempted, 0);
                assert_eq!(skipped, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn pre_cancelled_token_stops_before_any_attempt() {
        let mut credentials = HashMap::new();
        credentials.insert(
            "openai".to_string(),
            ProviderCredentials { api_key: "sk-test".to_string(), extra_headers: HashMap::new() },
        );
        let executor = executor_with(AlwaysFailsAdapter, credentials);
        let candidates = vec![candidate("openai")];
        let request = ChatRequest::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor
            .try_unary(&candidates, &request, "gpt-4", &cancel, false, |_, _| {}, |_, _| {})
            .await;
        assert!(matches!(result, Err(GatewayError::Canceled)));
    }

    #[tokio::test]
    async fn failing_candidate_reports_last_status() {
        let mut credentials = HashMap::new();
        credentials.insert(
            "openai".to_string(),
            ProviderCredentials { api_key: "sk-test".to_string(), extra_headers: HashMap::new() },
        );
        let executor = executor_with(AlwaysFailsAdapter, credentials);
        let candidates = vec![candidate("openai")];
        let request = ChatRequest::default();

        let cancel = CancellationToken::new();
        let result = executor
            .try_unary(&candidates, &request, "gpt-4", &cancel, false, |_, _| {}, |_, _| {})
            .await;

        match result.unwrap_err() {
            GatewayError::UpstreamAllFailed { attempted, last_status, .. } => {
                assert_eq!(attempted, 1);
                assert_eq!(last_status, Some(500));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // Cooldown-skip and `allow_cooldown_bypass` read `get_failure_cooldown_status`,
    // which only ever reports a nonzero count against a live Redis connection;
    // `RoutingStateService::disconnected` (used by every test in this module)
    // always reports `count: 0`, so there is no candidate these tests can put
    // into cooldown without one. Exercising the S3 all-cooldown path needs a
    // `RoutingStateService` backed by a real Redis instance.
}
