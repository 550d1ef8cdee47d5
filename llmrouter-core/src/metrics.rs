//! # Metrics Buffer
//!
//! In-memory aggregator that absorbs per-request latency/error samples off
//! the request path and folds them into the durable routing-metrics history
//! on a timer, trading a bounded amount of staleness for far less write
//! pressure on the state store. Mirrors the teacher's background-task idiom
//! (a channel feeding a single owning task) used for the provider health
//! poller.

use crate::models::{HealthStatus, RoutingMetrics};
use crate::routing::RoutingStateService;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

const RESERVOIR_CAP: usize = 256;

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct MetricsKey {
    pub logical_model: String,
    pub provider_id: String,
}

struct Sample {
    key: MetricsKey,
    success: bool,
    latency_ms: f64,
}

#[derive(Default)]
struct Bucket {
    total: u64,
    success: u64,
    error: u64,
    latency_sum: f64,
    reservoir: Vec<f64>,
    seen: u64,
}

impl Bucket {
    fn observe(&mut self, success: bool, latency_ms: f64) {
        self.total += 1;
        if success {
            self.success += 1;
        } else {
            self.error += 1;
        }
        self.latency_sum += latency_ms;
        self.seen += 1;

        if self.reservoir.len() < RESERVOIR_CAP {
            self.reservoir.push(latency_ms);
        } else {
            let idx = (rand::random::<u64>() % self.seen) as usize;
            if idx < RESERVOIR_CAP {
                self.reservoir[idx] = latency_ms;
            }
        }
    }

    fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.error as f64 / self.total as f64
        }
    }

    fn avg(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.latency_sum / self.total as f64
        }
    }

    fn p95(&self) -> f64 {
        percentile(&self.reservoir, 0.95)
    }

    fn p99(&self) -> f64 {
        percentile(&self.reservoir, 0.99)
    }

    fn status(&self) -> HealthStatus {
        status_from_error_rate(self.error_rate())
    }
}

/// Shared by [`Bucket::status`] and the routing state service's merge-on-flush
/// so a re-aggregated error rate is classified the same way a fresh one is.
pub(crate) fn status_from_error_rate(rate: f64) -> HealthStatus {
    if rate >= 0.5 {
        HealthStatus::Down
    } else if rate >= 0.1 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Handle held by producers (the candidate executor). Cloning is cheap; the
/// sender side of the channel is the only state it carries.
#[derive(Clone)]
pub struct MetricsBuffer {
    sender: mpsc::Sender<Sample>,
    /// Fraction of *successful* samples actually recorded; failures are
    /// always recorded in full so the error rate never gets diluted by
    /// sampling. `1.0` disables sampling entirely.
    success_sample_rate: f64,
}

impl MetricsBuffer {
    /// Spawns the owning flusher task and returns a handle. `key_cap` bounds
    /// how many distinct `(logical_model, provider)` buckets may accumulate
    /// before an early flush fires, regardless of the timer.
    pub fn spawn(
        routing_state: Arc<RoutingStateService>,
        flush_interval: Duration,
        channel_cap: usize,
        key_cap: usize,
        success_sample_rate: f64,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(channel_cap);
        tokio::spawn(run_flusher(receiver, routing_state, flush_interval, key_cap));
        Self {
            sender,
            success_sample_rate: success_sample_rate.clamp(0.0, 1.0),
        }
    }

    /// Non-blocking from the caller's perspective: if the channel is full,
    /// the sample is dropped rather than stalling the request path. A
    /// successful sample is itself randomly dropped at `1 - success_sample_rate`
    /// to cap write volume on high-QPS candidates without losing failure signal.
    pub fn record_sample(&self, key: MetricsKey, success: bool, latency_ms: f64) {
        if success && self.success_sample_rate < 1.0 && rand::random::<f64>() > self.success_sample_rate {
            return;
        }
        let sample = Sample { key, success, latency_ms };
        if self.sender.try_send(sample).is_err() {
            tracing::debug!("metrics buffer channel full, dropping sample");
        }
    }
}

async fn run_flusher(
    mut receiver: mpsc::Receiver<Sample>,
    routing_state: Arc<RoutingStateService>,
    flush_interval: Duration,
    key_cap: usize,
) {
    let mut buckets: HashMap<MetricsKey, Bucket> = HashMap::new();
    let mut ticker = interval(flush_interval);

    loop {
        tokio::select! {
            maybe_sample = receiver.recv() => {
                match maybe_sample {
                    Some(sample) => {
                        buckets.entry(sample.key).or_default().observe(sample.success, sample.latency_ms);
                        if buckets.len() >= key_cap {
                            flush(&routing_state, &mut buckets).await;
                        }
                    }
                    None => {
                        flush(&routing_state, &mut buckets).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                flush(&routing_state, &mut buckets).await;
            }
        }
    }
}

async fn flush(routing_state: &RoutingStateService, buckets: &mut HashMap<MetricsKey, Bucket>) {
    if buckets.is_empty() {
        return;
    }
    for (key, bucket) in buckets.drain() {
        let metrics = RoutingMetrics {
            avg_latency_ms: bucket.avg(),
            p95_latency_ms: bucket.p95(),
            p99_latency_ms: bucket.p99(),
            error_rate: bucket.error_rate(),
            status: bucket.status(),
            total_samples: bucket.total,
        };
        routing_state
            .upsert_metrics(&key.logical_model, &key.provider_id, &metrics)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_tracks_error_rate_and_status() {
        let mut bucket = Bucket::default();
        for _ in 0..8 {
            bucket.observe(true, 100.0);
        }
        for _ in 0..2 {
            bucket.observe(false, 100.0);
        }
        assert!((bucket.error_rate() - 0.2).abs() < f64::EPSILON);
        assert_eq!(bucket.status(), HealthStatus::Degraded);
    }

    #[test]
    fn p95_of_uniform_samples_is_near_the_top() {
        let mut bucket = Bucket::default();
        for i in 1..=100 {
            bucket.observe(true, i as f64);
        }
        assert!(bucket.p95() >= 90.0);
    }

    #[test]
    fn p99_is_at_least_p95_and_avg_is_the_mean() {
        let mut bucket = Bucket::default();
        for i in 1..=100 {
            bucket.observe(true, i as f64);
        }
        assert!(bucket.p99() >= bucket.p95());
        assert!((bucket.avg() - 50.5).abs() < f64::EPSILON);
    }

    #[test]
    fn merge_weights_by_sample_count() {
        let existing = RoutingMetrics {
            avg_latency_ms: 100.0,
            p95_latency_ms: 100.0,
            p99_latency_ms: 100.0,
            error_rate: 0.0,
            status: HealthStatus::Healthy,
            total_samples: 90,
        };
        let fresh = RoutingMetrics {
            avg_latency_ms: 1100.0,
            p95_latency_ms: 1100.0,
            p99_latency_ms: 1100.0,
            error_rate: 1.0,
            status: HealthStatus::Down,
            total_samples: 10,
        };
        let merged = crate::routing::state::merge_routing_metrics(&existing, &fresh);
        assert_eq!(merged.total_samples, 100);
        assert!((merged.avg_latency_ms - 200.0).abs() < f64::EPSILON);
        assert!((merged.error_rate - 0.1).abs() < f64::EPSILON);
        assert_eq!(merged.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn record_sample_does_not_block_when_channel_is_full() {
        let routing_state = Arc::new(RoutingStateService::disconnected(Default::default()));
        let buffer = MetricsBuffer::spawn(routing_state, Duration::from_secs(60), 1, 1000, 1.0);
        for _ in 0..10 {
            buffer.record_sample(
                MetricsKey {
                    logical_model: "gpt-4".to_string(),
                    provider_id: "openai".to_string(),
                },
                true,
                50.0,
            );
        }
    }
}
