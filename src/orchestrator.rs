// =============================================================================
// orchestrator.rs — THE RACE DIRECTOR
// =============================================================================
//
// One tracking value in, at most one result out.
//
// 1. Unless the caller forces a refresh, a fresh cache entry short-circuits
//    everything. No adapter runs.
// 2. Every primary-tier adapter starts at once, sharing one cancellation
//    token. First non-empty result wins, goes into the cache, and the token
//    is cancelled so the stragglers can stop.
// 3. Only if the whole primary tier comes up empty does the deferred tier
//    (CAPTCHA people, basically) get its own race. The two tiers never
//    race each other.
// 4. Adapter errors never escape. They become `error` progress events and
//    that is the end of them.
//
// The winner is returned straight away. Whoever was still running is handed
// to a background drain: they see the cancelled token, and whatever they
// settle with is reported as progress and then thrown away.
// =============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::{AdapterRegistry, CarrierAdapter, Tier};
use crate::cache::LookupCache;
use crate::config::Config;
use crate::error::AdapterError;
use crate::metrics::MetricsCollector;
use crate::models::{AdapterProgress, ProgressStatus, TrackingResult};

/// Progress callback. Shared with the drain that reports race losers after
/// the lookup has already returned, so it owns whatever it captures.
pub type ProgressFn = Arc<dyn Fn(AdapterProgress) + Send + Sync>;

type Outcome = Result<Option<TrackingResult>, AdapterError>;

/// For callers that don't care about progress.
pub fn ignore_progress() -> ProgressFn {
    Arc::new(|_| {})
}

pub struct Orchestrator {
    registry: AdapterRegistry,
    cache: LookupCache,
    metrics: Arc<MetricsCollector>,
    adapter_timeout: Duration,
}

impl Orchestrator {
    pub fn new(registry: AdapterRegistry, config: &Config, metrics: Arc<MetricsCollector>) -> Self {
        info!(
            adapters = ?registry,
            cache_ttl_secs = config.cache_ttl.as_secs(),
            adapter_timeout_secs = config.adapter_timeout.as_secs(),
            "Orchestrator ready"
        );
        Self {
            registry,
            cache: LookupCache::new(config.cache_ttl, config.cache_capacity),
            metrics,
            adapter_timeout: config.adapter_timeout,
        }
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Look up one value. `on_progress` fires for every adapter that gets
    /// a turn; whether anyone listens has no effect on the outcome.
    pub async fn lookup(
        &self,
        value: &str,
        on_progress: &ProgressFn,
        force_refresh: bool,
    ) -> Option<TrackingResult> {
        self.lookup_with_cancel(value, on_progress, force_refresh, &CancellationToken::new())
            .await
    }

    /// Same as `lookup`, but every race token is a child of `parent`, so
    /// cancelling `parent` reaches every adapter in flight and returns
    /// `None` without waiting for them.
    pub async fn lookup_with_cancel(
        &self,
        value: &str,
        on_progress: &ProgressFn,
        force_refresh: bool,
        parent: &CancellationToken,
    ) -> Option<TrackingResult> {
        self.metrics.record_lookup();

        if !force_refresh {
            if let Some(hit) = self.cache.get(value) {
                self.metrics.record_cache_hit();
                info!(value, carrier = %hit.carrier, "Cache hit, skipping carrier race");
                return Some(hit);
            }
        }

        for tier in [Tier::Primary, Tier::Deferred] {
            if parent.is_cancelled() {
                debug!(value, "Lookup cancelled before {} tier", tier);
                return None;
            }

            let adapters = self.registry.tier(tier);
            if adapters.is_empty() {
                continue;
            }

            if let Some(result) = self.race(value, tier, &adapters, on_progress, parent).await {
                return Some(result);
            }
        }

        if !parent.is_cancelled() {
            self.metrics.record_exhausted();
            info!(value, "Every carrier in every tier came up empty");
        }
        None
    }

    async fn race(
        &self,
        value: &str,
        tier: Tier,
        adapters: &[Arc<dyn CarrierAdapter>],
        on_progress: &ProgressFn,
        parent: &CancellationToken,
    ) -> Option<TrackingResult> {
        let token = parent.child_token();
        // Whatever happens below, the stragglers get told to stop.
        let _cancel_on_exit = token.clone().drop_guard();
        let timeout = self.adapter_timeout;

        info!(value, %tier, racers = adapters.len(), "Starting carrier race");

        let mut racers = FuturesUnordered::new();
        for adapter in adapters {
            emit(on_progress, adapter.as_ref(), ProgressStatus::Searching, None);
            self.metrics.record_invocation();

            let adapter = Arc::clone(adapter);
            let token = token.clone();
            let value = value.to_string();
            racers.push(async move {
                let outcome = match tokio::time::timeout(timeout, adapter.track(&value, token)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AdapterError::Timeout { after: timeout }),
                };
                (adapter, outcome)
            });
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = parent.cancelled() => None,
                next = racers.next() => Some(next),
            };

            let Some(next) = next else {
                debug!(value, %tier, still_running = racers.len(), "Lookup cancelled mid-race");
                token.cancel();
                self.drain_losers(value, racers, on_progress);
                return None;
            };
            let Some((adapter, outcome)) = next else {
                break;
            };

            match outcome {
                Ok(Some(mut result)) if !result.is_empty() => {
                    result.fetched_at = Some(Utc::now());
                    self.cache.put(value, result.clone());
                    self.metrics.record_win(tier);
                    emit(on_progress, adapter.as_ref(), ProgressStatus::Found, None);
                    token.cancel();

                    info!(
                        value,
                        %tier,
                        adapter = adapter.id(),
                        containers = result.containers.len(),
                        still_running = racers.len(),
                        "Carrier race won"
                    );
                    self.drain_losers(value, racers, on_progress);
                    return Some(result);
                }
                miss => report_miss(&self.metrics, on_progress, value, adapter.as_ref(), miss),
            }
        }

        debug!(value, %tier, "Tier exhausted without a winner");
        None
    }

    /// Let the remaining racers settle in the background. Late answers are
    /// reported as `no-result`; nothing they return reaches the cache.
    fn drain_losers<F>(&self, value: &str, mut racers: FuturesUnordered<F>, on_progress: &ProgressFn)
    where
        F: Future<Output = (Arc<dyn CarrierAdapter>, Outcome)> + Send + 'static,
    {
        if racers.is_empty() {
            return;
        }

        let metrics = Arc::clone(&self.metrics);
        let on_progress = Arc::clone(on_progress);
        let value = value.to_string();
        tokio::spawn(async move {
            while let Some((adapter, outcome)) = racers.next().await {
                let outcome = match outcome {
                    Ok(Some(late)) if !late.is_empty() => {
                        debug!(value = %value, adapter = adapter.id(), "Late answer discarded");
                        Ok(None)
                    }
                    other => other,
                };
                report_miss(&metrics, &on_progress, &value, adapter.as_ref(), outcome);
            }
        });
    }
}

fn report_miss(
    metrics: &MetricsCollector,
    on_progress: &ProgressFn,
    value: &str,
    adapter: &dyn CarrierAdapter,
    outcome: Outcome,
) {
    match outcome {
        Err(e) => {
            metrics.record_adapter_error();
            warn!(value, adapter = adapter.id(), error = %e, "Carrier adapter failed");
            emit(on_progress, adapter, ProgressStatus::Error, Some(e.to_string()));
        }
        Ok(_) => {
            metrics.record_no_result();
            debug!(value, adapter = adapter.id(), "Carrier has nothing for this value");
            emit(on_progress, adapter, ProgressStatus::NoResult, None);
        }
    }
}

fn emit(
    on_progress: &ProgressFn,
    adapter: &dyn CarrierAdapter,
    status: ProgressStatus,
    detail: Option<String>,
) {
    on_progress(AdapterProgress {
        adapter_id: adapter.id().to_string(),
        adapter_name: adapter.display_name().to_string(),
        status,
        detail,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::{result_with, ScriptedAdapter, Step};
    use parking_lot::Mutex;

    fn orchestrator(registry: AdapterRegistry) -> Orchestrator {
        Orchestrator::new(registry, &Config::default(), Arc::new(MetricsCollector::new()))
    }

    fn recorder() -> (Arc<Mutex<Vec<(String, ProgressStatus)>>>, ProgressFn) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Arc::new(move |p: AdapterProgress| sink.lock().push((p.adapter_id, p.status))))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_wins_and_losers_are_cancelled() {
        let slow = ScriptedAdapter::found("slow", result_with("SLOW", "B-SLOW", "AAAU0000001"))
            .after(Duration::from_millis(500))
            .shared();
        let fast = ScriptedAdapter::found("fast", result_with("FAST", "B-FAST", "AAAU0000001"))
            .after(Duration::from_millis(10))
            .shared();
        let orch = orchestrator(AdapterRegistry::new().with(slow.clone()).with(fast.clone()));

        let (seen, sink) = recorder();
        let result = orch.lookup("AAAU0000001", &sink, false).await.unwrap();
        assert_eq!(result.carrier, "FAST");
        assert!(result.fetched_at.is_some());
        assert_eq!(slow.calls(), 1);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(slow.saw_cancel());
        assert_eq!(
            *seen.lock(),
            vec![
                ("slow".to_string(), ProgressStatus::Searching),
                ("fast".to_string(), ProgressStatus::Searching),
                ("fast".to_string(), ProgressStatus::Found),
                ("slow".to_string(), ProgressStatus::NoResult),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_loser_settling_after_winner_is_reported_not_used() {
        let fast = ScriptedAdapter::found("fast", result_with("FAST", "B1", "ABCU1234567"))
            .after(Duration::from_millis(10))
            .shared();
        let failing = ScriptedAdapter::failing("flaky", "HTTP 503")
            .after(Duration::from_millis(50))
            .stubborn()
            .shared();
        let late = ScriptedAdapter::found("late", result_with("LATE", "B-LATE", "ABCU1234567"))
            .after(Duration::from_millis(80))
            .stubborn()
            .shared();
        let orch = orchestrator(AdapterRegistry::new().with(fast).with(failing).with(late));

        let (seen, sink) = recorder();
        let started = tokio::time::Instant::now();
        let result = orch.lookup("B1", &sink, false).await.unwrap();
        assert_eq!(result.carrier, "FAST");
        assert!(started.elapsed() < Duration::from_millis(50));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let seen = seen.lock().clone();
        assert!(seen.contains(&("flaky".to_string(), ProgressStatus::Error)));
        assert!(seen.contains(&("late".to_string(), ProgressStatus::NoResult)));
        assert_eq!(
            seen.iter().filter(|(_, s)| *s == ProgressStatus::Found).count(),
            1
        );
        assert_eq!(orch.cache().get("B1").unwrap().carrier, "FAST");
        assert_eq!(orch.metrics().snapshot().primary_wins, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_only_result_wins() {
        let mut routed = TrackingResult::new("MSK");
        routed.port_of_loading = Some("Shanghai".into());
        routed.port_of_discharge = Some("Rotterdam".into());
        routed.eta = Some("2026-03-15".into());
        let orch = orchestrator(
            AdapterRegistry::new().with(ScriptedAdapter::found("msk", routed).shared()),
        );

        let (seen, sink) = recorder();
        let result = orch.lookup("B1", &sink, false).await.unwrap();
        assert_eq!(result.port_of_discharge.as_deref(), Some("Rotterdam"));
        assert_eq!(seen.lock()[1], ("msk".to_string(), ProgressStatus::Found));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_result_skips_adapters() {
        let adapter = ScriptedAdapter::found("msk", result_with("MSK", "B1", "ABCU1234567")).shared();
        let orch = orchestrator(AdapterRegistry::new().with(adapter.clone()));

        let first = orch.lookup("B1", &ignore_progress(), false).await.unwrap();
        tokio::time::advance(Duration::from_secs(600)).await;
        let (seen, sink) = recorder();
        let second = orch.lookup("b1", &sink, false).await.unwrap();

        assert_eq!(adapter.calls(), 1);
        assert_eq!(second.fetched_at, first.fetched_at);
        assert!(seen.lock().is_empty());
        assert_eq!(orch.metrics().snapshot().cache_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_reruns_race() {
        let adapter = ScriptedAdapter::found("msk", result_with("MSK", "B1", "ABCU1234567")).shared();
        let orch = orchestrator(AdapterRegistry::new().with(adapter.clone()));

        orch.lookup("B1", &ignore_progress(), false).await.unwrap();
        orch.lookup("B1", &ignore_progress(), true).await.unwrap();
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cache_entry_triggers_new_race() {
        let adapter = ScriptedAdapter::found("msk", result_with("MSK", "B1", "ABCU1234567")).shared();
        let orch = orchestrator(AdapterRegistry::new().with(adapter.clone()));

        orch.lookup("B1", &ignore_progress(), false).await.unwrap();
        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        orch.lookup("B1", &ignore_progress(), false).await.unwrap();
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_tier_untouched_when_primary_wins() {
        let primary = ScriptedAdapter::found("msk", result_with("MSK", "B1", "ABCU1234567"))
            .after(Duration::from_secs(5))
            .shared();
        let captcha = ScriptedAdapter::found("captcha", result_with("CAP", "B1", "ABCU1234567"))
            .deferred()
            .shared();
        let orch = orchestrator(AdapterRegistry::new().with(captcha.clone()).with(primary));

        let result = orch.lookup("B1", &ignore_progress(), false).await.unwrap();
        assert_eq!(result.carrier, "MSK");
        assert_eq!(captcha.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_tier_runs_after_primary_exhausted() {
        let primary = ScriptedAdapter::failing("msk", "blocked").shared();
        let captcha = ScriptedAdapter::found("captcha", result_with("CAP", "B1", "ABCU1234567"))
            .deferred()
            .shared();
        let orch = orchestrator(AdapterRegistry::new().with(primary).with(captcha.clone()));

        let (seen, sink) = recorder();
        let result = orch.lookup("B1", &sink, false).await.unwrap();
        assert_eq!(result.carrier, "CAP");
        assert_eq!(
            *seen.lock(),
            vec![
                ("msk".to_string(), ProgressStatus::Searching),
                ("msk".to_string(), ProgressStatus::Error),
                ("captcha".to_string(), ProgressStatus::Searching),
                ("captcha".to_string(), ProgressStatus::Found),
            ]
        );
        assert_eq!(orch.metrics().snapshot().deferred_wins, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_for_second_of_three_winning() {
        let first = ScriptedAdapter::nothing("first").shared();
        let second = ScriptedAdapter::found("second", result_with("TWO", "B2", "BBBU0000002"))
            .after(Duration::from_millis(20))
            .shared();
        let third = ScriptedAdapter::failing("third", "HTTP 500").shared();
        let orch = orchestrator(
            AdapterRegistry::new()
                .with(first)
                .with(second)
                .with(third),
        );

        let (seen, sink) = recorder();
        let result = orch.lookup("B2", &sink, false).await.unwrap();
        assert_eq!(result.carrier, "TWO");

        let seen = seen.lock().clone();
        assert_eq!(seen.len(), 6);
        assert!(seen[..3].iter().all(|(_, s)| *s == ProgressStatus::Searching));
        assert!(seen.contains(&("first".to_string(), ProgressStatus::NoResult)));
        assert!(seen.contains(&("third".to_string(), ProgressStatus::Error)));
        assert_eq!(seen[5], ("second".to_string(), ProgressStatus::Found));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_anywhere_resolves_none() {
        let orch = orchestrator(
            AdapterRegistry::new()
                .with(ScriptedAdapter::failing("a", "boom").shared())
                .with(ScriptedAdapter::nothing("b").shared())
                .with(ScriptedAdapter::nothing("c").deferred().shared()),
        );

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink: ProgressFn = {
            let errors = Arc::clone(&errors);
            Arc::new(move |p: AdapterProgress| {
                if p.status == ProgressStatus::Error {
                    errors.lock().push(p.detail.unwrap_or_default());
                }
            })
        };

        assert!(orch.lookup("NOPE", &sink, false).await.is_none());
        assert_eq!(*errors.lock(), vec!["boom".to_string()]);
        assert!(orch.cache().is_empty());
        assert_eq!(orch.metrics().snapshot().lookups_exhausted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_counts_as_no_result() {
        let orch = orchestrator(
            AdapterRegistry::new()
                .with(ScriptedAdapter::found("hollow", TrackingResult::new("HOLLOW")).shared()),
        );
        let (seen, sink) = recorder();
        assert!(orch.lookup("X", &sink, false).await.is_none());
        assert_eq!(seen.lock()[1].1, ProgressStatus::NoResult);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_adapter_hits_safety_timeout() {
        let mut config = Config::default();
        config.adapter_timeout = Duration::from_secs(3);
        let orch = Orchestrator::new(
            AdapterRegistry::new().with(ScriptedAdapter::new("stuck", Step::Hang).shared()),
            &config,
            Arc::new(MetricsCollector::new()),
        );

        let details = Arc::new(Mutex::new(Vec::new()));
        let sink: ProgressFn = {
            let details = Arc::clone(&details);
            Arc::new(move |p: AdapterProgress| {
                if let Some(d) = p.detail {
                    details.lock().push(d);
                }
            })
        };
        assert!(orch.lookup("X", &sink, false).await.is_none());
        assert_eq!(*details.lock(), vec!["no answer after 3s".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_discards_result() {
        let adapter = ScriptedAdapter::found("msk", result_with("MSK", "B1", "ABCU1234567"))
            .after(Duration::from_secs(1))
            .shared();
        let orch = orchestrator(AdapterRegistry::new().with(adapter.clone()));
        let parent = CancellationToken::new();

        let canceller = {
            let parent = parent.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                parent.cancel();
            }
        };
        let progress = ignore_progress();
        let (outcome, _) = tokio::join!(
            orch.lookup_with_cancel("B1", &progress, false, &parent),
            canceller
        );

        assert!(outcome.is_none());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(adapter.saw_cancel());
        assert!(orch.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_does_not_wait_for_adapters_that_ignore_it() {
        let orch = orchestrator(
            AdapterRegistry::new().with(ScriptedAdapter::new("stuck", Step::Hang).shared()),
        );
        let parent = CancellationToken::new();

        let canceller = {
            let parent = parent.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                parent.cancel();
            }
        };
        let started = tokio::time::Instant::now();
        let progress = ignore_progress();
        let (outcome, _) = tokio::join!(
            orch.lookup_with_cancel("B1", &progress, false, &parent),
            canceller
        );

        assert!(outcome.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(orch.metrics().snapshot().lookups_exhausted, 0);
    }
}
