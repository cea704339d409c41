// =============================================================================
// session.rs — THE DISPATCHER
// =============================================================================
//
// Turns whatever the user pasted into the search box into orchestrator
// calls, retries the ones that come back empty, and folds the winners into
// the session's shipment list.
//
// The rules:
//   - every value gets up to `max_attempts` (2) lookups, `retry_backoff`
//     (2s) apart
//   - more than one value? a fixed pool of `worker_pool_size` (2) lookups
//     in flight at once, the rest wait their turn
//   - results are folded in completion order, not input order
//   - every search bumps the generation; cancelling bumps it too. Anything
//     that finishes under an old generation is dropped on the floor.
//
// Workers never touch the shipment list. They hand outcomes back to the one
// loop that owns the session, which checks the generation before doing
// anything with them. That loop is the only writer, so no locks.
// =============================================================================

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{FailureReason, ValueFailure};
use crate::models::{AdapterProgress, ProgressStatus, TrackedShipment, TrackingResult};
use crate::orchestrator::{Orchestrator, ProgressFn};
use crate::reconcile::{IngestOutcome, ReconciliationEngine};

/// Everything the presentation layer might want to hear about.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    AdapterProgress {
        generation: u64,
        value: String,
        progress: AdapterProgress,
    },
    Retrying {
        value: String,
        attempt: u32,
        backoff: Duration,
    },
    ShipmentUpdated {
        value: String,
        created: bool,
        shipment: TrackedShipment,
    },
    BatchProgress {
        completed: usize,
        total: usize,
    },
    Finished {
        generation: u64,
        failures: Vec<ValueFailure>,
    },
    Cancelled {
        generation: u64,
    },
}

/// Cloneable remote control for a controller: lets another task cancel the
/// running search or check whether a generation is still live.
#[derive(Clone)]
pub struct SearchHandle {
    generation: Arc<AtomicU64>,
    current: Arc<Mutex<CancellationToken>>,
}

impl Default for SearchHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchHandle {
    pub fn new() -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            current: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// Start a new generation. Whatever the previous one was doing is
    /// cancelled.
    fn begin(&self) -> (u64, CancellationToken) {
        let mut current = self.current.lock();
        current.cancel();
        let token = CancellationToken::new();
        *current = token.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, token)
    }

    /// User pressed cancel.
    pub fn cancel(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.current.lock().cancel();
        info!(generation, "Search cancelled");
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }
}

/// The user's working set: the shipment list and nothing else.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    engine: ReconciliationEngine,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            engine: ReconciliationEngine::new(),
        }
    }

    pub fn shipments(&self) -> &[TrackedShipment] {
        self.engine.shipments()
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff,
        }
    }
}

/// How a search went, once it is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub generation: u64,
    pub total: usize,
    /// Shipment ids touched, in completion order.
    pub found: Vec<String>,
    pub failures: Vec<ValueFailure>,
    pub cancelled: bool,
}

impl BatchReport {
    /// `None` when everything was found (or the search was cancelled).
    pub fn error_message(&self) -> Option<String> {
        if self.cancelled {
            return None;
        }
        match self.failures.as_slice() {
            [] => None,
            [single] => Some(single.to_string()),
            many => {
                let lines: Vec<String> = many.iter().map(|f| format!("  {}", f)).collect();
                Some(format!(
                    "{} of {} tracking values failed:\n{}",
                    many.len(),
                    self.total,
                    lines.join("\n")
                ))
            }
        }
    }
}

/// Split pasted input on commas, semicolons and whitespace. Duplicates
/// (ignoring case) are dropped, first occurrence wins.
pub fn split_values(raw: &str) -> Vec<String> {
    dedupe_values(raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace()))
}

fn dedupe_values<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.to_uppercase()))
        .collect()
}

enum ValueOutcome {
    Found(TrackingResult),
    Failed(ValueFailure),
    Cancelled,
}

/// Publishes updates for one generation, and only while it is live.
/// Cloned into progress callbacks, which can outlive a single lookup.
#[derive(Clone)]
struct Publisher {
    handle: SearchHandle,
    token: CancellationToken,
    generation: u64,
    updates: Option<Sender<SessionUpdate>>,
}

impl Publisher {
    fn is_live(&self) -> bool {
        !self.token.is_cancelled() && self.handle.is_current(self.generation)
    }

    fn publish(&self, update: SessionUpdate) {
        if !self.is_live() {
            return;
        }
        if let Some(tx) = &self.updates {
            let _ = tx.send(update);
        }
    }
}

/// Shared, read-only context for the workers of one search.
struct Attempts<'a> {
    orchestrator: &'a Orchestrator,
    policy: RetryPolicy,
    publisher: Publisher,
    force_refresh: bool,
}

impl Attempts<'_> {
    fn still_current(&self) -> bool {
        self.publisher.is_live()
    }

    fn publish(&self, update: SessionUpdate) {
        self.publisher.publish(update);
    }

    /// Progress sink for one attempt. Adapter errors land in `errors` so the
    /// failure message can name the first one.
    fn progress_sink(&self, value: &str, errors: &Arc<Mutex<Vec<(String, String)>>>) -> ProgressFn {
        let publisher = self.publisher.clone();
        let errors = Arc::clone(errors);
        let value = value.to_string();
        Arc::new(move |progress: AdapterProgress| {
            if progress.status == ProgressStatus::Error {
                errors.lock().push((
                    progress.adapter_name.clone(),
                    progress.detail.clone().unwrap_or_default(),
                ));
            }
            publisher.publish(SessionUpdate::AdapterProgress {
                generation: publisher.generation,
                value: value.clone(),
                progress,
            });
        })
    }

    async fn run_value(&self, value: String) -> (String, ValueOutcome) {
        let mut last_failure = None;
        let token = &self.publisher.token;

        for attempt in 1..=self.policy.max_attempts {
            if !self.still_current() {
                return (value, ValueOutcome::Cancelled);
            }

            let adapter_errors = Arc::new(Mutex::new(Vec::new()));
            let on_progress = self.progress_sink(&value, &adapter_errors);

            let result = self
                .orchestrator
                .lookup_with_cancel(&value, &on_progress, self.force_refresh, token)
                .await;

            if !self.still_current() {
                debug!(value = %value, generation = self.publisher.generation, "Stale lookup result ignored");
                return (value, ValueOutcome::Cancelled);
            }
            if let Some(result) = result {
                return (value, ValueOutcome::Found(result));
            }

            let first_error = adapter_errors.lock().first().cloned();
            let reason = first_error
                .map(|(adapter, message)| FailureReason::AdapterFailed { adapter, message })
                .unwrap_or(FailureReason::NotFound);
            last_failure = Some(ValueFailure {
                value: value.clone(),
                reason,
            });

            if attempt < self.policy.max_attempts {
                self.orchestrator.metrics().record_retry();
                warn!(
                    value = %value,
                    attempt,
                    backoff = ?self.policy.backoff,
                    "Lookup came back empty, retrying"
                );
                self.publish(SessionUpdate::Retrying {
                    value: value.clone(),
                    attempt: attempt + 1,
                    backoff: self.policy.backoff,
                });

                tokio::select! {
                    _ = tokio::time::sleep(self.policy.backoff) => {}
                    _ = token.cancelled() => return (value, ValueOutcome::Cancelled),
                }
            }
        }

        let failure = last_failure.unwrap_or_else(|| ValueFailure {
            value: value.clone(),
            reason: FailureReason::NotFound,
        });
        (value, ValueOutcome::Failed(failure))
    }
}

pub struct SearchController {
    orchestrator: Arc<Orchestrator>,
    policy: RetryPolicy,
    worker_pool_size: usize,
    session: Session,
    handle: SearchHandle,
    updates: Option<Sender<SessionUpdate>>,
}

impl SearchController {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &Config) -> Self {
        Self {
            orchestrator,
            policy: RetryPolicy::from_config(config),
            worker_pool_size: config.worker_pool_size.max(1),
            session: Session::new(),
            handle: SearchHandle::new(),
            updates: None,
        }
    }

    /// Publish `SessionUpdate`s on `tx` from now on.
    pub fn with_updates(mut self, tx: Sender<SessionUpdate>) -> Self {
        self.updates = Some(tx);
        self
    }

    pub fn handle(&self) -> SearchHandle {
        self.handle.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn shipments(&self) -> &[TrackedShipment] {
        self.session.shipments()
    }

    pub fn remove_shipment(&mut self, id: &str) -> Option<TrackedShipment> {
        self.session.engine.remove(id)
    }

    /// Search for every value, fold what's found into the session, and
    /// report what wasn't. One value or fifty, same code path; only the
    /// pool width differs.
    pub async fn search<I, S>(&mut self, values: I, force_refresh: bool) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values = dedupe_values(values);
        let total = values.len();
        let (generation, token) = self.handle.begin();

        let Self {
            ref orchestrator,
            policy,
            worker_pool_size,
            ref mut session,
            ref handle,
            ref updates,
        } = *self;

        let pool = if total > 1 { worker_pool_size } else { 1 };
        info!(
            session = %session.id,
            generation,
            total,
            workers = pool,
            force_refresh,
            "Search started"
        );

        let ctx = Attempts {
            orchestrator: orchestrator.as_ref(),
            policy,
            publisher: Publisher {
                handle: handle.clone(),
                token,
                generation,
                updates: updates.clone(),
            },
            force_refresh,
        };

        let mut found = Vec::new();
        let mut failures = Vec::new();
        let mut completed = 0usize;

        {
            let mut outcomes = stream::iter(values)
                .map(|value| ctx.run_value(value))
                .buffer_unordered(pool);

            while let Some((value, outcome)) = outcomes.next().await {
                if !ctx.still_current() {
                    debug!(value = %value, generation, "Search superseded, dropping remaining work");
                    break;
                }

                match outcome {
                    ValueOutcome::Found(result) => {
                        let ingest = session.engine.ingest(&value, result);
                        let created = matches!(ingest, IngestOutcome::Created { .. });
                        if let Some(shipment) = session.engine.get(ingest.id()) {
                            ctx.publish(SessionUpdate::ShipmentUpdated {
                                value: value.clone(),
                                created,
                                shipment: shipment.clone(),
                            });
                        }
                        found.push(ingest.id().to_string());
                    }
                    ValueOutcome::Failed(failure) => {
                        orchestrator.metrics().record_value_failed();
                        warn!(value = %value, reason = %failure, "Tracking value failed");
                        failures.push(failure);
                    }
                    ValueOutcome::Cancelled => break,
                }

                completed += 1;
                ctx.publish(SessionUpdate::BatchProgress { completed, total });
            }
        }

        let cancelled = !ctx.still_current();
        if cancelled {
            info!(generation, completed, total, "Search ended early, results discarded");
            if let Some(tx) = updates.as_ref() {
                let _ = tx.send(SessionUpdate::Cancelled { generation });
            }
        } else {
            info!(
                generation,
                total,
                found = found.len(),
                failed = failures.len(),
                "Search finished"
            );
            ctx.publish(SessionUpdate::Finished {
                generation,
                failures: failures.clone(),
            });
        }

        BatchReport {
            generation,
            total,
            found,
            failures,
            cancelled,
        }
    }
}
