//! Scripted adapter for orchestrator and session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{CarrierAdapter, Tier};
use crate::error::AdapterError;
use crate::models::{Container, TrackingResult};

#[derive(Debug, Clone)]
pub enum Step {
    Found(TrackingResult),
    Nothing,
    Fail(String),
    /// Never settles and ignores cancellation.
    Hang,
}

/// Plays back a list of steps, one per `track` call. The last step repeats
/// once the script runs out.
pub struct ScriptedAdapter {
    id: String,
    name: String,
    tier: Tier,
    delay: Duration,
    ignores_cancel: bool,
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    saw_cancel: AtomicBool,
}

impl ScriptedAdapter {
    pub fn new(id: &str, first: Step) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_uppercase(),
            tier: Tier::Primary,
            delay: Duration::ZERO,
            ignores_cancel: false,
            steps: Mutex::new(VecDeque::from([first])),
            calls: AtomicUsize::new(0),
            saw_cancel: AtomicBool::new(false),
        }
    }

    pub fn found(id: &str, result: TrackingResult) -> Self {
        Self::new(id, Step::Found(result))
    }

    pub fn nothing(id: &str) -> Self {
        Self::new(id, Step::Nothing)
    }

    pub fn failing(id: &str, message: &str) -> Self {
        Self::new(id, Step::Fail(message.to_string()))
    }

    pub fn then(self, step: Step) -> Self {
        self.steps.lock().push_back(step);
        self
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sit out the whole delay even after cancellation.
    pub fn stubborn(mut self) -> Self {
        self.ignores_cancel = true;
        self
    }

    pub fn deferred(mut self) -> Self {
        self.tier = Tier::Deferred;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn saw_cancel(&self) -> bool {
        self.saw_cancel.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CarrierAdapter for ScriptedAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> Tier {
        self.tier
    }

    async fn track(
        &self,
        _value: &str,
        cancel: CancellationToken,
    ) -> Result<Option<TrackingResult>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut steps = self.steps.lock();
            if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().cloned()
            }
        };

        if self.ignores_cancel {
            tokio::time::sleep(self.delay).await;
        } else if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => {
                    self.saw_cancel.store(true, Ordering::SeqCst);
                    return Ok(None);
                }
            }
        }

        match step.unwrap_or(Step::Nothing) {
            Step::Found(result) => Ok(Some(result)),
            Step::Nothing => Ok(None),
            Step::Fail(message) => Err(AdapterError::Other(message)),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// A result carrying a bill of lading and one container.
pub fn result_with(carrier: &str, bl_no: &str, container_no: &str) -> TrackingResult {
    let mut result = TrackingResult::new(carrier);
    result.bl_no = Some(bl_no.to_string());
    result.containers.push(Container::new(container_no));
    result
}
