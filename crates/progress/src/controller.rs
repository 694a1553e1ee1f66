//! Runs a unit of work behind a learned countdown.

use std::future::Future;
use std::sync::Arc;

use etabar_core::{
    ConfigError, EstimateKey, Phase, ProgressConfig, ProgressSnapshot, ProgressState,
};
use etabar_storage::{MemoryStorage, Storage};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::countdown::CountdownScheduler;
use crate::estimate_store::EstimateStore;
use crate::transition::{CompletionTransition, ProgressSink};

/// Shared handle onto the published state.
#[derive(Clone)]
struct StateHandle(Arc<watch::Sender<ProgressState>>);

impl StateHandle {
    fn modify(&self, f: impl FnOnce(&mut ProgressState)) {
        self.0.send_modify(f);
    }

    fn reset(&self) {
        self.modify(|s| {
            s.busy = false;
            s.remaining_ms = None;
            s.phase = Phase::Idle;
        });
    }
}

impl ProgressSink for StateHandle {
    fn set_remaining(&self, remaining_ms: Option<u64>) {
        self.modify(|s| {
            s.remaining_ms = remaining_ms;
            if remaining_ms.is_none() && !s.busy {
                s.phase = Phase::Idle;
            }
        });
    }

    fn set_busy(&self, busy: bool) {
        self.modify(|s| s.busy = busy);
    }
}

/// Resets the state to idle if a run is abandoned before it completes.
struct RunGuard {
    state: StateHandle,
    armed: bool,
}

impl RunGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("Run abandoned before completion; resetting progress");
            self.state.reset();
        }
    }
}

/// Drives the estimate store, countdown and completion transition around a task.
///
/// ```text
/// Idle -> Running -> Finishing -> Idle
/// ```
///
/// Runs on one controller are serialized, so at most one countdown is active
/// per controller. Separate controllers share nothing but the storage.
pub struct ProgressController {
    store: EstimateStore,
    scheduler: CountdownScheduler,
    transition: CompletionTransition,
    state: StateHandle,
    run_lock: Mutex<()>,
}

impl ProgressController {
    /// Create a controller over `storage` with the default configuration.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let config = ProgressConfig::default();
        let (tx, _rx) = watch::channel(ProgressState::default());

        Self {
            store: EstimateStore::new(storage),
            scheduler: CountdownScheduler::new(config.step),
            transition: CompletionTransition::new(config.dwell),
            state: StateHandle(Arc::new(tx)),
            run_lock: Mutex::new(()),
        }
    }

    /// Controller whose estimates live only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Apply a configuration, rejecting values the estimator cannot work with.
    pub fn with_config(mut self, config: ProgressConfig) -> Result<Self, ConfigError> {
        self.store = self.store.with_config(&config)?;
        self.scheduler = CountdownScheduler::new(config.step);
        self.transition = CompletionTransition::new(config.dwell);
        Ok(self)
    }

    /// The estimate store this controller learns into.
    pub fn store(&self) -> &EstimateStore {
        &self.store
    }

    /// Current state.
    pub fn state(&self) -> ProgressState {
        *self.state.0.borrow()
    }

    /// Current state as a presentation view.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state().snapshot()
    }

    /// Percentage complete in `[0, 100]`.
    pub fn percent(&self) -> f64 {
        self.state().percent()
    }

    /// Whether a run is in progress.
    pub fn is_busy(&self) -> bool {
        self.state().busy
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.state.0.subscribe()
    }

    /// Run `task` under a countdown driven by the learned estimate for `key`.
    ///
    /// On success the observed duration is blended into the estimate and the
    /// task's value returned. On failure the estimate is left alone and the
    /// task's error returned unchanged. Either way the countdown is stopped
    /// once and the completion transition runs once before this returns.
    pub async fn run_with_estimate<T, E, F, Fut>(
        &self,
        key: &EstimateKey,
        default_ms: u64,
        task: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _run = self.run_lock.lock().await;
        let guard = RunGuard {
            state: self.state.clone(),
            armed: true,
        };

        let expected_ms = self.store.read(key, default_ms).await;
        // Busy and remaining go live together so no busy state has a null remaining time.
        self.state.modify(|s| {
            s.busy = true;
            s.phase = Phase::Running;
            s.expected_ms = expected_ms;
            s.remaining_ms = Some(expected_ms);
        });
        info!("Running {} with estimate {}ms", key, expected_ms);

        let ticks = self.state.clone();
        let mut session = self
            .scheduler
            .start(expected_ms, move |ms| ticks.set_remaining(Some(ms)));

        let outcome = task().await;
        let stopped = session.stop();

        match &outcome {
            Ok(_) => {
                self.store
                    .update_from(key, stopped.elapsed_ms(), expected_ms)
                    .await;
            }
            Err(_) => {
                debug!(
                    "{} failed after {}ms; estimate unchanged",
                    key,
                    stopped.elapsed_ms()
                );
            }
        }

        self.state.modify(|s| s.phase = Phase::Finishing);
        self.transition.finish(&self.state).await;
        guard.disarm();

        outcome
    }
}
