//! Simulated countdown from an expected duration.
//!
//! A session emits `expected - elapsed` (floored at zero) on a fixed cadence.
//! It knows nothing about the real task: if the task overruns, the session
//! keeps emitting zero until stopped.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use etabar_core::DEFAULT_STEP_MS;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Starts countdown sessions at a fixed tick interval.
#[derive(Debug, Clone, Copy)]
pub struct CountdownScheduler {
    step: Duration,
}

impl Default for CountdownScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_STEP_MS))
    }
}

impl CountdownScheduler {
    /// Create a scheduler ticking every `step` (at least one millisecond).
    pub fn new(step: Duration) -> Self {
        Self {
            step: step.max(Duration::from_millis(1)),
        }
    }

    /// Tick interval.
    pub fn step(&self) -> Duration {
        self.step
    }

    /// Start a session.
    ///
    /// `on_tick(expected_ms)` runs before this returns; afterwards
    /// `on_tick(remaining_ms)` runs every step until the session is stopped.
    /// Must be called from within a Tokio runtime.
    pub fn start<F>(&self, expected_ms: u64, on_tick: F) -> CountdownSession
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let started = Instant::now();
        let active = Arc::new(Mutex::new(true));
        let step = self.step;

        on_tick(expected_ms);

        let flag = active.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(started + step, step);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                // Held across the callback so `stop` waits out an in-flight tick.
                let active = flag.lock().unwrap_or_else(PoisonError::into_inner);
                if !*active {
                    break;
                }
                let elapsed_ms = started.elapsed().as_millis() as u64;
                on_tick(expected_ms.saturating_sub(elapsed_ms));
            }
        });

        debug!("Countdown started: {}ms every {:?}", expected_ms, step);

        CountdownSession {
            started,
            active,
            handle: Some(handle),
            stopped: None,
        }
    }
}

/// Result of stopping a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownStop {
    /// Wall-clock time between `start` and `stop`
    pub elapsed: Duration,
}

impl CountdownStop {
    /// Elapsed time in whole milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

/// One running countdown. Stopped on drop.
#[derive(Debug)]
pub struct CountdownSession {
    started: Instant,
    active: Arc<Mutex<bool>>,
    handle: Option<JoinHandle<()>>,
    stopped: Option<CountdownStop>,
}

impl CountdownSession {
    /// Halt ticking and report the elapsed time.
    ///
    /// No tick callback runs after this returns. Stopping again returns the
    /// first result.
    pub fn stop(&mut self) -> CountdownStop {
        if let Some(stopped) = self.stopped {
            return stopped;
        }

        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = false;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }

        let stopped = CountdownStop {
            elapsed: self.started.elapsed(),
        };
        self.stopped = Some(stopped);
        debug!("Countdown stopped after {}ms", stopped.elapsed_ms());
        stopped
    }

    /// Whether the session is still ticking.
    pub fn is_active(&self) -> bool {
        self.stopped.is_none()
    }
}

impl Drop for CountdownSession {
    fn drop(&mut self) {
        self.stop();
    }
}
