//! Progress state shared between the controller and whatever renders it.

use serde::{Deserialize, Serialize};

/// Controller lifecycle.
///
/// ```text
/// Idle -> Running -> Finishing -> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No run in progress
    #[default]
    Idle,
    /// Countdown session active, task awaited
    Running,
    /// Completion dwell after the task settled
    Finishing,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Running => write!(f, "running"),
            Phase::Finishing => write!(f, "finishing"),
        }
    }
}

/// Live progress state owned by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressState {
    /// Expected duration of the current (or last) run
    pub expected_ms: u64,
    /// Predicted time remaining; `None` while idle
    pub remaining_ms: Option<u64>,
    /// Whether a run is in progress (including the finishing dwell)
    pub busy: bool,
    /// Lifecycle phase
    pub phase: Phase,
}

impl ProgressState {
    /// Percentage complete in `[0, 100]`.
    pub fn percent(&self) -> f64 {
        percent(self.expected_ms, self.remaining_ms)
    }

    /// True when nothing is running and no transition is pending.
    pub fn is_idle(&self) -> bool {
        self.remaining_ms.is_none() && !self.busy
    }

    /// Presentation view of this state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            expected_ms: self.expected_ms,
            remaining_ms: self.remaining_ms,
            percent: self.percent(),
            busy: self.busy,
            phase: self.phase,
        }
    }
}

/// `clamp((expected - remaining) / expected * 100, 0, 100)`, or `0` when idle.
///
/// A zero expectation with a known remaining time counts as done.
pub fn percent(expected_ms: u64, remaining_ms: Option<u64>) -> f64 {
    let Some(remaining) = remaining_ms else {
        return 0.0;
    };
    if expected_ms == 0 {
        return 100.0;
    }
    let expected = expected_ms as f64;
    let value = (expected - remaining as f64) / expected * 100.0;
    value.clamp(0.0, 100.0)
}

/// Serializable view handed to renderers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Expected duration in milliseconds
    pub expected_ms: u64,
    /// Predicted time remaining in milliseconds
    pub remaining_ms: Option<u64>,
    /// Percentage complete
    pub percent: f64,
    /// Whether a run is in progress
    pub busy: bool,
    /// Lifecycle phase
    pub phase: Phase,
}
