//! Tuning knobs for countdown cadence, dwell and estimate learning.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::estimate::{EstimateBounds, MAX_ESTIMATE_MS, MIN_ESTIMATE_MS, SMOOTHING_WEIGHT};

/// Default countdown tick interval.
pub const DEFAULT_STEP_MS: u64 = 100;

/// Default completion dwell.
pub const DEFAULT_DWELL_MS: u64 = 200;

/// Invalid configuration.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// Tick interval of zero
    #[error("step must be greater than zero")]
    ZeroStep,

    /// Minimum above maximum
    #[error("estimate bounds inverted: min {min_ms}ms > max {max_ms}ms")]
    InvertedBounds {
        /// Configured minimum
        min_ms: u64,
        /// Configured maximum
        max_ms: u64,
    },

    /// Weight outside `(0, 1]`
    #[error("smoothing weight must be in (0, 1], got {0}")]
    InvalidWeight(f64),
}

/// Progress estimation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProgressConfig {
    /// Countdown tick interval
    #[serde(with = "millis")]
    pub step: Duration,
    /// Pause at 100% before returning to idle
    #[serde(with = "millis")]
    pub dwell: Duration,
    /// Smallest estimate in milliseconds
    pub min_estimate_ms: u64,
    /// Largest estimate in milliseconds
    pub max_estimate_ms: u64,
    /// Weight of the newest observation
    pub smoothing_weight: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(DEFAULT_STEP_MS),
            dwell: Duration::from_millis(DEFAULT_DWELL_MS),
            min_estimate_ms: MIN_ESTIMATE_MS,
            max_estimate_ms: MAX_ESTIMATE_MS,
            smoothing_weight: SMOOTHING_WEIGHT,
        }
    }
}

impl ProgressConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval.
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Set the completion dwell.
    pub fn with_dwell(mut self, dwell: Duration) -> Self {
        self.dwell = dwell;
        self
    }

    /// Set the estimate bounds.
    pub fn with_bounds(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.min_estimate_ms = min_ms;
        self.max_estimate_ms = max_ms;
        self
    }

    /// Set the smoothing weight.
    pub fn with_smoothing_weight(mut self, weight: f64) -> Self {
        self.smoothing_weight = weight;
        self
    }

    /// Estimate bounds as a value.
    pub fn bounds(&self) -> EstimateBounds {
        EstimateBounds {
            min_ms: self.min_estimate_ms,
            max_ms: self.max_estimate_ms,
        }
    }

    /// Check the configuration for values the estimator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step.is_zero() {
            return Err(ConfigError::ZeroStep);
        }
        if self.min_estimate_ms > self.max_estimate_ms {
            return Err(ConfigError::InvertedBounds {
                min_ms: self.min_estimate_ms,
                max_ms: self.max_estimate_ms,
            });
        }
        if !(self.smoothing_weight > 0.0 && self.smoothing_weight <= 1.0) {
            return Err(ConfigError::InvalidWeight(self.smoothing_weight));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
