//! etabar core data models.
//!
//! Estimate keys and bounds, the progress state a controller publishes,
//! and the configuration that tunes countdown cadence and learning.

#![warn(missing_docs)]

mod config;
mod estimate;
mod state;

pub use config::{ConfigError, ProgressConfig, DEFAULT_DWELL_MS, DEFAULT_STEP_MS};
pub use estimate::{
    blend, clamp_estimate, parse_estimate, EstimateBounds, EstimateKey, MAX_ESTIMATE_MS,
    MIN_ESTIMATE_MS, SMOOTHING_WEIGHT,
};
pub use state::{percent, Phase, ProgressSnapshot, ProgressState};
